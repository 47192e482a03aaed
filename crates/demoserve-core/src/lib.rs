#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod dev;
pub mod error;
pub mod version;

pub use config::Config;
pub use dev::{AliasTable, DevServer, DevServerConfig, ProxyRule, ProxyTable};
pub use error::Error;
pub use version::VERSION;
