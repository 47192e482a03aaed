//! Demo development server.
//!
//! Serves the demo root as-is, forwards API contexts to a running site,
//! rewrites aliased imports and reloads connected browsers on change.
//! The configuration lives in [`config`]; the HTTP side in [`server`].

pub mod alias;
pub mod config;
pub mod fs_policy;
pub mod object;
pub mod proxy;
pub mod reload;
pub mod rewrite;
pub mod server;

pub use alias::AliasTable;
pub use config::{find_config_file, load_config, DevServerConfig, PluginDescriptor};
pub use fs_policy::FsPolicy;
pub use proxy::{PathRewrite, ProxyRouter, ProxyRule, ProxyTable};
pub use reload::ReloadMessage;
pub use rewrite::ImportRewriter;
pub use server::{bind_listener, display_path, DevServer};
