use std::path::PathBuf;
use thiserror::Error;

/// Stable error codes, one per [`Error`] variant.
pub mod codes {
    pub const DEV_IO: &str = "DEV_IO";
    pub const DEV_CONFIG_READ: &str = "DEV_CONFIG_READ";
    pub const DEV_CONFIG_PARSE: &str = "DEV_CONFIG_PARSE";
    pub const DEV_CONFIG_INVALID: &str = "DEV_CONFIG_INVALID";
    pub const DEV_CONFIG_NOT_FOUND: &str = "DEV_CONFIG_NOT_FOUND";
    pub const DEV_PORT_IN_USE: &str = "DEV_PORT_IN_USE";
    pub const DEV_BIND_FAILED: &str = "DEV_BIND_FAILED";
    pub const DEV_PROXY_UPSTREAM: &str = "DEV_PROXY_UPSTREAM";
}

/// Core error type for demoserve operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Invalid config: {0}")]
    ConfigInvalid(String),

    #[error("Config file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Port {port} is already in use")]
    PortInUse { port: u16 },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Proxy request to {target} failed: {message}")]
    ProxyUpstream { target: String, message: String },
}

impl Error {
    /// Get the stable error code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => codes::DEV_IO,
            Self::ConfigRead { .. } => codes::DEV_CONFIG_READ,
            Self::ConfigParse { .. } => codes::DEV_CONFIG_PARSE,
            Self::ConfigInvalid(_) => codes::DEV_CONFIG_INVALID,
            Self::ConfigNotFound { .. } => codes::DEV_CONFIG_NOT_FOUND,
            Self::PortInUse { .. } => codes::DEV_PORT_IN_USE,
            Self::Bind { .. } => codes::DEV_BIND_FAILED,
            Self::ProxyUpstream { .. } => codes::DEV_PROXY_UPSTREAM,
        }
    }

    #[must_use]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::ConfigInvalid(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_screaming_snake_case() {
        let errors = [
            Error::Io(std::io::Error::other("x")),
            Error::invalid("bad"),
            Error::PortInUse { port: 5174 },
            Error::ConfigNotFound {
                path: PathBuf::from("x.json"),
            },
        ];
        for err in &errors {
            let code = err.code();
            assert!(code.starts_with("DEV_"));
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_port_in_use_message() {
        let err = Error::PortInUse { port: 5174 };
        assert_eq!(err.to_string(), "Port 5174 is already in use");
        assert_eq!(err.code(), codes::DEV_PORT_IN_USE);
    }
}
