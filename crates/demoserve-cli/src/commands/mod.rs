pub mod config;
pub mod dev;
pub mod resolve;
pub mod version;

use demoserve_core::dev::{load_config, DevServerConfig};
use demoserve_core::error::codes;
use demoserve_core::Error;
use std::path::{Path, PathBuf};

/// Exit code for invalid input: bad config, busy port.
const EXIT_VALIDATION_ERROR: i32 = 2;

/// Exit code for everything else.
const EXIT_INTERNAL_ERROR: i32 = 1;

/// Where a resolved configuration came from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    File(PathBuf),
    Preset,
}

/// Load the dev server configuration for `cwd`.
///
/// An explicit `--config` file must exist. With `--demo`, or when no config
/// file is found, the demo preset rooted at `cwd` is used.
pub fn resolve_config(
    cwd: &Path,
    explicit: Option<&Path>,
    demo: bool,
) -> Result<(ConfigSource, DevServerConfig), Error> {
    if demo {
        return Ok((ConfigSource::Preset, DevServerConfig::demo(cwd)));
    }

    match load_config(cwd, explicit)? {
        Some((path, config)) => {
            tracing::debug!(path = %path.display(), "Loaded config file");
            Ok((ConfigSource::File(path), config))
        }
        None => {
            tracing::debug!(cwd = %cwd.display(), "No config file found, using demo preset");
            Ok((ConfigSource::Preset, DevServerConfig::demo(cwd)))
        }
    }
}

fn map_error_code_to_exit(code: &str) -> i32 {
    match code {
        codes::DEV_CONFIG_READ
        | codes::DEV_CONFIG_PARSE
        | codes::DEV_CONFIG_INVALID
        | codes::DEV_CONFIG_NOT_FOUND
        | codes::DEV_PORT_IN_USE => EXIT_VALIDATION_ERROR,
        _ => EXIT_INTERNAL_ERROR,
    }
}

/// Report a core error with its stable code and exit.
pub fn exit_with(err: &Error, json: bool) -> ! {
    if json {
        let error_json = serde_json::json!({
            "ok": false,
            "error": {
                "code": err.code(),
                "message": err.to_string(),
            }
        });
        println!("{error_json}");
    } else {
        eprintln!("error[{}]: {err}", err.code());
    }
    std::process::exit(map_error_code_to_exit(err.code()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(map_error_code_to_exit(codes::DEV_PORT_IN_USE), EXIT_VALIDATION_ERROR);
        assert_eq!(map_error_code_to_exit(codes::DEV_CONFIG_PARSE), EXIT_VALIDATION_ERROR);
        assert_eq!(map_error_code_to_exit(codes::DEV_IO), EXIT_INTERNAL_ERROR);
    }

    #[test]
    fn test_missing_config_falls_back_to_demo_preset() {
        let dir = tempfile::tempdir().unwrap();
        let (source, config) = resolve_config(dir.path(), None, false).unwrap();
        assert!(matches!(source, ConfigSource::Preset));
        assert_eq!(config, DevServerConfig::demo(dir.path()));
    }

    #[test]
    fn test_explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_config(dir.path(), Some(Path::new("nope.json")), false).unwrap_err();
        assert_eq!(err.code(), codes::DEV_CONFIG_NOT_FOUND);
    }

    #[test]
    fn test_config_file_is_preferred() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("demoserve.config.json"),
            r#"{ "server": { "port": 6000 } }"#,
        )
        .unwrap();

        let (source, config) = resolve_config(dir.path(), None, false).unwrap();
        assert!(matches!(source, ConfigSource::File(_)));
        assert_eq!(config.server.port, 6000);

        let (_, preset) = resolve_config(dir.path(), None, true).unwrap();
        assert_eq!(preset.server.port, 5174);
    }
}
