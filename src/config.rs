//! TOML configuration.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working setup. Unknown keys are rejected so typos surface at load time.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::PlatformError;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "QUASIMODE_CONFIG";

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub log: LogConfig,
    pub input: InputConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Default `env_logger` filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

/// Settings for the input capture adapter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    /// Executable name of the key notifier helper.
    pub helper_name: String,
    /// Directory tried when the helper is not on the search path. Defaults to
    /// `bin` beside the directory holding the running executable.
    pub helper_fallback_dir: Option<PathBuf>,
    /// Well-known name the key listener registers under.
    pub listener_name: String,
    /// Directory holding the listener socket. Defaults to the OS temp dir.
    pub listener_dir: Option<PathBuf>,
    /// Interval between `on_tick` calls.
    pub tick_interval_ms: u64,
    pub quasimode_keys: QuasimodeKeys,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            helper_name: "EnsoKeyNotifier".into(),
            helper_fallback_dir: None,
            listener_name: "ensoKeyListener".into(),
            listener_dir: None,
            tick_interval_ms: 10,
            quasimode_keys: QuasimodeKeys::default(),
        }
    }
}

impl InputConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Full path of the listener socket.
    pub fn listener_path(&self) -> PathBuf {
        let dir = self
            .listener_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        dir.join(format!("{}.sock", self.listener_name))
    }
}

/// Initial native key codes for the three quasimode slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuasimodeKeys {
    pub start: u16,
    pub end: u16,
    pub cancel: u16,
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, PlatformError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, PlatformError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Loads `$QUASIMODE_CONFIG`, else the per-user config file, else defaults.
    ///
    /// An explicitly named file must exist; the per-user file is optional.
    pub fn discover() -> Result<Self, PlatformError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            let path = PathBuf::from(path);
            log::info!("config: loading {}", path.display());
            return Self::load(&path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => {
                log::info!("config: loading {}", path.display());
                Self::load(&path)
            }
            _ => {
                log::debug!("config: no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

/// `<exe dir>/../bin`, where an installed bundle keeps the helper.
pub fn default_helper_dir() -> io::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} has no parent directory", exe.display()),
        )
    })?;
    Ok(dir.join("..").join("bin"))
}

/// `<config dir>/quasimode-osx/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("quasimode-osx").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.input.helper_name, "EnsoKeyNotifier");
        assert_eq!(config.input.listener_name, "ensoKeyListener");
        assert_eq!(config.input.tick_interval(), Duration::from_millis(10));
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn partial_input_section_keeps_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [input]
            tick_interval_ms = 25

            [input.quasimode_keys]
            start = 57
            "#,
        )
        .unwrap();
        assert_eq!(config.input.tick_interval_ms, 25);
        assert_eq!(config.input.quasimode_keys.start, 57);
        assert_eq!(config.input.quasimode_keys.end, 0);
        assert_eq!(config.input.helper_name, "EnsoKeyNotifier");
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = Config::from_toml_str("[input]\nhelper = \"x\"\n").unwrap_err();
        assert!(matches!(err, PlatformError::Config(_)));
    }

    #[test]
    fn zero_interval_is_clamped() {
        let input = InputConfig {
            tick_interval_ms: 0,
            ..InputConfig::default()
        };
        assert_eq!(input.tick_interval(), Duration::from_millis(1));
    }

    #[test]
    fn listener_path_uses_configured_dir() {
        let input = InputConfig {
            listener_dir: Some(PathBuf::from("/run/user/501")),
            ..InputConfig::default()
        };
        assert_eq!(
            input.listener_path(),
            PathBuf::from("/run/user/501/ensoKeyListener.sock")
        );
    }

    #[test]
    fn helper_dir_follows_running_executable() {
        let exe = std::env::current_exe().unwrap();
        let expected = exe.parent().unwrap().join("..").join("bin");
        assert_eq!(default_helper_dir().unwrap(), expected);
        assert_eq!(InputConfig::default().helper_fallback_dir, None);
    }

    #[test]
    fn configured_helper_dir_is_kept() {
        let config =
            Config::from_toml_str("[input]\nhelper_fallback_dir = \"/opt/enso/bin\"\n").unwrap();
        assert_eq!(
            config.input.helper_fallback_dir,
            Some(PathBuf::from("/opt/enso/bin"))
        );
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[log]\nlevel = \"debug\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, PlatformError::Io(_)));
    }
}
