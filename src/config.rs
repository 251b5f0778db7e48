//! Configuration loading for keepsake.
//!
//! Configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.keepsake/config.toml`)
//! 3. User config (`~/.keepsake/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! All configuration is optional. The system runs with sensible defaults
//! when no config exists.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FailOpen, KeepsakeError, Result};
use crate::session::SessionKeys;

/// Main configuration struct for keepsake.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Session behavior configuration.
    pub session: SessionConfig,
    /// Storage backend configuration.
    pub storage: StorageConfig,
}

/// Session behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// TTL applied by `keepsake create` when `--ttl` is not given.
    /// `None` creates sessions that never expire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_ttl_minutes: Option<i64>,
    /// Store key holding the encoded data record.
    pub data_key: String,
    /// Store key holding the raw token.
    pub token_key: String,
}

impl SessionConfig {
    /// Check if a TTL value is usable (must be positive).
    pub fn is_valid_ttl(value: i64) -> bool {
        value > 0
    }

    /// Check if a store key is usable (must be non-empty).
    pub fn is_valid_key(value: &str) -> bool {
        !value.trim().is_empty()
    }

    /// The store keys this configuration selects.
    pub fn keys(&self) -> SessionKeys {
        SessionKeys::new(self.data_key.clone(), self.token_key.clone())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        let keys = SessionKeys::default();
        Self {
            default_ttl_minutes: None,
            data_key: keys.data,
            token_key: keys.token,
        }
    }
}

/// Storage backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the file store. Defaults to `<keepsake_home>/store`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the store directory, falling back to the default location.
    pub fn resolved_dir(&self) -> Option<PathBuf> {
        self.dir.clone().or_else(store_dir)
    }
}

impl Config {
    /// Load configuration with full precedence chain.
    ///
    /// Precedence (highest to lowest):
    /// 1. Environment variables
    /// 2. Project config (`.keepsake/config.toml` in cwd)
    /// 3. User config (`~/.keepsake/config.toml`)
    /// 4. Defaults
    pub fn load() -> Self {
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&cwd),
            Err(_) => {
                let mut config = Config::default();
                if let Some(user_config) = Self::load_user_config() {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                config
            }
        }
    }

    /// Load configuration with a specific working directory.
    pub fn load_from_cwd(cwd: &Path) -> Self {
        let mut config = Config::default();

        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        if let Some(project_config) = Self::load_project_config(cwd) {
            config = config.merge(project_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Load user config from `~/.keepsake/config.toml`.
    fn load_user_config() -> Option<Config> {
        let home = keepsake_home()?;
        Self::load_optional(&home.join("config.toml"))
    }

    /// Load project config from `.keepsake/config.toml` in the given directory.
    fn load_project_config(cwd: &Path) -> Option<Config> {
        Self::load_optional(&project_config_path(cwd))
    }

    /// Load a config file that may legitimately be missing.
    ///
    /// A present but unreadable file is reported and skipped.
    fn load_optional(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        Self::load_from_file(path)
            .map(Some)
            .fail_open_default(&format!("ignoring config file {}", path.display()))
    }

    /// Load config from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| KeepsakeError::storage(path, e))?;
        toml::from_str(&content).map_err(|e| KeepsakeError::config(e.to_string()))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("KEEPSAKE_TTL_MINUTES") {
            match val.parse::<i64>() {
                Ok(n) if SessionConfig::is_valid_ttl(n) => {
                    self.session.default_ttl_minutes = Some(n);
                }
                _ => {
                    tracing::warn!(
                        "Invalid KEEPSAKE_TTL_MINUTES value '{}'. Must be a positive integer. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = env::var("KEEPSAKE_DATA_KEY") {
            if SessionConfig::is_valid_key(&val) {
                self.session.data_key = val;
            } else {
                tracing::warn!("KEEPSAKE_DATA_KEY is empty. Ignoring.");
            }
        }

        if let Ok(val) = env::var("KEEPSAKE_TOKEN_KEY") {
            if SessionConfig::is_valid_key(&val) {
                self.session.token_key = val;
            } else {
                tracing::warn!("KEEPSAKE_TOKEN_KEY is empty. Ignoring.");
            }
        }

        if let Ok(val) = env::var("KEEPSAKE_STORE_DIR") {
            if val.is_empty() {
                tracing::warn!("KEEPSAKE_STORE_DIR is empty. Ignoring.");
            } else {
                self.storage.dir = Some(PathBuf::from(val));
            }
        }
    }

    /// Merge another config into this one.
    ///
    /// Values from `other` take precedence when they differ from defaults.
    /// An explicit default in a higher-precedence file therefore cannot undo
    /// a customization from a lower one.
    fn merge(mut self, other: Config) -> Self {
        let default_session = SessionConfig::default();
        if other.session.default_ttl_minutes.is_some() {
            self.session.default_ttl_minutes = other.session.default_ttl_minutes;
        }
        if other.session.data_key != default_session.data_key {
            self.session.data_key = other.session.data_key;
        }
        if other.session.token_key != default_session.token_key {
            self.session.token_key = other.session.token_key;
        }

        if other.storage.dir.is_some() {
            self.storage.dir = other.storage.dir;
        }

        self
    }

    /// Save configuration to the project config file.
    ///
    /// Writes to `.keepsake/config.toml` in the given directory, creating the
    /// directory if needed. Uses atomic write (temp file, then rename).
    pub fn save_project(&self, cwd: &Path) -> Result<PathBuf> {
        let config_path = project_config_path(cwd);
        let project_dir = cwd.join(".keepsake");

        if !project_dir.exists() {
            fs::create_dir_all(&project_dir).map_err(|e| KeepsakeError::storage(&project_dir, e))?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| KeepsakeError::config(e.to_string()))?;

        let temp_path = project_dir.join(".config.toml.tmp");
        fs::write(&temp_path, &content).map_err(|e| KeepsakeError::storage(&temp_path, e))?;
        fs::rename(&temp_path, &config_path).map_err(|e| KeepsakeError::storage(&config_path, e))?;

        Ok(config_path)
    }

    /// Write a project config unless one already exists.
    ///
    /// Returns the written path, or `None` when a config is present and
    /// `force` is not set.
    pub fn init_project(&self, cwd: &Path, force: bool) -> Result<Option<PathBuf>> {
        if project_config_path(cwd).exists() && !force {
            return Ok(None);
        }
        self.save_project(cwd).map(Some)
    }
}

/// Path of the project config file under `cwd`.
pub fn project_config_path(cwd: &Path) -> PathBuf {
    cwd.join(".keepsake").join("config.toml")
}

/// Get the keepsake home directory.
///
/// `$KEEPSAKE_HOME` when set and non-empty, otherwise `~/.keepsake`. Relative
/// `KEEPSAKE_HOME` values are canonicalized when they exist.
pub fn keepsake_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("KEEPSAKE_HOME") {
        if home.is_empty() {
            tracing::warn!("KEEPSAKE_HOME is empty, using default");
        } else {
            let path = PathBuf::from(&home);
            if path.is_absolute() {
                return Some(path);
            }
            if let Ok(canonical) = path.canonicalize() {
                return Some(canonical);
            }
            tracing::warn!("KEEPSAKE_HOME is relative and doesn't exist, using as-is");
            return Some(path);
        }
    }

    dirs::home_dir().map(|home| home.join(".keepsake"))
}

/// Get the default file store directory.
///
/// Returns `<keepsake_home>/store/`.
pub fn store_dir() -> Option<PathBuf> {
    keepsake_home().map(|h| h.join("store"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const ENV_VARS: &[&str] = &[
        "KEEPSAKE_TTL_MINUTES",
        "KEEPSAKE_DATA_KEY",
        "KEEPSAKE_TOKEN_KEY",
        "KEEPSAKE_STORE_DIR",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.session.default_ttl_minutes, None);
        assert_eq!(
            config.session.data_key,
            "__session_f0b0d9caeeac416c7f1a79195a1313c1"
        );
        assert_eq!(
            config.session.token_key,
            "__session_0b01d74c11d6d2f5c03afc0ce733510e"
        );
        assert!(config.storage.dir.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");

        let toml_content = r#"
[session]
default_ttl_minutes = 45
token_key = "my_token"

[storage]
dir = "/var/lib/keepsake"
"#;
        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();

        assert_eq!(config.session.default_ttl_minutes, Some(45));
        assert_eq!(config.session.token_key, "my_token");
        assert_eq!(config.storage.dir, Some(PathBuf::from("/var/lib/keepsake")));

        // Unset fields keep defaults
        assert_eq!(config.session.data_key, SessionKeys::default().data);
    }

    #[test]
    fn test_load_from_file_missing() {
        let result = Config::load_from_file(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(KeepsakeError::Storage { .. })));
    }

    #[test]
    fn test_load_from_file_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "this is not valid toml [[[").unwrap();

        let result = Config::load_from_file(&config_path);
        assert!(matches!(result, Err(KeepsakeError::Config { .. })));
    }

    #[test]
    #[serial]
    fn test_project_config_precedence() {
        clear_env();
        let home = TempDir::new().unwrap();
        env::set_var("KEEPSAKE_HOME", home.path());
        let dir = TempDir::new().unwrap();
        let project_dir = dir.path().join(".keepsake");
        fs::create_dir_all(&project_dir).unwrap();
        fs::write(
            project_dir.join("config.toml"),
            "[session]\ndefault_ttl_minutes = 15\n",
        )
        .unwrap();

        let config = Config::load_from_cwd(dir.path());
        env::remove_var("KEEPSAKE_HOME");

        assert_eq!(config.session.default_ttl_minutes, Some(15));
        assert_eq!(config.session.token_key, SessionKeys::default().token);
    }

    #[test]
    #[serial]
    fn test_env_var_precedence() {
        clear_env();
        let home = TempDir::new().unwrap();
        env::set_var("KEEPSAKE_HOME", home.path());
        let dir = TempDir::new().unwrap();
        let project_dir = dir.path().join(".keepsake");
        fs::create_dir_all(&project_dir).unwrap();
        fs::write(
            project_dir.join("config.toml"),
            "[session]\ndefault_ttl_minutes = 15\n",
        )
        .unwrap();

        env::set_var("KEEPSAKE_TTL_MINUTES", "60");
        let config = Config::load_from_cwd(dir.path());
        clear_env();
        env::remove_var("KEEPSAKE_HOME");

        assert_eq!(config.session.default_ttl_minutes, Some(60));
    }

    #[test]
    #[serial]
    fn test_env_var_overrides() {
        clear_env();
        env::set_var("KEEPSAKE_DATA_KEY", "data");
        env::set_var("KEEPSAKE_TOKEN_KEY", "token");
        env::set_var("KEEPSAKE_STORE_DIR", "/tmp/keepsake-store");

        let mut config = Config::default();
        config.apply_env_overrides();
        clear_env();

        assert_eq!(config.session.data_key, "data");
        assert_eq!(config.session.token_key, "token");
        assert_eq!(
            config.storage.dir,
            Some(PathBuf::from("/tmp/keepsake-store"))
        );
    }

    #[test]
    #[serial]
    fn test_env_var_invalid_values_ignored() {
        clear_env();
        env::set_var("KEEPSAKE_TTL_MINUTES", "-5");
        env::set_var("KEEPSAKE_DATA_KEY", "  ");
        env::set_var("KEEPSAKE_STORE_DIR", "");

        let mut config = Config::default();
        config.apply_env_overrides();
        clear_env();

        assert_eq!(config, Config::default());
    }

    #[test]
    #[serial]
    fn test_env_var_non_numeric_ttl_ignored() {
        clear_env();
        env::set_var("KEEPSAKE_TTL_MINUTES", "thirty");

        let mut config = Config::default();
        config.apply_env_overrides();
        clear_env();

        assert_eq!(config.session.default_ttl_minutes, None);
    }

    #[test]
    #[serial]
    fn test_invalid_project_config_ignored() {
        clear_env();
        let home = TempDir::new().unwrap();
        env::set_var("KEEPSAKE_HOME", home.path());
        let dir = TempDir::new().unwrap();
        let project_dir = dir.path().join(".keepsake");
        fs::create_dir_all(&project_dir).unwrap();
        fs::write(project_dir.join("config.toml"), "[session\nbroken").unwrap();

        let config = Config::load_from_cwd(dir.path());
        env::remove_var("KEEPSAKE_HOME");

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_merge_configs() {
        let mut user = Config::default();
        user.session.default_ttl_minutes = Some(20);
        user.session.data_key = "user_data".to_string();

        let mut project = Config::default();
        project.session.token_key = "project_token".to_string();

        let merged = Config::default().merge(user).merge(project);

        assert_eq!(merged.session.default_ttl_minutes, Some(20));
        assert_eq!(merged.session.data_key, "user_data");
        assert_eq!(merged.session.token_key, "project_token");
    }

    #[test]
    fn test_keys_from_config() {
        let mut config = SessionConfig::default();
        config.data_key = "d".to_string();

        let keys = config.keys();
        assert_eq!(keys.data, "d");
        assert_eq!(keys.token, SessionKeys::default().token);
    }

    #[test]
    fn test_is_valid_ttl() {
        assert!(SessionConfig::is_valid_ttl(1));
        assert!(SessionConfig::is_valid_ttl(1440));
        assert!(!SessionConfig::is_valid_ttl(0));
        assert!(!SessionConfig::is_valid_ttl(-1));
    }

    #[test]
    #[serial]
    fn test_keepsake_home_with_env() {
        let dir = TempDir::new().unwrap();
        env::set_var("KEEPSAKE_HOME", dir.path());

        let home = keepsake_home();
        env::remove_var("KEEPSAKE_HOME");

        assert_eq!(home, Some(dir.path().to_path_buf()));
    }

    #[test]
    #[serial]
    fn test_keepsake_home_empty_env() {
        env::set_var("KEEPSAKE_HOME", "");

        let home = keepsake_home();
        env::remove_var("KEEPSAKE_HOME");

        if let Some(home) = home {
            assert!(home.ends_with(".keepsake"));
        }
    }

    #[test]
    #[serial]
    fn test_store_dir() {
        let dir = TempDir::new().unwrap();
        env::set_var("KEEPSAKE_HOME", dir.path());

        let store = store_dir();
        let resolved = StorageConfig::default().resolved_dir();
        env::remove_var("KEEPSAKE_HOME");

        assert_eq!(store, Some(dir.path().join("store")));
        assert_eq!(resolved, store);
    }

    #[test]
    fn test_resolved_dir_prefers_explicit() {
        let storage = StorageConfig {
            dir: Some(PathBuf::from("/explicit")),
        };
        assert_eq!(storage.resolved_dir(), Some(PathBuf::from("/explicit")));
    }

    #[test]
    fn test_save_project_round_trip() {
        let dir = TempDir::new().unwrap();

        let mut config = Config::default();
        config.session.default_ttl_minutes = Some(90);
        config.storage.dir = Some(PathBuf::from("/srv/sessions"));
        let path = config.save_project(dir.path()).unwrap();

        assert_eq!(path, project_config_path(dir.path()));
        assert!(path.exists());
        assert!(!dir.path().join(".keepsake").join(".config.toml.tmp").exists());

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_init_project_keeps_existing_config() {
        let dir = TempDir::new().unwrap();

        let mut first = Config::default();
        first.session.default_ttl_minutes = Some(15);
        let path = first.init_project(dir.path(), false).unwrap();
        assert_eq!(path, Some(project_config_path(dir.path())));

        let mut second = Config::default();
        second.session.default_ttl_minutes = Some(45);
        assert_eq!(second.init_project(dir.path(), false).unwrap(), None);
        let loaded = Config::load_from_file(&project_config_path(dir.path())).unwrap();
        assert_eq!(loaded.session.default_ttl_minutes, Some(15));

        assert!(second.init_project(dir.path(), true).unwrap().is_some());
        let loaded = Config::load_from_file(&project_config_path(dir.path())).unwrap();
        assert_eq!(loaded.session.default_ttl_minutes, Some(45));
    }

    #[test]
    #[serial]
    fn test_init_project_is_picked_up_by_load() {
        clear_env();
        let home = TempDir::new().unwrap();
        env::set_var("KEEPSAKE_HOME", home.path());
        let dir = TempDir::new().unwrap();

        let mut config = Config::default();
        config.session.data_key = "__profile".to_string();
        config.init_project(dir.path(), false).unwrap();

        let loaded = Config::load_from_cwd(dir.path());
        assert_eq!(loaded.session.data_key, "__profile");

        env::remove_var("KEEPSAKE_HOME");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[storage]\n").unwrap();
        assert_eq!(config, Config::default());
    }
}
