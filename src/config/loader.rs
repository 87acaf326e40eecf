//! Config file loader and serialization.

use super::AppConfig;
use crate::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

fn config_dir() -> Result<PathBuf, ConfigError> {
    let base = dirs::config_dir().ok_or_else(|| {
        ConfigError::ValidationFailed("Cannot determine config directory".to_string())
    })?;
    Ok(base.join("kernkeep"))
}

/// Get the global config path: ~/.config/kernkeep/config.toml
pub fn get_global_config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Ensure the global config directory exists
pub fn ensure_config_dir_exists() -> Result<(), ConfigError> {
    fs::create_dir_all(config_dir()?).map_err(ConfigError::IoError)?;
    Ok(())
}

/// Load config from TOML file.
pub fn load_config_from_file(path: &Path) -> Result<AppConfig, ConfigError> {
    validate_config_path(path)?;

    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound(format!(
                "Configuration file not found at: {}",
                path.display()
            ))
        } else {
            ConfigError::IoError(e)
        }
    })?;

    let config: AppConfig = toml::from_str(&content)?;
    config.validate()?;

    Ok(config)
}

/// Load config from `path`, or defaults if the file does not exist yet.
pub fn load_or_default(path: &Path) -> Result<AppConfig, ConfigError> {
    match load_config_from_file(path) {
        Err(ConfigError::FileNotFound(_)) => {
            log::debug!("[Config] No config at {}, using defaults", path.display());
            Ok(AppConfig::default())
        }
        other => other,
    }
}

/// Save config to TOML file.
pub fn save_config_to_file(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    validate_config_path(path)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(ConfigError::IoError)?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    fs::write(path, content).map_err(ConfigError::IoError)?;

    log::debug!("[Config] Saved config to {}", path.display());
    Ok(())
}

/// Validate config path (.toml extension required).
pub fn validate_config_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationFailed(
            "Configuration path cannot be empty".to_string(),
        ));
    }

    match path.extension() {
        Some(ext) if ext == "toml" => {}
        Some(ext) => {
            return Err(ConfigError::ValidationFailed(format!(
                "Configuration file must have .toml extension, got .{}",
                ext.to_string_lossy()
            )))
        }
        None => {
            return Err(ConfigError::ValidationFailed(
                "Configuration file must have .toml extension".to_string(),
            ))
        }
    }

    if path.to_str().is_none() {
        return Err(ConfigError::ValidationFailed(
            "Configuration path contains invalid characters".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstallerBackend;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut original = AppConfig::default();
        original.installer.backend = InstallerBackend::AptGet;
        original.operations.include_extras = false;
        original.scan.max_kernel_major = 6;
        original.checks.warning_acknowledged = true;
        original.paths.support_table = PathBuf::from("/opt/kernkeep/kernel_support");

        save_config_to_file(&original, &config_path).expect("Failed to save config");
        assert!(config_path.exists(), "Config file should exist after save");

        let loaded = load_config_from_file(&config_path).expect("Failed to load config");
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_validate_config_path() {
        assert!(validate_config_path(Path::new("config.toml")).is_ok());
        assert!(validate_config_path(Path::new("/tmp/kernkeep/config.toml")).is_ok());
        assert!(validate_config_path(Path::new("config.json")).is_err());
        assert!(validate_config_path(Path::new("config")).is_err());
        assert!(validate_config_path(Path::new("")).is_err());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_config_from_file(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));

        let config = load_or_default(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        fs::write(&config_path, "[scan\nmax_kernel_major = ").unwrap();

        let result = load_or_default(&config_path);
        assert!(matches!(result, Err(ConfigError::InvalidToml(_))));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[scan]\nmax_kernel_major = 0\n").unwrap();

        let result = load_config_from_file(&config_path);
        assert!(matches!(result, Err(ConfigError::ValidationFailed(_))));
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested/dirs/config.toml");

        save_config_to_file(&AppConfig::default(), &config_path).expect("Failed to save config");
        assert!(config_path.exists(), "Config file should exist in nested directory");
    }
}
