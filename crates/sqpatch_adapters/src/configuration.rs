use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use sqpatch_core::config::Settings;

pub fn get_configuration_with_paths(
    current_dir_path: Option<PathBuf>,
    system_config_dir_path: Option<PathBuf>,
) -> Result<Settings, config::ConfigError> {
    let config_directory = current_dir_path.unwrap_or_else(|| {
        std::env::current_dir()
            .map(|p| p.join("config"))
            .unwrap_or_else(|_| PathBuf::from("config"))
    });

    let system_config_dir = if let Some(path) = system_config_dir_path {
        path
    } else {
        ProjectDirs::from("com", "sqpatch", "sqpatch")
            .map(|d| d.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("config"))
    };

    let settings = Config::builder()
        // Patch application (platform serializes to a lowercase string)
        .set_default("patch.platform", "win32")?
        .set_default("patch.ignore_missing", false)?
        .set_default("patch.ignore_old_mismatch", false)?
        .set_default("patch.verify_checksums", true)?
        .set_default("patch.keep_patches", false)?
        // File handle store
        .set_default("store.max_retries", 5)?
        .set_default("store.retry_delay_ms", 1000)?
        .set_default("log_level", "info")?
        .add_source(File::from(system_config_dir.join("config.toml")).required(false))
        .add_source(File::from(config_directory.join("config.toml")).required(false))
        .add_source(Environment::with_prefix("SQPATCH").separator("__"))
        .build()?;

    settings.try_deserialize::<Settings>()
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    get_configuration_with_paths(None, None)
}
