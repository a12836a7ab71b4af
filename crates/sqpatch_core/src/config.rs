use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::zipatch::Platform;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub patch: PatchSettings,
    pub store: StoreSettings,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PatchSettings {
    pub game_path: Option<PathBuf>,
    pub platform: Platform,
    pub ignore_missing: bool,
    pub ignore_old_mismatch: bool,
    pub verify_checksums: bool,
    /// Keep patch files on disk after they were applied
    pub keep_patches: bool,
}

/// Tuning for the open file handle cache
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreSettings {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl StoreSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            patch: PatchSettings::default(),
            store: StoreSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for PatchSettings {
    fn default() -> Self {
        Self {
            game_path: None,
            platform: Platform::default(),
            ignore_missing: false,
            ignore_old_mismatch: false,
            verify_checksums: true,
            keep_patches: false,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay_ms: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, Duration::ZERO)]
    #[case(250, Duration::from_millis(250))]
    #[case(1000, Duration::from_secs(1))]
    fn test_store_retry_delay(#[case] millis: u64, #[case] expected: Duration) {
        let store = StoreSettings {
            max_retries: 1,
            retry_delay_ms: millis,
        };
        assert_eq!(store.retry_delay(), expected);
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();

        assert_eq!(settings.log_level, "info");

        // Patch defaults
        assert_eq!(settings.patch.game_path, None);
        assert_eq!(settings.patch.platform, Platform::Win32);
        assert!(!settings.patch.ignore_missing);
        assert!(!settings.patch.ignore_old_mismatch);
        assert!(settings.patch.verify_checksums);
        assert!(!settings.patch.keep_patches);

        // Store defaults
        assert_eq!(settings.store.max_retries, 5);
        assert_eq!(settings.store.retry_delay_ms, 1000);
    }

    #[test]
    fn test_default_settings_snapshot() {
        let settings = Settings::default();
        insta::assert_yaml_snapshot!(settings);
    }
}
