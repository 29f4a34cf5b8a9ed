use tracing::level_filters::LevelFilter;

pub const DEBUG_ENV: &str = "DEBUG";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("{name} must be configured")]
    MissingEnv { name: String },
}

/// Explicit engine settings, fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub log_level: LevelFilter,
    /// Run the ledger round-trip probe before provisioning.
    pub ledger_self_check: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::INFO,
            ledger_self_check: false,
        }
    }
}

impl EngineConfig {
    pub fn debug() -> Self {
        Self {
            log_level: LevelFilter::DEBUG,
            ledger_self_check: true,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let debug = lookup(DEBUG_ENV)
            .map(|value| value.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug {
            Self::debug()
        } else {
            Self::default()
        }
    }

    pub fn debug_enabled(&self) -> bool {
        self.log_level >= LevelFilter::DEBUG
    }
}

pub fn required_env(name: &str) -> Result<String, ConfigurationError> {
    required_from(name, |key| std::env::var(key).ok())
}

pub fn required_from(
    name: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigurationError> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigurationError::MissingEnv {
            name: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_raises_level_and_enables_self_check() {
        let config = EngineConfig::from_lookup(|name| (name == DEBUG_ENV).then(|| "TRUE".to_string()));

        assert_eq!(config.log_level, LevelFilter::DEBUG);
        assert!(config.ledger_self_check);
        assert!(config.debug_enabled());
    }

    #[test]
    fn defaults_to_info_without_debug_flag() {
        let config = EngineConfig::from_lookup(|_| Some("false".to_string()));

        assert_eq!(config, EngineConfig::default());
        assert!(!config.debug_enabled());
    }

    #[test]
    fn blank_required_value_is_missing() {
        let error = required_from("LEDGER_TABLE_NAME", |_| Some("  ".to_string()))
            .expect_err("blank value should fail");

        assert_eq!(error.to_string(), "LEDGER_TABLE_NAME must be configured");
    }
}
