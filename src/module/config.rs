//! Module configuration handed over at `init` time.

/// Configuration passed to [`super::ModuleContract::init`].
///
/// Modules receive the raw TOML document and parse it into their own
/// strongly typed configuration.
#[derive(Debug, Clone, Default)]
pub struct ModuleConfig {
    raw: Option<String>,
}

impl ModuleConfig {
    /// Creates an empty configuration; modules fall back to their defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration from a raw TOML string.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Some(raw.into()),
        }
    }

    /// Gets the raw configuration string.
    #[must_use]
    pub fn raw_config(&self) -> Option<&str> {
        self.raw.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config() {
        assert!(ModuleConfig::new().raw_config().is_none());
    }

    #[test]
    fn test_from_raw() {
        let config = ModuleConfig::from_raw("[listener]\nport = 8080\n");
        assert_eq!(config.raw_config(), Some("[listener]\nport = 8080\n"));
    }
}
