//! View configuration.

use serde::{Deserialize, Serialize};

use crate::error::ViewError;

/// When queued changes are propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Changes accumulate until the host calls [`View::flush`](crate::view::View::flush),
    /// once per tick.
    #[default]
    Deferred,
    /// Every mutation is flushed before the mutator returns.
    Immediate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub flush: FlushMode,
    /// Tag passed to `create_handle` for text nodes.
    pub text_tag: String,
    /// Tag passed to `create_handle` for structural placeholders.
    pub stump_tag: String,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            flush: FlushMode::Deferred,
            text_tag: "#text".to_string(),
            stump_tag: "#comment".to_string(),
        }
    }
}

impl ViewConfig {
    /// Default configuration with synchronous flushing.
    pub fn immediate() -> Self {
        Self {
            flush: FlushMode::Immediate,
            ..Self::default()
        }
    }

    /// Parse a configuration; missing fields take their defaults.
    pub fn from_json(source: &str) -> Result<Self, ViewError> {
        let config: Self =
            serde_json::from_str(source).map_err(|err| ViewError::Config(err.to_string()))?;
        if config.text_tag.is_empty() || config.stump_tag.is_empty() {
            return Err(ViewError::Config("placeholder tags must not be empty".to_string()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ViewConfig::from_json(r#"{"flush": "immediate"}"#).unwrap();
        assert_eq!(config.flush, FlushMode::Immediate);
        assert_eq!(config.stump_tag, "#comment");
    }

    #[test]
    fn bad_json_is_a_config_error() {
        assert!(matches!(
            ViewConfig::from_json(r#"{"flush": "sometimes"}"#),
            Err(ViewError::Config(_))
        ));
        assert!(ViewConfig::from_json(r#"{"text_tag": ""}"#).is_err());
    }
}
