//! Arbiter configuration
//!
//! Channels are declared by name; their ids are the positions in the list.
//!
//! # Example
//!
//! ```
//! use colloquy_hub::ArbiterConfig;
//!
//! let config = ArbiterConfig::from_ron_str(r#"(channels: ["tavern", "market"])"#).unwrap();
//! assert_eq!(config.channels.len(), 2);
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Named channels the arbiter serializes dialogues on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    pub channels: Vec<String>,
}

impl ArbiterConfig {
    /// Create a configuration from channel names
    pub fn with_channels<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channels: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a configuration from a RON string
    pub fn from_ron_str(content: &str) -> Result<Self> {
        let config: ArbiterConfig = ron::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_ron_str(&content)
    }

    /// Reject duplicate channel names
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for name in &self.channels {
            if !seen.insert(name.as_str()) {
                return Err(Error::DuplicateChannel(name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let config = ArbiterConfig::from_ron_str(r#"(channels: ["a", "b"])"#).unwrap();
        assert_eq!(config, ArbiterConfig::with_channels(["a", "b"]));
    }

    #[test]
    fn test_missing_channels_default_empty() {
        let config = ArbiterConfig::from_ron_str("()").unwrap();
        assert!(config.channels.is_empty());
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = ArbiterConfig::from_ron_str(r#"(channels: ["a", "a"])"#).unwrap_err();
        assert!(matches!(err, Error::DuplicateChannel(name) if name == "a"));
    }

    #[test]
    fn test_bad_ron() {
        assert!(matches!(
            ArbiterConfig::from_ron_str("(channels: [")
                .unwrap_err(),
            Error::Ron(_)
        ));
    }
}
