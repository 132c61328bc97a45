// Configuration
//
// Names of the shared log infrastructure. Loaded from JSON; any key left
// out falls back to the built-in default.

use serde::{Deserialize, Serialize};

use crate::catalog::{QualifiedName, TableRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Namespace of the abstract parent, the recorders and the capture routine.
    pub log_schema: String,

    /// Abstract parent every log table inherits from.
    pub log_parent: String,

    /// Reserved name shared by every recorder overload.
    pub recorder: String,

    /// Change-capture routine, also used as the hook binding name.
    pub capture: String,

    /// Appended to the base name when the log shares the base table's schema.
    pub state_suffix: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config key `{0}` must not be empty")]
    Empty(&'static str),

    #[error("invalid config document: {0}")]
    Parse(String),
}

impl Config {
    /// Built-in configuration (used if no config is provided).
    pub fn default_config() -> Self {
        Self {
            log_schema: "statelog".into(),
            log_parent: "state".into(),
            recorder: "record_state".into(),
            capture: "capture_state".into(),
            state_suffix: "/state".into(),
        }
    }

    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(data).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let keys = [
            ("log_schema", &self.log_schema),
            ("log_parent", &self.log_parent),
            ("recorder", &self.recorder),
            ("capture", &self.capture),
            ("state_suffix", &self.state_suffix),
        ];
        match keys.iter().find(|(_, value)| value.is_empty()) {
            Some((key, _)) => Err(ConfigError::Empty(*key)),
            None => Ok(()),
        }
    }

    pub fn log_parent_ref(&self) -> TableRef {
        TableRef::new(&self.log_schema, &self.log_parent)
    }

    pub fn recorder_name(&self) -> QualifiedName {
        QualifiedName::new(&self.log_schema, &self.recorder)
    }

    pub fn capture_name(&self) -> QualifiedName {
        QualifiedName::new(&self.log_schema, &self.capture)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
