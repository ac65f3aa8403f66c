//! Scenario and application configuration
//!
//! A scenario describes one simulated dialog session: the dialog to build,
//! the elements to place on it, which event types the override handles, and
//! the input the simulated firmware feeds into the blocking show loop.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{button_event_type, Alignment, Height, KeyboardState};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Event {event} refers to element {element}, but only {count} text boxes exist")]
    UnknownElement {
        event: usize,
        element: usize,
        count: usize,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Parameters handed to the dialog initializer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogConfig {
    pub height: Height,
    pub alignment: Alignment,
    pub title: String,
    #[serde(default)]
    pub keyboard: KeyboardState,
}

/// A text box placed on the dialog before it is shown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBoxConfig {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    #[serde(default)]
    pub text: Option<String>,
    pub max_length: i32,
    #[serde(default)]
    pub count_by_bytes: bool,
}

/// Which events the scripted override consumes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverridePolicy {
    /// Event types answered by the override; everything else is forwarded
    #[serde(default)]
    pub handled: Vec<u16>,
    /// Status returned for handled events
    #[serde(default = "default_status")]
    pub status: i32,
}

fn default_status() -> i32 {
    1
}

impl Default for OverridePolicy {
    fn default() -> Self {
        Self {
            handled: Vec::new(),
            status: default_status(),
        }
    }
}

/// One scripted input event, optionally repeated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedEvent {
    /// Raw event type
    #[serde(default)]
    pub kind: u16,
    /// Button event number; takes precedence over `kind` when set
    #[serde(default)]
    pub button: Option<u16>,
    #[serde(default)]
    pub aux: u16,
    /// Index into the scenario's text boxes
    #[serde(default)]
    pub element: Option<usize>,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
}

fn default_repeat() -> u32 {
    1
}

impl ScriptedEvent {
    /// Event type as reported to the dialog
    pub fn event_type(&self) -> u16 {
        match self.button {
            Some(button) => button_event_type(button),
            None => self.kind,
        }
    }
}

/// A complete simulated session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub dialog: DialogConfig,
    #[serde(default)]
    pub text_boxes: Vec<TextBoxConfig>,
    #[serde(default)]
    pub policy: OverridePolicy,
    #[serde(default)]
    pub events: Vec<ScriptedEvent>,
}

impl Scenario {
    /// Parse and validate a scenario from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let scenario: Scenario = toml::from_str(text)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Load a scenario file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Loaded scenario {}", path.display());
        Self::from_toml(&text)
    }

    fn validate(&self) -> Result<()> {
        for (index, event) in self.events.iter().enumerate() {
            if let Some(element) = event.element {
                if element >= self.text_boxes.len() {
                    return Err(ConfigError::UnknownElement {
                        event: index,
                        element,
                        count: self.text_boxes.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Total number of input events after expanding repeats
    pub fn input_count(&self) -> usize {
        self.events.iter().map(|e| e.repeat as usize).sum()
    }
}

/// Application-wide configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub default_scenario: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            default_scenario: None,
        }
    }
}

impl AppConfig {
    /// Load the config file, falling back to defaults when it does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[dialog]
height = "Percent55"
alignment = "Center"
title = "Settings"
keyboard = "Abc"

[[text_boxes]]
x = 10
y = 40
width = 200
text = "hello"
max_length = 32

[policy]
handled = [5]

[[events]]
kind = 5
repeat = 3

[[events]]
button = 1
element = 0
"#;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_toml(SAMPLE).unwrap();
        assert_eq!(scenario.dialog.height, Height::Percent55);
        assert_eq!(scenario.dialog.keyboard, KeyboardState::Abc);
        assert_eq!(scenario.text_boxes.len(), 1);
        assert_eq!(scenario.policy.status, 1);
        assert_eq!(scenario.input_count(), 4);
        assert_eq!(scenario.events[1].event_type(), 0x98);
    }

    #[test]
    fn test_unknown_element_rejected() {
        let text = r#"
[dialog]
height = "Percent25"
alignment = "Top"
title = "x"

[[events]]
kind = 1
element = 2
"#;
        let err = Scenario::from_toml(text).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownElement { element: 2, count: 0, .. }));
    }

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::load_or_default("/nonexistent/romshadow.toml").unwrap();
        assert_eq!(config.log_level, "info");
        assert!(config.default_scenario.is_none());
    }
}
