//! JSON configuration loading for the rain display.
//!
//! The configuration file carries two sections: `mqtt` (broker address and
//! topic filters) and `screensaver` (window geometry, fonts, colors and the
//! keyword highlight map). It is read once at startup and immutable
//! afterwards; a missing file or missing key aborts the process.
//!
//! Resolution order when no explicit path is given on the command line:
//! `./config.json`, then `<user config dir>/mqtt-rain/config.json`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name probed in the working directory and the user config directory.
const CONFIG_FILE_NAME: &str = "config.json";

/// Subdirectory of the platform config dir that holds our file.
const CONFIG_DIR_NAME: &str = "mqtt-rain";

/// An RGB triple, serialized as a 3-element JSON array (`[0, 255, 70]`).
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Top-level configuration, mirroring the two sections of the JSON file.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Config {
    pub mqtt: MqttSection,
    pub screensaver: ScreensaverSection,
}

/// Broker connection parameters and topic filters.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct MqttSection {
    /// Broker host name or address, without a port.
    pub broker: String,
    pub port: u16,
    /// Topic filters to subscribe to. `*` is accepted as a multi-level
    /// wildcard and translated to the broker's `#` at subscribe time.
    pub topics: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Optional topic → JSON field name map. Payloads on a mapped topic are
    /// parsed as JSON and reduced to the named field before display.
    #[serde(default)]
    pub json_fields: HashMap<String, String>,
}

/// Window, font and color settings for the rain rendering.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ScreensaverSection {
    pub width: u32,
    pub height: u32,
    pub font_name: String,
    pub font_size: u32,
    pub topic_color: Rgb,
    pub payload_color: Rgb,
    pub background_color: Rgb,
    /// Keyword → highlight color map. Matching is case-insensitive; keys are
    /// lowercased at load.
    pub keywords: BTreeMap<String, Rgb>,
    /// Opacity of the first character of every message, 0–255.
    pub min_alpha: u8,
    /// Payloads longer than this many characters are replaced by a
    /// placeholder instead of being rendered.
    pub payload_char_limit: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no config file found; looked for ./{CONFIG_FILE_NAME} and {fallback}")]
    NotFound { fallback: PathBuf },
}

/// Loads the configuration from `path`, or from the default locations when
/// no path is given.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(explicit) => explicit.to_path_buf(),
        None => resolve_default_path()?,
    };
    info!("Loading configuration from {}", path.display());

    let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let config: Config =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })?;

    debug!(
        "Configuration loaded: broker {}:{}, {} topic filter(s), {} keyword(s)",
        config.mqtt.broker,
        config.mqtt.port,
        config.mqtt.topics.len(),
        config.screensaver.keywords.len()
    );
    Ok(config)
}

fn resolve_default_path() -> Result<PathBuf, ConfigError> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Ok(local);
    }

    let fallback = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME);
    if fallback.is_file() {
        return Ok(fallback);
    }

    Err(ConfigError::NotFound { fallback })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "mqtt": {
            "broker": "broker.local",
            "port": 1883,
            "topics": ["home/*", "sensors/temperature"],
            "json_fields": {"sensors/temperature": "value"}
        },
        "screensaver": {
            "width": 1280,
            "height": 720,
            "font_name": "monospace",
            "font_size": 18,
            "topic_color": [0, 255, 70],
            "payload_color": [180, 255, 180],
            "background_color": [0, 0, 0],
            "keywords": {"ERROR": [255, 60, 60]},
            "min_alpha": 40,
            "payload_char_limit": 120
        }
    }"#;

    #[test]
    fn parses_complete_config() {
        let config: Config = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(config.mqtt.broker, "broker.local");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.topics.len(), 2);
        assert_eq!(
            config.mqtt.json_fields.get("sensors/temperature"),
            Some(&"value".to_string())
        );
        assert_eq!(config.screensaver.topic_color, Rgb(0, 255, 70));
        assert_eq!(config.screensaver.min_alpha, 40);
        assert_eq!(config.screensaver.payload_char_limit, 120);
    }

    #[test]
    fn credentials_default_to_none() {
        let config: Config = serde_json::from_str(SAMPLE).unwrap();
        assert!(config.mqtt.username.is_none());
        assert!(config.mqtt.password.is_none());
    }

    #[test]
    fn missing_section_key_is_an_error() {
        let truncated = SAMPLE.replace("\"min_alpha\": 40,", "");
        assert!(serde_json::from_str::<Config>(&truncated).is_err());
    }

    #[test]
    fn loads_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.screensaver.width, 1280);
    }

    #[test]
    fn unreadable_path_is_a_read_error() {
        let result = load(Some(Path::new("/nonexistent/config.json")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        let result = load(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
