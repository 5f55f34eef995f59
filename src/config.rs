use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Application configuration, loaded from JSON with every field optional
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name shown in the viewer's title
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Address the viewer is served from; share links are built on it
    #[serde(default = "default_app_url")]
    pub app_url: String,

    /// URL for the WebDriver instance hosting the portfolio frame
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// How long the portfolio may stay silent before it is probed
    #[serde(default = "default_embed_timeout_ms")]
    pub embed_timeout_ms: u64,

    /// Pause between the end of speech and the connect prompt
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// File holding the stored pitches
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// espeak-compatible program used to narrate
    #[serde(default = "default_speech_command")]
    pub speech_command: String,

    /// Also put the raw pitch in share links
    #[serde(default)]
    pub inline_pitch: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            app_url: default_app_url(),
            webdriver_url: default_webdriver_url(),
            embed_timeout_ms: default_embed_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            store_path: default_store_path(),
            speech_command: default_speech_command(),
            inline_pitch: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let mut contents = String::new();
        File::open(path)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .map_err(|source| Error::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Applies overrides from the process environment
    pub fn with_env(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |name: &str| lookup(name).filter(|value| !value.is_empty());
        if let Some(app_url) = lookup("PITCH_CONNECT_APP_URL") {
            self.app_url = app_url;
        }
        if let Some(store_path) = lookup("PITCH_CONNECT_STORE") {
            self.store_path = PathBuf::from(store_path);
        }
        if let Some(speech_command) = lookup("PITCH_CONNECT_SPEECH") {
            self.speech_command = speech_command;
        }
        if let Some(webdriver_url) = lookup("WEBDRIVER_URL") {
            self.webdriver_url = webdriver_url;
        }
        self
    }

    pub fn base_url(&self) -> Result<Url, Error> {
        Url::parse(&self.app_url).map_err(|source| Error::AppUrl {
            url: self.app_url.clone(),
            source,
        })
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

fn default_app_name() -> String {
    "Connection".to_string()
}

fn default_app_url() -> String {
    "http://localhost:5173/".to_string()
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_embed_timeout_ms() -> u64 {
    5000
}

fn default_settle_delay_ms() -> u64 {
    1000
}

/// `$HOME/.local/share/pitch-connect/pitches.json`, or the working directory without a home
fn default_store_path() -> PathBuf {
    let file = Path::new("pitch-connect").join("pitches.json");
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".local/share").join(file),
        None => file,
    }
}

fn default_speech_command() -> String {
    "espeak".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.app_name, "Connection");
        assert_eq!(config.embed_timeout(), Duration::from_secs(5));
        assert_eq!(config.settle_delay(), Duration::from_secs(1));
        assert!(!config.inline_pitch);
        assert!(config.store_path.ends_with("pitch-connect/pitches.json"));
    }

    #[test]
    fn test_partial_config() {
        let config = AppConfig::from_json(
            r#"{"app_url": "https://connect.example.com/view", "embed_timeout_ms": 8000, "inline_pitch": true}"#,
        )
        .unwrap();
        assert_eq!(config.app_url, "https://connect.example.com/view");
        assert_eq!(config.embed_timeout(), Duration::from_secs(8));
        assert!(config.inline_pitch);
        assert_eq!(config.speech_command, "espeak");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"speech_command": "say", "settle_delay_ms": 250}}"#).unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.speech_command, "say");
        assert_eq!(config.settle_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = AppConfig::from_file("/nonexistent/pitch-connect.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/pitch-connect.json"));
    }

    #[test]
    fn test_malformed_config() {
        assert!(matches!(
            AppConfig::from_json("{\"embed_timeout_ms\": \"soon\"}"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PITCH_CONNECT_APP_URL", "https://pitch.example.org/"),
            ("PITCH_CONNECT_STORE", "/tmp/pitches.json"),
            ("PITCH_CONNECT_SPEECH", ""),
            ("WEBDRIVER_URL", "http://localhost:9515"),
        ]);
        let config = AppConfig::default()
            .with_overrides(|name| env.get(name).map(|value| value.to_string()));

        assert_eq!(config.app_url, "https://pitch.example.org/");
        assert_eq!(config.store_path, PathBuf::from("/tmp/pitches.json"));
        assert_eq!(config.webdriver_url, "http://localhost:9515");
        // Empty values are ignored
        assert_eq!(config.speech_command, "espeak");
    }

    #[test]
    fn test_bad_app_url() {
        let config = AppConfig {
            app_url: "not a url".into(),
            ..AppConfig::default()
        };
        assert!(matches!(config.base_url(), Err(Error::AppUrl { .. })));
    }
}
