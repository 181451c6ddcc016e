//! Peer configuration

use magpie_core::DEFAULT_PORT;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bare username used in message identifiers
    pub username: String,

    /// Human-readable name announced in profiles
    pub display_name: String,

    /// Status line announced in profiles
    pub status: String,

    /// UDP port to listen on and broadcast to
    pub port: u16,

    /// Where received files are written
    pub downloads_dir: String,

    /// Enable debug logging by default
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            username: "anonymous".to_string(),
            display_name: "Anonymous".to_string(),
            status: String::new(),
            port: DEFAULT_PORT,
            downloads_dir: "downloads".to_string(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "username = \"alice\"\ndisplay_name = \"Alice\"\nstatus = \"hi\"\nport = 51000\ndownloads_dir = \"/tmp/dl\"\nverbose = true"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.username, "alice");
        assert_eq!(config.port, 51000);
        assert!(config.verbose);
    }

    #[test]
    fn test_default_port() {
        assert_eq!(Config::default().port, DEFAULT_PORT);
    }
}
