//! Configuration file management for wavescan.
//!
//! Reads/writes `~/.wavescan/config.yaml` with scanner cadence settings and
//! an optional wireless-interface override.

use std::path::{Path, PathBuf};

use crate::types::ScanError;

/// Scanner configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Seconds between polling cycles.
    pub interval_secs: u64,
    /// Active double-rescan every Nth cycle. The primary source rate-limits
    /// rescans to roughly one per 10 s; at the default 2 s interval, every
    /// 5 cycles sits right at that window.
    pub rescan_every: u32,
    /// Grace window during which a vanished AP stays visible. 0 disables.
    pub linger_secs: f64,
    /// Wireless interface override; autodetected when absent.
    pub interface: Option<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            interval_secs: 2,
            rescan_every: 5,
            linger_secs: 30.0,
            interface: None,
        }
    }
}

/// Get the config directory path (`~/.wavescan/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".wavescan")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.wavescan/config.yaml`.
///
/// Returns default config if the file doesn't exist or doesn't parse.
pub fn load_config() -> ScanConfig {
    load_config_from(&config_file())
}

/// Load config from an explicit path.
pub fn load_config_from(path: &Path) -> ScanConfig {
    if !path.exists() {
        return ScanConfig::default();
    }
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => return ScanConfig::default(),
    };
    parse_config(&text).unwrap_or_default()
}

/// Save config to `~/.wavescan/config.yaml`.
pub fn save_config(config: &ScanConfig) -> Result<PathBuf, ScanError> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir).map_err(|e| ScanError::Config(e.to_string()))?;
    let path = config_file();
    save_config_to(config, &path)?;
    Ok(path)
}

/// Save config to an explicit path.
pub fn save_config_to(config: &ScanConfig, path: &Path) -> Result<(), ScanError> {
    std::fs::write(path, serialize_config(config)).map_err(|e| ScanError::Config(e.to_string()))
}

/// Parse simple YAML-like config text.
fn parse_config(text: &str) -> Option<ScanConfig> {
    let mut config = ScanConfig::default();
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        if let Some((key, val)) = stripped.split_once(':') {
            let key = key.trim();
            let val = val.trim();

            if !is_indented {
                if val.is_empty() {
                    current_section = Some(key.to_string());
                } else {
                    current_section = None;
                }
            } else if let Some(section) = &current_section {
                match section.as_str() {
                    "scanner" => match key {
                        "interval_secs" => {
                            if let Ok(v) = val.parse() {
                                config.interval_secs = v;
                            }
                        }
                        "rescan_every" => {
                            if let Ok(v) = val.parse() {
                                config.rescan_every = v;
                            }
                        }
                        "linger_secs" => {
                            if let Some(v) = parse_float_value(val) {
                                config.linger_secs = v;
                            }
                        }
                        _ => {}
                    },
                    "sources" => {
                        if key == "interface" {
                            config.interface = parse_string_value(val);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    Some(config)
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    if (val.starts_with('"') && val.ends_with('"'))
        || (val.starts_with('\'') && val.ends_with('\''))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_float_value(val: &str) -> Option<f64> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    val.parse().ok()
}

/// Serialize config to YAML-like text.
fn serialize_config(config: &ScanConfig) -> String {
    let mut lines = vec!["# wavescan configuration".to_string(), String::new()];

    lines.push("scanner:".into());
    lines.push(format!("  interval_secs: {}", config.interval_secs));
    lines.push(format!("  rescan_every: {}", config.rescan_every));
    lines.push(format!("  linger_secs: {}", config.linger_secs));
    lines.push(String::new());

    lines.push("sources:".into());
    match &config.interface {
        Some(iface) => lines.push(format!("  interface: \"{iface}\"")),
        None => lines.push("  interface: null".into()),
    }
    lines.push(String::new());

    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScanConfig::default();
        assert_eq!(config.interval_secs, 2);
        assert_eq!(config.rescan_every, 5);
        assert_eq!(config.linger_secs, 30.0);
        assert!(config.interface.is_none());
    }

    #[test]
    fn test_parse_config() {
        let text = r#"
scanner:
  interval_secs: 5
  rescan_every: 3
  linger_secs: 12.5

sources:
  interface: "wlan1"
"#;
        let config = parse_config(text).unwrap();
        assert_eq!(config.interval_secs, 5);
        assert_eq!(config.rescan_every, 3);
        assert_eq!(config.linger_secs, 12.5);
        assert_eq!(config.interface.as_deref(), Some("wlan1"));
    }

    #[test]
    fn test_parse_config_null_values() {
        let text = r#"
sources:
  interface: null
"#;
        let config = parse_config(text).unwrap();
        assert!(config.interface.is_none());
        assert_eq!(config.interval_secs, 2); // untouched defaults
    }

    #[test]
    fn test_parse_config_partial() {
        let config = parse_config("scanner:\n  interval_secs: 10\n").unwrap();
        assert_eq!(config.interval_secs, 10);
        assert_eq!(config.rescan_every, 5);
    }

    #[test]
    fn test_roundtrip() {
        let config = ScanConfig {
            interval_secs: 1,
            rescan_every: 7,
            linger_secs: 0.0,
            interface: Some("wlp3s0".into()),
        };
        let parsed = parse_config(&serialize_config(&config)).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let config = ScanConfig {
            interval_secs: 4,
            rescan_every: 2,
            linger_secs: 60.0,
            interface: None,
        };
        save_config_to(&config, &path).unwrap();
        assert_eq!(load_config_from(&path), config);
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.yaml");
        assert_eq!(load_config_from(&path), ScanConfig::default());
    }
}
