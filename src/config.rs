use std::path::{Path, PathBuf};
use std::time::Duration;

use ratatui::style::Color;
use serde::Deserialize;
use tracing::warn;

use crate::restore::RestoreOptions;

// ---------------------------------------------------------------------------
// Theme
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct Theme {
    pub accent: Color,
    /// Marks the window the popup was opened from.
    pub highlight: Color,
    pub warning: Color,
    pub fg: Color,
    pub dim: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            accent: Color::Cyan,
            highlight: Color::Yellow,
            warning: Color::Red,
            fg: Color::Reset,
            dim: Color::DarkGray,
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageConfig {
    /// Saved-session storage file. Defaults to the platform data dir.
    pub path: Option<PathBuf>,
    /// State file of the simulated browser.
    pub browser_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Config {
    pub theme: Theme,
    pub restore: RestoreOptions,
    pub storage: StorageConfig,
}

impl Config {
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("tab-freezer").join("config.toml"))
            .unwrap_or_default()
    }

    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Reads `path`, falling back to defaults when it is missing or invalid.
    pub fn load_from(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Self::default(),
        };

        match toml::from_str::<RawConfig>(&content) {
            Ok(raw) => Self::from_raw(raw),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "invalid config, using defaults");
                Self::default()
            }
        }
    }

    fn from_raw(raw: RawConfig) -> Self {
        let mut config = Self::default();

        if let Some(t) = raw.theme {
            let slots = [
                (t.accent, &mut config.theme.accent),
                (t.highlight, &mut config.theme.highlight),
                (t.warning, &mut config.theme.warning),
                (t.fg, &mut config.theme.fg),
                (t.dim, &mut config.theme.dim),
            ];
            for (value, slot) in slots {
                if let Some(c) = value.as_deref().and_then(parse_color) {
                    *slot = c;
                }
            }
        }

        if let Some(r) = raw.restore {
            if let Some(v) = r.batch_size {
                config.restore.batch_size = v.max(1);
            }
            if let Some(ms) = r.load_timeout_ms {
                config.restore.load_timeout = Duration::from_millis(ms);
            }
            if let Some(ms) = r.settle_delay_ms {
                config.restore.settle_delay = Duration::from_millis(ms);
            }
        }

        if let Some(s) = raw.storage {
            config.storage.path = s.path;
            config.storage.browser_path = s.browser_path;
        }

        config
    }
}

// ---------------------------------------------------------------------------
// Raw TOML structs (all-optional for merge)
// ---------------------------------------------------------------------------

#[derive(Deserialize, Default)]
struct RawConfig {
    theme: Option<RawTheme>,
    restore: Option<RawRestore>,
    storage: Option<RawStorage>,
}

#[derive(Deserialize, Default)]
struct RawTheme {
    accent: Option<String>,
    highlight: Option<String>,
    warning: Option<String>,
    fg: Option<String>,
    dim: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawRestore {
    batch_size: Option<usize>,
    load_timeout_ms: Option<u64>,
    settle_delay_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct RawStorage {
    path: Option<PathBuf>,
    browser_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// parse_color: "cyan", "dark_gray", "#ff0000", "#f00", "reset"
// ---------------------------------------------------------------------------

pub fn parse_color(s: &str) -> Option<Color> {
    let s = s.trim().to_lowercase();

    if let Some(hex) = s.strip_prefix('#') {
        if !hex.is_ascii() {
            return None;
        }
        let channel = |digits: &str| u8::from_str_radix(digits, 16).ok();
        return match hex.len() {
            6 => Some(Color::Rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => Some(Color::Rgb(
                channel(&hex[0..1])? * 17,
                channel(&hex[1..2])? * 17,
                channel(&hex[2..3])? * 17,
            )),
            _ => None,
        };
    }

    let color = match s.replace('_', "").as_str() {
        "reset" => Color::Reset,
        "black" => Color::Black,
        "red" => Color::Red,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "magenta" => Color::Magenta,
        "cyan" => Color::Cyan,
        "gray" | "grey" => Color::Gray,
        "white" => Color::White,
        "darkgray" | "darkgrey" => Color::DarkGray,
        "lightred" => Color::LightRed,
        "lightgreen" => Color::LightGreen,
        "lightyellow" => Color::LightYellow,
        "lightblue" => Color::LightBlue,
        "lightmagenta" => Color::LightMagenta,
        "lightcyan" => Color::LightCyan,
        _ => return None,
    };
    Some(color)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color_named() {
        assert_eq!(parse_color("cyan"), Some(Color::Cyan));
        assert_eq!(parse_color(" Yellow "), Some(Color::Yellow));
        assert_eq!(parse_color("dark_gray"), Some(Color::DarkGray));
        assert_eq!(parse_color("light_blue"), Some(Color::LightBlue));
    }

    #[test]
    fn test_parse_color_hex() {
        assert_eq!(parse_color("#ff8000"), Some(Color::Rgb(255, 128, 0)));
        assert_eq!(parse_color("#f00"), Some(Color::Rgb(255, 0, 0)));
        assert_eq!(parse_color("#ff80"), None);
        assert_eq!(parse_color("#gg0000"), None);
    }

    #[test]
    fn test_parse_color_invalid() {
        assert_eq!(parse_color("chartreuse"), None);
        assert_eq!(parse_color(""), None);
    }

    #[test]
    fn test_config_from_empty_raw() {
        let config = Config::from_raw(RawConfig::default());
        assert_eq!(config, Config::default());
        assert_eq!(config.restore.batch_size, 10);
        assert_eq!(config.restore.load_timeout, Duration::from_secs(4));
        assert_eq!(config.restore.settle_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_config_from_partial_toml() {
        let toml_str = r#"
[theme]
highlight = "green"

[restore]
batch_size = 5
load_timeout_ms = 2500
"#;
        let raw: RawConfig = toml::from_str(toml_str).unwrap();
        let config = Config::from_raw(raw);
        assert_eq!(config.theme.highlight, Color::Green);
        assert_eq!(config.restore.batch_size, 5);
        assert_eq!(config.restore.load_timeout, Duration::from_millis(2500));
        // Unchanged defaults
        assert_eq!(config.theme.accent, Color::Cyan);
        assert_eq!(config.restore.settle_delay, Duration::from_secs(1));
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let raw: RawConfig = toml::from_str("[restore]\nbatch_size = 0\n").unwrap();
        assert_eq!(Config::from_raw(raw).restore.batch_size, 1);
    }

    #[test]
    fn test_storage_paths() {
        let raw: RawConfig =
            toml::from_str("[storage]\npath = \"/tmp/s.json\"\nbrowser_path = \"/tmp/b.json\"\n")
                .unwrap();
        let config = Config::from_raw(raw);
        assert_eq!(config.storage.path, Some(PathBuf::from("/tmp/s.json")));
        assert_eq!(config.storage.browser_path, Some(PathBuf::from("/tmp/b.json")));
    }

    #[test]
    fn test_load_from_missing_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load_from(&dir.path().join("missing.toml")), Config::default());

        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[restore\nbatch_size = ").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }
}
