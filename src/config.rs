//! Configuration snapshot sampled by host shells at startup and on
//! reload ticks. TOML with compiled-in defaults; a stat-polling watcher
//! feeds the session's hot-reload generation counter. The engine itself
//! never touches the file on the read path.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use serde::Deserialize;

use crate::term::color::{Rgb, DEFAULT_BG, DEFAULT_FG};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub font: FontConfig,
    pub window: WindowConfig,
    pub colors: ColorConfig,
    pub shell: ShellConfig,
    pub scrollback: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FontConfig {
    pub family: String,
    pub size: f32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColorConfig {
    pub foreground: String,
    pub background: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShellConfig {
    pub program: String,
    /// TERM value for spawned children.
    pub term: String,
    /// TERM_PROGRAM advertised to children.
    pub term_program: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            font: FontConfig::default(),
            window: WindowConfig::default(),
            colors: ColorConfig::default(),
            shell: ShellConfig::default(),
            scrollback: crate::term::scrollback::DEFAULT_SCROLLBACK,
        }
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            family: "Menlo".into(),
            size: 14.0,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            foreground: "#cccccc".into(),
            background: "#000000".into(),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".into()),
            term: "xterm-256color".into(),
            term_program: "termgrid".into(),
        }
    }
}

impl Config {
    /// `~/.config/termgrid/config.toml`
    pub fn path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        PathBuf::from(home)
            .join(".config")
            .join("termgrid")
            .join("config.toml")
    }

    /// Load from the default path, falling back to defaults.
    pub fn load() -> Self {
        match std::fs::read_to_string(Self::path()) {
            Ok(contents) => Self::parse(&contents),
            Err(_) => Self::default(),
        }
    }

    /// Parse TOML; malformed input falls back to defaults.
    pub fn parse(s: &str) -> Self {
        toml::from_str(s).unwrap_or_default()
    }

    pub fn theme_fg(&self) -> Rgb {
        parse_hex(&self.colors.foreground).unwrap_or(DEFAULT_FG)
    }

    pub fn theme_bg(&self) -> Rgb {
        parse_hex(&self.colors.background).unwrap_or(DEFAULT_BG)
    }
}

fn parse_hex(hex: &str) -> Option<Rgb> {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Rgb::new(r, g, b))
}

/// How often `poll` actually stats the config file.
const WATCH_INTERVAL: Duration = Duration::from_secs(2);

/// Metadata stamp used to decide whether the file changed. Comparing the
/// length as well as the mtime catches rewrites that land within the
/// filesystem's timestamp granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: SystemTime,
    len: u64,
}

fn fingerprint(path: &Path) -> Option<Fingerprint> {
    let meta = std::fs::metadata(path).ok()?;
    Some(Fingerprint {
        modified: meta.modified().ok()?,
        len: meta.len(),
    })
}

/// Config-file watcher driving the session's hot-reload generation.
/// Callers may invoke `poll` on every tick; stats are throttled to
/// [`WATCH_INTERVAL`].
pub struct ConfigWatcher {
    path: PathBuf,
    seen: Option<Fingerprint>,
    next_check: Instant,
}

impl Default for ConfigWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigWatcher {
    pub fn new() -> Self {
        Self::with_path(Config::path())
    }

    pub fn with_path(path: PathBuf) -> Self {
        let seen = fingerprint(&path);
        Self {
            path,
            seen,
            next_check: Instant::now() + WATCH_INTERVAL,
        }
    }

    /// Returns the freshly loaded config when the file changed (or
    /// appeared, or vanished) since the previous check.
    pub fn poll(&mut self) -> Option<Config> {
        let now = Instant::now();
        if now < self.next_check {
            return None;
        }
        self.next_check = now + WATCH_INTERVAL;

        let current = fingerprint(&self.path);
        if current == self.seen {
            return None;
        }
        self.seen = current;
        let contents = std::fs::read_to_string(&self.path).unwrap_or_default();
        Some(Config::parse(&contents))
    }
}
