//! Theme Preference
//!
//! The site's light/dark choice, persisted under a fixed `"theme"` key in
//! a small JSON settings file. Callers own a [`ThemeStore`] and go through
//! `init` / `current` / `set` / `toggle` rather than touching the file.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

pub const THEME_KEY: &str = "theme";

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("Unknown theme: {0} (expected 'light' or 'dark')")]
    Unknown(String),

    #[error("Failed to write settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    /// Used when nothing valid has been saved
    #[default]
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}

impl FromStr for Theme {
    type Err = ThemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(ThemeError::Unknown(other.to_string())),
        }
    }
}

/// Persisted theme preference
#[derive(Debug)]
pub struct ThemeStore {
    path: PathBuf,
    settings: Map<String, Value>,
    theme: Theme,
}

impl ThemeStore {
    /// `$XDG_CONFIG_HOME/facts-client/settings.json`, else under `$HOME/.config`
    pub fn default_path() -> PathBuf {
        let base = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("facts-client").join("settings.json")
    }

    /// Load the saved preference; anything missing or unrecognised means dark
    pub fn init(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = read_settings(&path);

        let theme = match settings.get(THEME_KEY) {
            Some(Value::String(saved)) => saved.parse::<Theme>().unwrap_or_else(|_| {
                warn!("Ignoring unknown saved theme '{}'", saved);
                Theme::default()
            }),
            _ => Theme::default(),
        };

        debug!("Theme initialised to {} from {}", theme, path.display());

        Self {
            path,
            settings,
            theme,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> Theme {
        self.theme
    }

    /// Apply and persist a theme
    pub fn set(&mut self, theme: Theme) -> Result<(), ThemeError> {
        self.theme = theme;
        self.settings
            .insert(THEME_KEY.to_string(), Value::String(theme.to_string()));
        self.persist()
    }

    /// Flip between light and dark, persisting the result
    pub fn toggle(&mut self) -> Result<Theme, ThemeError> {
        let next = self.theme.toggled();
        self.set(next)?;
        Ok(next)
    }

    fn persist(&self) -> Result<(), ThemeError> {
        let io_err = |source: std::io::Error| ThemeError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let body = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.path, body).map_err(io_err)?;

        debug!("Saved theme {} to {}", self.theme, self.path.display());
        Ok(())
    }
}

fn read_settings(path: &Path) -> Map<String, Value> {
    let Ok(raw) = fs::read_to_string(path) else {
        return Map::new();
    };

    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => map,
        _ => {
            warn!("Settings file {} is not a JSON object, ignoring", path.display());
            Map::new()
        }
    }
}
