//! Appearance preferences persisted across runs as a small JSON file, keyed by
//! the same fixed names the client applications use.

use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

pub const THEMES: &[&str] = &[
    "celestial",
    "oscuro",
    "ensoñacion",
    "moderno",
    "fantasma",
    "rebelde",
];

pub const BORDER_STYLES: &[&str] = &[
    "sencillo",
    "refinado",
    "gradiente",
    "neon",
    "acentuado",
    "doble",
];

pub const FONT_STYLES: &[&str] = &[
    "predeterminado",
    "clasico",
    "moderno",
    "elegante",
    "tecnico",
    "amigable",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefKey {
    Theme,
    BorderStyle,
    FontStyle,
}

impl PrefKey {
    pub fn name(&self) -> &'static str {
        match self {
            PrefKey::Theme => "app-theme",
            PrefKey::BorderStyle => "app-border-style",
            PrefKey::FontStyle => "app-font-style",
        }
    }

    fn allowed(&self) -> &'static [&'static str] {
        match self {
            PrefKey::Theme => THEMES,
            PrefKey::BorderStyle => BORDER_STYLES,
            PrefKey::FontStyle => FONT_STYLES,
        }
    }
}

impl std::str::FromStr for PrefKey {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "app-theme" | "theme" => Ok(PrefKey::Theme),
            "app-border-style" | "border-style" => Ok(PrefKey::BorderStyle),
            "app-font-style" | "font-style" => Ok(PrefKey::FontStyle),
            other => Err(anyhow::anyhow!("unknown preference '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(rename = "app-theme")]
    pub theme: String,
    #[serde(rename = "app-border-style")]
    pub border_style: String,
    #[serde(rename = "app-font-style")]
    pub font_style: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            theme: "celestial".to_string(),
            border_style: "sencillo".to_string(),
            font_style: "predeterminado".to_string(),
        }
    }
}

impl Preferences {
    /// Missing file means defaults; a corrupt file is an error rather than a
    /// silent reset.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Preferences::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("malformed preference file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn get(&self, key: PrefKey) -> &str {
        match key {
            PrefKey::Theme => &self.theme,
            PrefKey::BorderStyle => &self.border_style,
            PrefKey::FontStyle => &self.font_style,
        }
    }

    pub fn set(&mut self, key: PrefKey, value: &str) -> anyhow::Result<()> {
        if !key.allowed().contains(&value) {
            bail!(
                "'{value}' is not a valid value for {} (expected one of: {})",
                key.name(),
                key.allowed().join(", ")
            );
        }
        match key {
            PrefKey::Theme => self.theme = value.to_string(),
            PrefKey::BorderStyle => self.border_style = value.to_string(),
            PrefKey::FontStyle => self.font_style = value.to_string(),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_first_run_experience() {
        let prefs = Preferences::default();
        assert_eq!(prefs.get(PrefKey::Theme), "celestial");
        assert_eq!(prefs.get(PrefKey::BorderStyle), "sencillo");
        assert_eq!(prefs.get(PrefKey::FontStyle), "predeterminado");
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let mut prefs = Preferences::default();
        prefs.set(PrefKey::Theme, "fantasma").unwrap();
        prefs.set(PrefKey::FontStyle, "tecnico").unwrap();
        prefs.save(&path).unwrap();

        let loaded = Preferences::load(&path).unwrap();
        assert_eq!(loaded, prefs);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Preferences::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(loaded, Preferences::default());
    }

    #[test]
    fn unknown_values_are_rejected() {
        let mut prefs = Preferences::default();
        assert!(prefs.set(PrefKey::Theme, "vaporwave").is_err());
        assert_eq!(prefs.get(PrefKey::Theme), "celestial");
    }

    #[test]
    fn key_names_stay_stable() {
        assert_eq!("theme".parse::<PrefKey>().unwrap(), PrefKey::Theme);
        assert_eq!(
            "app-border-style".parse::<PrefKey>().unwrap(),
            PrefKey::BorderStyle
        );
        assert!("app-colors".parse::<PrefKey>().is_err());
    }
}
