//! Settings shared by every primecee command, read from the user's config folder.
use crate::get_primecee_config_dir;
use crate::input::read_toml;
use crate::log::DEFAULT_LOG_LEVEL;
use anyhow::Result;
use documented::DocumentedFields;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::{Path, PathBuf};

const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Where the settings file is looked for
pub fn get_settings_file_path() -> PathBuf {
    get_primecee_config_dir().join(SETTINGS_FILE_NAME)
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Program settings
#[derive(Debug, Clone, DocumentedFields, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// The program log level (off, error, warn, info, debug or trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Whether to overwrite existing output folders by default
    #[serde(default)]
    pub overwrite: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            overwrite: false,
        }
    }
}

impl Settings {
    /// Read the settings file, using the defaults if there isn't one
    pub fn load() -> Result<Self> {
        Self::from_path(&get_settings_file_path())
    }

    /// Read settings from `file_path`. A missing file gives the defaults.
    pub fn from_path(file_path: &Path) -> Result<Self> {
        if file_path.is_file() {
            read_toml(file_path)
        } else {
            Ok(Self::default())
        }
    }

    /// A settings file listing every default value, commented out below its description
    pub fn default_file_contents() -> Result<String> {
        let defaults = toml::Table::try_from(Self::default())?;

        let mut out = String::from("# primecee settings\n# Uncomment a line to override it\n");
        for (name, value) in &defaults {
            writeln!(out)?;
            for doc_line in Self::get_field_docs(name)?.lines() {
                writeln!(out, "# # {}", doc_line.trim())?;
            }
            writeln!(out, "# {name} = {value}")?;
        }

        Ok(out)
    }
}
