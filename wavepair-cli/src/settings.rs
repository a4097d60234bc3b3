//! Application settings

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;
use wave_alloc::{AllocatorConfig, EXCLUSION_FILE, LEDGER_FILE};
use wave_table::{ChannelRange, Configuration, KeyRateParams, TableError, DEFAULT_REFERENCE_NM};

/// Where the persisted files live
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileSettings {
    /// Directory the relative file names below resolve against
    pub data_dir: PathBuf,
    /// Measured reference curve (`channel,value` rows)
    pub curve: PathBuf,
    /// Interference table
    pub table: PathBuf,
    /// Score table
    pub scores: PathBuf,
    /// Exclusion list
    pub exclusions: PathBuf,
    /// Pairing ledger
    pub ledger: PathBuf,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            curve: PathBuf::from("reference_curve.csv"),
            table: PathBuf::from("B_table.csv"),
            scores: PathBuf::from("results.csv"),
            exclusions: PathBuf::from(EXCLUSION_FILE),
            ledger: PathBuf::from(LEDGER_FILE),
        }
    }
}

impl FileSettings {
    /// Resolve a file against the data directory (absolute paths pass through)
    pub fn resolve(&self, file: &Path) -> PathBuf {
        self.data_dir.join(file)
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// File locations
    pub files: FileSettings,
    /// Lowest channel of the universe (nm)
    pub channel_low: u16,
    /// Highest channel of the universe (nm)
    pub channel_high: u16,
    /// Wavelength the reference curve was measured at (nm)
    pub reference_nm: f64,
    /// Configuration every allocation is made against
    pub reference_configuration: Configuration,
    /// Largest configuration the score table covers
    pub max_configuration_size: usize,
    /// Requests accepted per pair
    pub max_submissions: u8,
    /// Participants allowed per channel session
    pub max_participants: usize,
    /// Link parameters for key-rate estimates
    pub key_rate: KeyRateParams,
}

impl Default for Settings {
    fn default() -> Self {
        let range = ChannelRange::default();
        let allocator = AllocatorConfig::default();
        Self {
            files: FileSettings::default(),
            channel_low: range.low().as_u16(),
            channel_high: range.high().as_u16(),
            reference_nm: DEFAULT_REFERENCE_NM,
            reference_configuration: allocator.reference_configuration,
            max_configuration_size: wave_table::MAX_CONFIGURATION_SIZE,
            max_submissions: allocator.max_submissions,
            max_participants: allocator.max_participants,
            key_rate: KeyRateParams::default(),
        }
    }
}

impl Settings {
    /// Get the XDG config directory for wavepair
    /// Uses $XDG_CONFIG_HOME/wavepair, falls back to ~/.config/wavepair
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("wavepair"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("wavepair"))
    }

    /// Get the default settings file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from `path`, or from the default location
    ///
    /// A missing file gives the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            debug!("No settings location, using defaults");
            return Ok(Self::default());
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        serde_json::from_str(&content)
            .with_context(|| format!("Invalid settings in {}", path.display()))
    }

    /// Save settings to `path`, or to the default location
    pub fn save(&self, path: Option<&Path>) -> anyhow::Result<PathBuf> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(Self::default_path)
            .context("Could not determine settings path")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create settings directory")?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(&path, json).context("Failed to write settings")?;

        Ok(path)
    }

    /// The channel universe
    pub fn range(&self) -> Result<ChannelRange, TableError> {
        ChannelRange::new(self.channel_low, self.channel_high)
    }

    /// Engine-level subset
    pub fn allocator_config(&self) -> AllocatorConfig {
        AllocatorConfig {
            reference_configuration: self.reference_configuration.clone(),
            max_submissions: self.max_submissions,
            max_participants: self.max_participants,
        }
    }
}
