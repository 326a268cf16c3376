//! Configuration file handling

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{self, Display};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use trcc_core::Rgb;
use trcc_led::{LedMode, TempUnit};

/// Project directory holding the config and the probe cache
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "trcc")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub led: LedConfig,
    pub lcd: LcdConfig,
    /// Per-device overrides keyed by discovery ordinal
    pub devices: BTreeMap<String, DeviceOverride>,
}

impl Config {
    /// Get the config file path for this platform
    pub fn path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load config from file, or create default if it doesn't exist
    pub fn load_or_create() -> Result<Self, Box<dyn Error>> {
        let path = Self::path().ok_or("could not determine config directory")?;
        Self::load_or_create_at(&path)
    }

    pub fn load_or_create_at(path: &Path) -> Result<Self, Box<dyn Error>> {
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let config = Config::default();
            config.save_with_header_at(path)?;
            println!("created default config at {}", path.display());
            Ok(config)
        }
    }

    fn save_with_header_at(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let header = r#"# trcc configuration file
#
# [devices."N"] sections apply to the device listed as N by `trcc detect`.

"#;
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, format!("{header}{contents}"))?;
        Ok(())
    }

    /// Probe cache location, honouring the override
    pub fn probe_cache_path(&self) -> Option<PathBuf> {
        self.general
            .probe_cache
            .clone()
            .or_else(crate::probe_cache::ProbeCache::default_path)
    }

    pub fn device(&self, ordinal: usize) -> Option<&DeviceOverride> {
        self.devices.get(&ordinal.to_string())
    }
}

/// Which stack reaches HID-class devices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsbBackend {
    /// libusb, claiming the interface directly
    #[default]
    Libusb,
    /// OS HID driver, works without detaching hid-generic
    Hidapi,
}

impl FromStr for UsbBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "libusb" => Ok(Self::Libusb),
            "hidapi" => Ok(Self::Hidapi),
            _ => Err(format!("unknown usb backend: {s}. Available: libusb, hidapi")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub usb_backend: UsbBackend,
    /// Probe cache file, defaults to the config directory
    pub probe_cache: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedConfig {
    /// 0 to 100
    pub brightness: u8,
    /// static, breathing, colorful, rainbow, temperature or load
    pub mode: String,
    pub color: Color,
    /// Animation tick
    #[serde(with = "humantime_serde")]
    pub tick: Duration,
    /// Light only the digit segments on styles that have them
    pub digits: bool,
    /// C or F
    pub temp_unit: String,
    pub clock_24h: bool,
}

impl LedConfig {
    pub fn mode(&self) -> Result<LedMode, String> {
        self.mode.parse()
    }

    pub fn temp_unit(&self) -> Result<TempUnit, String> {
        self.temp_unit.parse()
    }
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            brightness: 100,
            mode: LedMode::Static.name().into(),
            color: Color([255, 0, 0]),
            tick: trcc_led::effects::TICK,
            digits: false,
            temp_unit: TempUnit::Celsius.to_string(),
            clock_24h: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LcdConfig {
    /// Use nearest neighbor interpolation
    pub nearest: bool,
    /// Background colour for transparent images
    pub background: Color,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceOverride {
    /// Force an LED style when the controller reports an unknown PM
    pub led_style: Option<u8>,
}

/// Hex colour, `#RRGGBB` or `#RGB`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(pub Rgb);

impl Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let mut hex = code.trim_start_matches('#').to_string();
        match hex.len() {
            3 => hex = hex.chars().flat_map(|a| [a, a]).collect(),
            6 => {},
            l => return Err(format!("invalid hex length for {code}: {l}")),
        }
        let value =
            u32::from_str_radix(&hex, 16).map_err(|_| format!("invalid hex color: {code}"))?;
        Ok(Self([(value >> 16) as u8, (value >> 8) as u8, value as u8]))
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}
