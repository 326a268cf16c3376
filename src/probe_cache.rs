//! Persisted handshake results.
//!
//! LED controllers answer their identification packet once per power cycle, so the first
//! result is kept on disk and reused by later runs. Entries never expire; `trcc cache clear`
//! wipes them after a firmware change.
//!
//! ```toml
//! ["0416_8001_2-1.3"]
//! pm = 3
//! sub = 0
//! model = "AX120_DIGITAL"
//! style_id = 1
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use trcc_core::{DeviceDescriptor, Geometry, HandshakeResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeCacheEntry {
    pub pm: u8,
    pub sub: u8,
    #[serde(default)]
    pub model: String,
    /// LED style, 0 for panels
    #[serde(default)]
    pub style_id: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<[u32; 2]>,
}

impl ProbeCacheEntry {
    pub fn from_result(result: &HandshakeResult) -> Self {
        let (style_id, resolution) = match result.geometry {
            Geometry::Leds(topology) => (topology.style_id, None),
            Geometry::Panel { width, height } => (0, Some([width, height])),
        };
        Self {
            pm: result.pm,
            sub: result.sub,
            model: result.model.clone().unwrap_or_default(),
            style_id,
            resolution,
        }
    }

    /// Rebuild the handshake result, or `None` if the entry names an unknown style
    pub fn to_result(&self) -> Option<HandshakeResult> {
        let geometry = match self.resolution {
            Some([width, height]) => Geometry::Panel { width, height },
            None => Geometry::Leds(trcc_led::styles::style(self.style_id)?.topology()),
        };
        Some(HandshakeResult {
            pm: self.pm,
            sub: self.sub,
            geometry,
            model: (!self.model.is_empty()).then(|| self.model.clone()),
            serial: None,
            valid: true,
        })
    }
}

/// `vid_pid`, or `vid_pid_bus` when the bus path is known
pub fn cache_key(vendor_id: u16, product_id: u16, bus_path: Option<&str>) -> String {
    match bus_path {
        Some(bus) => format!("{vendor_id:04x}_{product_id:04x}_{bus}"),
        None => format!("{vendor_id:04x}_{product_id:04x}"),
    }
}

/// Most specific key for a device
pub fn device_key(descriptor: &DeviceDescriptor) -> String {
    cache_key(
        descriptor.vendor_id,
        descriptor.product_id,
        descriptor.bus_path.as_deref(),
    )
}

#[derive(Debug, Clone)]
pub struct ProbeCache {
    path: PathBuf,
    entries: BTreeMap<String, ProbeCacheEntry>,
}

impl ProbeCache {
    pub fn default_path() -> Option<PathBuf> {
        crate::config::project_dirs().map(|dirs| dirs.config_dir().join("probe_cache.toml"))
    }

    /// Load the cache. A missing or unreadable file is an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring corrupt probe cache");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable probe cache");
                BTreeMap::new()
            },
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lookup(&self, key: &str) -> Option<HandshakeResult> {
        let entry = self.entries.get(key)?;
        let result = entry.to_result();
        if result.is_none() {
            warn!(key, style_id = entry.style_id, "cached entry has unknown style");
        }
        result
    }

    /// Bus specific entry first, then the plain VID:PID entry
    pub fn lookup_device(&self, descriptor: &DeviceDescriptor) -> Option<HandshakeResult> {
        let plain = cache_key(descriptor.vendor_id, descriptor.product_id, None);
        descriptor
            .bus_path
            .as_ref()
            .and_then(|_| self.lookup(&device_key(descriptor)))
            .or_else(|| self.lookup(&plain))
    }

    /// Record a result and persist the whole cache
    pub fn store(&mut self, key: &str, result: &HandshakeResult) -> io::Result<()> {
        self.entries
            .insert(key.to_owned(), ProbeCacheEntry::from_result(result));
        debug!(key, pm = result.pm, sub = result.sub, "probe cache stored");
        self.save()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ProbeCacheEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget everything and delete the file
    pub fn clear(&mut self) -> io::Result<()> {
        self.entries.clear();
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn save(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(&self.entries).map_err(io::Error::other)?;
        // Write then rename so a crash never leaves half a file
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)
    }
}
