use serde::Serialize;
use tracing::{error, info};

use super::backend::AudioHost;
use crate::error::AudioResult;

/// An audio endpoint as reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioDevice {
    pub name: String,
    pub supports_input: bool,
    pub supports_output: bool,
}

impl AudioDevice {
    /// Build from the maximum channel counts the host reports
    pub fn from_channel_counts(name: impl Into<String>, max_input: u16, max_output: u16) -> Self {
        Self {
            name: name.into(),
            supports_input: max_input > 0,
            supports_output: max_output > 0,
        }
    }
}

/// Devices split by direction; a duplex device appears in both lists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceCatalog {
    pub playback: Vec<AudioDevice>,
    pub recording: Vec<AudioDevice>,
}

impl DeviceCatalog {
    pub fn from_devices(devices: impl IntoIterator<Item = AudioDevice>) -> Self {
        let mut catalog = Self::default();
        for device in devices {
            if device.supports_output {
                catalog.playback.push(device.clone());
            }
            if device.supports_input {
                catalog.recording.push(device);
            }
        }
        catalog
    }

    pub fn playback_names(&self) -> Vec<&str> {
        self.playback.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn recording_names(&self) -> Vec<&str> {
        self.recording.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.playback.is_empty() && self.recording.is_empty()
    }
}

/// Enumerate devices, propagating host failures
pub fn try_list_devices(host: &dyn AudioHost) -> AudioResult<DeviceCatalog> {
    let catalog = DeviceCatalog::from_devices(host.devices()?);
    info!(
        "Found {} playback and {} recording devices",
        catalog.playback.len(),
        catalog.recording.len()
    );
    Ok(catalog)
}

/// Enumerate devices; an unavailable device API yields an empty catalog and
/// an error log entry
pub fn list_devices(host: &dyn AudioHost) -> DeviceCatalog {
    match try_list_devices(host) {
        Ok(catalog) => catalog,
        Err(e) => {
            error!("Failed to enumerate audio devices: {}", e);
            DeviceCatalog::default()
        }
    }
}
