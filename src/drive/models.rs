use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveState {
    #[default]
    Empty,
    Present,
}

/// Output of a successful probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReading {
    pub device: PathBuf,
    pub toc: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Inserted { device: PathBuf, toc: String },
    Ejected,
}

/// Debounced view of the drive, as last decided by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DriveSnapshot {
    pub state: DriveState,
    pub device: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: Duration,
    /// Consecutive absent probes before a disc counts as ejected.
    pub eject_threshold: u32,
    /// Skip probing while the player holds the device open.
    pub suspend_while_playing: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            eject_threshold: 3,
            suspend_while_playing: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub device: PathBuf,
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/cdrom"),
            timeout: Duration::from_secs(10),
        }
    }
}
