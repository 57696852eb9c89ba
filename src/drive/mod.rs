pub mod error;
pub mod models;
pub mod monitor;
pub mod probe;

pub use models::{DeviceEvent, DriveSnapshot, DriveState, MonitorConfig, ProbeConfig, ProbeReading};
pub use monitor::{DeviceMonitor, TickOutcome};
pub use probe::{CommandProbe, Probe};
