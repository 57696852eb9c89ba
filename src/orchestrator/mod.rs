use crate::disc;
use crate::disc::models::DiscIdentity;
use crate::drive::{DeviceEvent, DeviceMonitor, DriveSnapshot, MonitorConfig, Probe};
use crate::metadata::{Metadata, MetadataResolver, reconcile};
use crate::playback::{PlaybackController, PlaybackStatus};
use log::{debug, info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;

const EJECT_ATTEMPTS: u32 = 3;
const EJECT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Notification sent to everyone watching the drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DriveEvent {
    Insert { metadata: Metadata },
    Eject,
    Status { status: PlaybackStatus },
}

/// Everything a newly connected observer needs to catch up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "state")]
pub struct StateSnapshot {
    pub drive: DriveSnapshot,
    pub disc: Option<DiscIdentity>,
    pub metadata: Option<Metadata>,
    pub status: PlaybackStatus,
}

#[derive(Debug, Clone)]
struct LoadedDisc {
    identity: DiscIdentity,
    device: PathBuf,
    metadata: Metadata,
}

/// Ties the device monitor, disc identification, metadata lookup and the player together.
pub struct DriveOrchestrator {
    monitor: Arc<DeviceMonitor>,
    probe: Arc<dyn Probe>,
    controller: PlaybackController,
    resolver: Arc<dyn MetadataResolver>,
    disc: watch::Sender<Option<LoadedDisc>>,
    events: broadcast::Sender<DriveEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DriveOrchestrator {
    pub fn new(
        probe: Arc<dyn Probe>,
        monitor_config: MonitorConfig,
        controller: PlaybackController,
        resolver: Arc<dyn MetadataResolver>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            monitor: Arc::new(DeviceMonitor::new(Arc::clone(&probe), monitor_config)),
            probe,
            controller,
            resolver,
            disc: watch::Sender::new(None),
            events,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DriveEvent> {
        self.events.subscribe()
    }

    /// Starts watching the drive and forwarding playback status.
    pub async fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            debug!("Orchestrator already running");
            return;
        }

        let (device_tx, mut device_rx) = mpsc::channel(16);
        tasks.push(self.monitor.start(device_tx));

        let orchestrator = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            while let Some(event) = device_rx.recv().await {
                orchestrator.handle_device_event(event).await;
            }
        }));

        let orchestrator = Arc::clone(self);
        let mut status_rx = self.controller.subscribe();
        tasks.push(tokio::spawn(async move {
            while status_rx.changed().await.is_ok() {
                let status = *status_rx.borrow_and_update();
                orchestrator.monitor.set_suspended(status.is_active());
                orchestrator.publish(DriveEvent::Status { status });
            }
        }));

        info!("Watching the drive");
    }

    /// Stops the background tasks and shuts the player down.
    pub async fn stop(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.controller.shutdown().await;
        info!("Stopped watching the drive");
    }

    pub async fn handle_device_event(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::Inserted { device, toc } => self.disc_inserted(device, &toc).await,
            DeviceEvent::Ejected => self.disc_removed().await,
        }
    }

    async fn disc_inserted(&self, device: PathBuf, toc: &str) {
        let identity = disc::identify_toc(toc);
        if identity.is_none() {
            warn!("Could not read a track list from {}", device.display());
            self.disc_removed().await;
            return;
        }
        info!("Identified disc {identity}");

        self.controller
            .load_disc(device.clone(), identity.track_count)
            .await;

        let resolved = match self.resolver.resolve(&identity).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Metadata lookup for {} failed: {e}", identity.hash);
                None
            }
        };
        let metadata = reconcile(&identity, resolved);

        self.disc.send_replace(Some(LoadedDisc {
            identity,
            device,
            metadata: metadata.clone(),
        }));
        self.publish(DriveEvent::Insert { metadata });
    }

    async fn disc_removed(&self) {
        self.controller.unload().await;
        self.disc.send_replace(None);
        self.publish(DriveEvent::Eject);
    }

    pub fn get_status(&self) -> PlaybackStatus {
        self.controller.status()
    }

    pub fn get_current_metadata(&self) -> Option<Metadata> {
        self.disc.borrow().as_ref().map(|disc| disc.metadata.clone())
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            drive: self.monitor.snapshot(),
            disc: self.disc.borrow().as_ref().map(|disc| disc.identity.clone()),
            metadata: self.get_current_metadata(),
            status: self.get_status(),
        }
    }

    pub async fn play(&self) -> bool {
        self.controller.play().await
    }

    pub async fn pause(&self) -> bool {
        self.controller.pause().await
    }

    pub async fn stop_playback(&self) -> bool {
        self.controller.stop().await
    }

    pub async fn next(&self) -> bool {
        self.controller.next().await
    }

    pub async fn previous(&self) -> bool {
        self.controller.previous().await
    }

    /// Stops playback and opens the tray. The monitor reports the removal once the drive
    /// reads empty.
    pub async fn eject(&self) -> bool {
        let device = self.disc.borrow().as_ref().map(|disc| disc.device.clone());
        let Some(device) = device else {
            debug!("Nothing to eject");
            return false;
        };

        self.controller.unload().await;

        for attempt in 1..=EJECT_ATTEMPTS {
            match self.probe.eject(&device).await {
                Ok(()) => {
                    info!("Ejected {}", device.display());
                    return true;
                }
                Err(e) => {
                    warn!("Eject attempt {attempt}/{EJECT_ATTEMPTS} failed: {e}");
                    if attempt < EJECT_ATTEMPTS {
                        tokio::time::sleep(EJECT_RETRY_DELAY).await;
                    }
                }
            }
        }
        false
    }

    fn publish(&self, event: DriveEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}
