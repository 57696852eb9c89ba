use crate::disc::toc::has_track_marker;
use crate::drive::models::{DeviceEvent, DriveSnapshot, DriveState, MonitorConfig, ProbeReading};
use crate::drive::probe::Probe;
use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

#[derive(Debug, Default)]
struct MonitorState {
    drive: DriveState,
    absent_count: u32,
    device: Option<PathBuf>,
}

/// Result of a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A previous probe was still running.
    Skipped,
    /// Probing is suspended while playback is active.
    Suspended,
    Idle,
    Event(DeviceEvent),
}

/// Debounced disc presence tracking on top of a [`Probe`].
///
/// A present reading while empty reports an insertion straight away, but a present disc
/// only counts as ejected after `eject_threshold` consecutive absent readings. A present
/// reading in between resets the countdown.
pub struct DeviceMonitor {
    probe: Arc<dyn Probe>,
    config: MonitorConfig,
    state: Mutex<MonitorState>,
    snapshot: watch::Sender<DriveSnapshot>,
    suspended: AtomicBool,
}

impl DeviceMonitor {
    pub fn new(probe: Arc<dyn Probe>, config: MonitorConfig) -> Self {
        Self {
            probe,
            config,
            state: Mutex::new(MonitorState::default()),
            snapshot: watch::Sender::new(DriveSnapshot::default()),
            suspended: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> DriveSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Marks playback as active or idle. Only has an effect with `suspend_while_playing`.
    pub fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::SeqCst);
    }

    /// Probes once and advances the state machine.
    pub async fn tick(&self) -> TickOutcome {
        if self.config.suspend_while_playing && self.suspended.load(Ordering::SeqCst) {
            return TickOutcome::Suspended;
        }

        let Ok(mut state) = self.state.try_lock() else {
            debug!("Previous probe still in flight, skipping tick");
            return TickOutcome::Skipped;
        };

        let reading = match self.probe.probe().await {
            Ok(Some(reading)) if has_track_marker(&reading.toc) => Some(reading),
            Ok(Some(_)) => {
                debug!("Probe returned a TOC without track markers");
                None
            }
            Ok(None) => None,
            Err(e) => {
                debug!("Probe failed: {e}");
                None
            }
        };

        match self.advance(&mut state, reading) {
            Some(event) => {
                self.snapshot.send_replace(DriveSnapshot {
                    state: state.drive,
                    device: state.device.clone(),
                });
                TickOutcome::Event(event)
            }
            None => TickOutcome::Idle,
        }
    }

    fn advance(&self, state: &mut MonitorState, reading: Option<ProbeReading>) -> Option<DeviceEvent> {
        match (state.drive, reading) {
            (DriveState::Empty, Some(reading)) => {
                info!("Disc inserted in {}", reading.device.display());
                state.drive = DriveState::Present;
                state.absent_count = 0;
                state.device = Some(reading.device.clone());
                Some(DeviceEvent::Inserted {
                    device: reading.device,
                    toc: reading.toc,
                })
            }
            (DriveState::Present, Some(_)) => {
                if state.absent_count > 0 {
                    debug!("Disc seen again after {} missed probes", state.absent_count);
                }
                state.absent_count = 0;
                None
            }
            (DriveState::Present, None) => {
                state.absent_count += 1;
                if state.absent_count < self.config.eject_threshold {
                    debug!(
                        "Disc missing ({}/{})",
                        state.absent_count, self.config.eject_threshold
                    );
                    return None;
                }

                info!("Disc ejected");
                state.drive = DriveState::Empty;
                state.absent_count = 0;
                state.device = None;
                Some(DeviceEvent::Ejected)
            }
            (DriveState::Empty, None) => None,
        }
    }

    /// Spawns the polling loop. Events go to `events` until the receiver is dropped or the
    /// returned task is aborted.
    pub fn start(self: &Arc<Self>, events: mpsc::Sender<DeviceEvent>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(monitor.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if let TickOutcome::Event(event) = monitor.tick().await {
                    if events.send(event).await.is_err() {
                        debug!("Device event receiver dropped, stopping monitor");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::error::{ProbeError, ProbeResult};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    const TOC: &str = "first: 1 last 1\ntrack:   1 lba: 0\ntrack:lout lba: 16000";

    fn present() -> ProbeResult<Option<ProbeReading>> {
        Ok(Some(ProbeReading {
            device: PathBuf::from("/dev/cdrom"),
            toc: TOC.to_string(),
        }))
    }

    fn absent() -> ProbeResult<Option<ProbeReading>> {
        Ok(None)
    }

    fn failed() -> ProbeResult<Option<ProbeReading>> {
        Err(ProbeError::Timeout("wodim dev=/dev/cdrom -toc".to_string()))
    }

    #[derive(Default)]
    struct ScriptedProbe {
        readings: std::sync::Mutex<VecDeque<ProbeResult<Option<ProbeReading>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProbe {
        fn new(readings: Vec<ProbeResult<Option<ProbeReading>>>) -> Arc<Self> {
            Arc::new(Self {
                readings: std::sync::Mutex::new(readings.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Probe for ScriptedProbe {
        async fn probe(&self) -> ProbeResult<Option<ProbeReading>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.readings.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }

        async fn eject(&self, _device: &Path) -> ProbeResult<()> {
            Ok(())
        }
    }

    fn monitor(probe: Arc<ScriptedProbe>) -> DeviceMonitor {
        DeviceMonitor::new(probe, MonitorConfig::default())
    }

    async fn run(monitor: &DeviceMonitor, ticks: usize) -> Vec<TickOutcome> {
        let mut outcomes = Vec::new();
        for _ in 0..ticks {
            outcomes.push(monitor.tick().await);
        }
        outcomes
    }

    fn events(outcomes: &[TickOutcome]) -> Vec<DeviceEvent> {
        outcomes
            .iter()
            .filter_map(|o| match o {
                TickOutcome::Event(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn insertion_fires_once() {
        let monitor = monitor(ScriptedProbe::new(vec![present(), present(), present()]));
        let outcomes = run(&monitor, 3).await;

        assert_eq!(
            events(&outcomes),
            vec![DeviceEvent::Inserted {
                device: PathBuf::from("/dev/cdrom"),
                toc: TOC.to_string()
            }]
        );
        assert_eq!(monitor.snapshot().state, DriveState::Present);
        assert_eq!(monitor.snapshot().device, Some(PathBuf::from("/dev/cdrom")));
    }

    #[tokio::test]
    async fn ejection_needs_three_consecutive_absent_probes() {
        let monitor = monitor(ScriptedProbe::new(vec![present(), absent(), absent(), absent()]));

        let outcomes = run(&monitor, 3).await;
        assert_eq!(events(&outcomes).len(), 1);
        assert_eq!(monitor.snapshot().state, DriveState::Present);

        assert_eq!(monitor.tick().await, TickOutcome::Event(DeviceEvent::Ejected));
        assert_eq!(monitor.snapshot(), DriveSnapshot::default());
    }

    #[tokio::test]
    async fn present_probe_resets_the_countdown() {
        let monitor = monitor(ScriptedProbe::new(vec![
            present(),
            absent(),
            absent(),
            present(),
            absent(),
            absent(),
            absent(),
        ]));

        let outcomes = run(&monitor, 6).await;
        assert_eq!(events(&outcomes).len(), 1);
        assert_eq!(monitor.tick().await, TickOutcome::Event(DeviceEvent::Ejected));
    }

    #[tokio::test]
    async fn failures_and_markerless_tocs_count_as_absent() {
        let markerless = Ok(Some(ProbeReading {
            device: PathBuf::from("/dev/cdrom"),
            toc: "wodim: Operation not permitted".to_string(),
        }));
        let monitor = monitor(ScriptedProbe::new(vec![present(), failed(), markerless, failed()]));

        let outcomes = run(&monitor, 4).await;
        assert_eq!(outcomes[3], TickOutcome::Event(DeviceEvent::Ejected));
    }

    #[tokio::test]
    async fn absent_while_empty_is_idle() {
        let monitor = monitor(ScriptedProbe::new(vec![absent(), failed()]));
        assert_eq!(run(&monitor, 2).await, vec![TickOutcome::Idle, TickOutcome::Idle]);
    }

    #[tokio::test]
    async fn suspension_skips_the_probe() {
        let probe = ScriptedProbe::new(vec![present()]);
        let monitor = monitor(probe.clone());

        monitor.set_suspended(true);
        assert_eq!(monitor.tick().await, TickOutcome::Suspended);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);

        monitor.set_suspended(false);
        assert!(matches!(monitor.tick().await, TickOutcome::Event(_)));
    }

    #[tokio::test]
    async fn suspension_can_be_disabled() {
        let probe = ScriptedProbe::new(vec![present()]);
        let config = MonitorConfig {
            suspend_while_playing: false,
            ..MonitorConfig::default()
        };
        let monitor = DeviceMonitor::new(probe.clone(), config);

        monitor.set_suspended(true);
        assert!(matches!(monitor.tick().await, TickOutcome::Event(_)));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    struct BlockingProbe {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Probe for BlockingProbe {
        async fn probe(&self) -> ProbeResult<Option<ProbeReading>> {
            self.entered.notify_one();
            self.release.notified().await;
            present()
        }

        async fn eject(&self, _device: &Path) -> ProbeResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn tick_during_a_probe_is_skipped() {
        let probe = Arc::new(BlockingProbe {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let monitor = Arc::new(DeviceMonitor::new(probe.clone(), MonitorConfig::default()));

        let first = tokio::spawn({
            let monitor = Arc::clone(&monitor);
            async move { monitor.tick().await }
        });
        probe.entered.notified().await;

        assert_eq!(monitor.tick().await, TickOutcome::Skipped);

        probe.release.notify_one();
        assert!(matches!(
            first.await.unwrap(),
            TickOutcome::Event(DeviceEvent::Inserted { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn polling_loop_reports_transitions() {
        let probe = ScriptedProbe::new(vec![present(), absent(), absent(), absent()]);
        let monitor = Arc::new(monitor(probe.clone()));
        let (tx, mut rx) = mpsc::channel(4);

        let task = monitor.start(tx);

        assert!(matches!(rx.recv().await, Some(DeviceEvent::Inserted { .. })));
        assert_eq!(rx.recv().await, Some(DeviceEvent::Ejected));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);

        task.abort();
    }
}
