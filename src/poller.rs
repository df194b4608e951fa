use crate::client::Client;
use crate::protocol::{MarkerScan, ReplyDecoder};
use crate::tracker::ObjectTracker;
use crate::transport::Transport;
use crate::types::{AlgorithmMode, BoundingBox, DetectionRecord, Point};
use crate::{ProtocolError, Result};
use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Granularity at which a sleeping poller notices the stop flag.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(20);

/// Polling cadence and startup settings.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay after a frame in which something was tracked (~10 Hz).
    pub active_interval: Duration,
    /// Delay after an empty frame (~1 Hz).
    pub idle_interval: Duration,
    /// Algorithm to select before the first poll. The tracker is reset once
    /// the device accepts it.
    pub mode: Option<AlgorithmMode>,
    /// Snapshots buffered for the consumer before new ones are dropped.
    pub channel_capacity: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            active_interval: Duration::from_millis(100),
            idle_interval: Duration::from_secs(1),
            mode: None,
            channel_capacity: 16,
        }
    }
}

/// State of one track at the time a snapshot was taken.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSnapshot {
    pub bbox: BoundingBox,
    pub trajectory: Vec<Point>,
    pub velocity: (f64, f64),
}

/// Everything one poll produced, handed to other threads by value.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    pub sequence: u64,
    pub detections: Vec<DetectionRecord>,
    pub tracks: BTreeMap<u64, TrackSnapshot>,
    /// Set when this frame's request failed; the frame then counts as empty.
    pub error: Option<String>,
}

/// Handle to a background polling loop that owns one client and one tracker.
pub struct Poller<T, D = MarkerScan>
where
    T: Transport + Send + 'static,
    D: ReplyDecoder + Send + 'static,
{
    receiver: Receiver<FrameSnapshot>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<Client<T, D>>>,
}

impl<T, D> Poller<T, D>
where
    T: Transport + Send + 'static,
    D: ReplyDecoder + Send + 'static,
{
    /// Move `client` and `tracker` onto a dedicated thread and start polling.
    pub fn start(client: Client<T, D>, tracker: ObjectTracker, config: PollConfig) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::bounded(config.channel_capacity.max(1));
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();

        let thread = std::thread::Builder::new()
            .name("huskylens-poll".into())
            .spawn(move || poll_loop(client, tracker, config, sender, stop_clone))
            .map_err(|e| ProtocolError::Spawn(e.to_string()))?;

        Ok(Poller {
            receiver,
            stop_flag,
            thread: Some(thread),
        })
    }

    /// Receive the next snapshot (blocks until available).
    pub fn recv(&self) -> Result<FrameSnapshot> {
        self.receiver.recv().map_err(|_| ProtocolError::StreamStopped)
    }

    /// Try to receive a snapshot without blocking.
    pub fn try_recv(&self) -> Option<FrameSnapshot> {
        self.receiver.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<FrameSnapshot> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => ProtocolError::Timeout,
            crossbeam_channel::RecvTimeoutError::Disconnected => ProtocolError::StreamStopped,
        })
    }

    /// False once a stop was requested or the loop gave up on the device.
    pub fn is_active(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
    }

    /// Stop the loop, wait for it, and hand the client back.
    pub fn stop(mut self) -> Option<Client<T, D>> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<Client<T, D>> {
        self.stop_flag.store(true, Ordering::Relaxed);
        let thread = self.thread.take()?;
        match thread.join() {
            Ok(client) => Some(client),
            Err(_) => {
                log::warn!("Poller thread panicked");
                None
            }
        }
    }
}

impl<T, D> Drop for Poller<T, D>
where
    T: Transport + Send + 'static,
    D: ReplyDecoder + Send + 'static,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn poll_loop<T: Transport, D: ReplyDecoder>(
    mut client: Client<T, D>,
    mut tracker: ObjectTracker,
    config: PollConfig,
    sender: Sender<FrameSnapshot>,
    stop_flag: Arc<AtomicBool>,
) -> Client<T, D> {
    let mut pending_mode = config.mode;
    let mut sequence: u64 = 0;

    log::info!("Poller started");

    while !stop_flag.load(Ordering::Relaxed) {
        sequence += 1;
        let mut error: Option<ProtocolError> = None;

        if let Some(mode) = pending_mode {
            match client.set_mode(mode) {
                Ok(()) => {
                    tracker.reset();
                    pending_mode = None;
                }
                Err(e) => error = Some(e),
            }
        }

        let mut detections = Vec::new();
        if pending_mode.is_none() {
            match client.request_detections() {
                Ok(d) => detections = d,
                Err(e) => error = Some(e),
            }
        }

        if let Some(e) = &error {
            if !e.is_transient() {
                log::error!("Poller stopping: {}", e);
                stop_flag.store(true, Ordering::Relaxed);
                break;
            }
            log::warn!("Poll {} failed: {}", sequence, e);
        }

        let frame = tracker.update_records(&detections);
        let tracks: BTreeMap<u64, TrackSnapshot> = frame
            .into_iter()
            .map(|(id, bbox)| {
                let track = TrackSnapshot {
                    bbox,
                    trajectory: tracker.trajectory(id),
                    velocity: tracker.velocity(id),
                };
                (id, track)
            })
            .collect();
        let active = !tracks.is_empty();

        let snapshot = FrameSnapshot {
            sequence,
            detections,
            tracks,
            error: error.map(|e| e.to_string()),
        };

        if let Err(e) = sender.try_send(snapshot) {
            match e {
                crossbeam_channel::TrySendError::Full(_) => {
                    log::trace!("Snapshot channel full, dropping frame {}", sequence);
                }
                crossbeam_channel::TrySendError::Disconnected(_) => {
                    log::info!("Snapshot receiver gone, stopping poller");
                    break;
                }
            }
        }

        let interval = if active {
            config.active_interval
        } else {
            config.idle_interval
        };
        sleep_unless_stopped(interval, &stop_flag);
    }

    log::info!("Poller stopped after {} frame(s)", sequence);
    client
}

fn sleep_unless_stopped(duration: Duration, stop_flag: &AtomicBool) {
    let deadline = Instant::now() + duration;
    loop {
        if stop_flag.load(Ordering::Relaxed) {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        std::thread::sleep(remaining.min(STOP_CHECK_INTERVAL));
    }
}
