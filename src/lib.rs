//! # huskylens - host-side client for the HuskyLens vision sensor
//!
//! Talks to the sensor over its framed serial protocol and tracks what it
//! reports across frames. Provides:
//! - Packet framing with modulo-256 checksums and typed reply decoding
//! - A session `Client` for algorithm selection, detection polling and
//!   learn/forget commands
//! - An `ObjectTracker` assigning stable ids, trajectories and velocities
//! - An optional background `Poller` that hands frame snapshots to other threads
//!
//! ## Quick Start
//! ```no_run
//! use huskylens::{AlgorithmMode, Client, ObjectTracker, SerialTransport};
//! use std::time::Duration;
//!
//! let port = SerialTransport::open("/dev/ttyUSB0", 9600, Duration::from_secs(1)).unwrap();
//! let mut client = Client::new(port);
//! client.set_mode(AlgorithmMode::FaceRecognition).unwrap();
//!
//! let mut tracker = ObjectTracker::default();
//! for _ in 0..100 {
//!     let records = client.request_detections().unwrap_or_default();
//!     for (id, bbox) in tracker.update_records(&records) {
//!         println!("track {}: {:?} v={:?}", id, bbox, tracker.velocity(id));
//!     }
//!     std::thread::sleep(Duration::from_millis(100));
//! }
//! ```

pub mod error;
pub mod types;
pub mod protocol;
pub mod transport;
pub mod client;
pub mod tracker;
pub mod poller;

pub use error::ProtocolError;
pub use types::*;
pub use protocol::{Command, MarkerScan, Packet, ReplyDecoder};
pub use transport::Transport;
#[cfg(feature = "serial")]
pub use transport::{SerialConfig, SerialTransport};
pub use client::{Client, ClientConfig};
pub use tracker::{ObjectTracker, TrackedObject, TrackerConfig};
pub use poller::{FrameSnapshot, PollConfig, Poller, TrackSnapshot};

/// Result type alias for huskylens operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
