//! Poll detections in the background and print tracked objects.
//!
//! Usage: cargo run --example track [mode-byte]
//! Press Ctrl+C to stop.

use huskylens::{
    AlgorithmMode, Client, ClientConfig, ObjectTracker, PollConfig, Poller, ProtocolError,
    SerialConfig, SerialTransport,
};
use std::time::Duration;

fn main() {
    env_logger::init();

    let mode = std::env::args()
        .nth(1)
        .and_then(|s| s.parse::<u8>().ok())
        .and_then(|b| AlgorithmMode::from_byte(b).ok())
        .unwrap_or(AlgorithmMode::ObjectTracking);

    let port = match SerialTransport::from_config(&SerialConfig::from_env()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to open serial port: {}", e);
            std::process::exit(1);
        }
    };

    let client = Client::with_config(port, ClientConfig::from_env());
    let config = PollConfig {
        mode: Some(mode),
        ..PollConfig::default()
    };
    let poller = match Poller::start(client, ObjectTracker::default(), config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to start poller: {}", e);
            std::process::exit(1);
        }
    };

    println!("Tracking in {} mode (Ctrl+C to stop)...", mode);

    let mut idle_timeouts: u32 = 0;
    loop {
        match poller.recv_timeout(Duration::from_secs(3)) {
            Ok(frame) => {
                idle_timeouts = 0;
                if let Some(err) = &frame.error {
                    eprintln!("frame {}: {}", frame.sequence, err);
                    continue;
                }
                if frame.tracks.is_empty() {
                    println!("frame {}: searching...", frame.sequence);
                }
                for (id, track) in &frame.tracks {
                    let c = track.bbox.center();
                    println!(
                        "frame {:<6} track {:<4} center=({:>3}, {:>3})  size={}x{}  v=({:+.1}, {:+.1})  points={}",
                        frame.sequence,
                        id,
                        c.x,
                        c.y,
                        track.bbox.width,
                        track.bbox.height,
                        track.velocity.0,
                        track.velocity.1,
                        track.trajectory.len(),
                    );
                }
                if let Some(target) = huskylens::largest(&frame.detections) {
                    let s = huskylens::steer(target, huskylens::FRAME_WIDTH, huskylens::FRAME_HEIGHT);
                    println!("  steer: {:?} {:?} {:?}", s.horizontal, s.vertical, s.proximity);
                }
            }
            Err(ProtocolError::Timeout) => {
                idle_timeouts += 1;
                eprintln!("No frame for 3s (timeout #{})", idle_timeouts);
                if idle_timeouts >= 10 {
                    break;
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }
}
