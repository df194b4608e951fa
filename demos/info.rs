//! Select an algorithm and print one frame of detections.
//!
//! Usage: HUSKYLENS_PORT=/dev/ttyUSB0 cargo run --example info [mode-byte]

use huskylens::{AlgorithmMode, Client, ClientConfig, SerialConfig, SerialTransport};

fn main() {
    env_logger::init();

    let mode = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse::<u8>().ok())
        .map(AlgorithmMode::from_byte)
        .unwrap_or(Ok(AlgorithmMode::FaceRecognition));
    let mode = match mode {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    let serial = SerialConfig::from_env();
    let port = match SerialTransport::from_config(&serial) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to open {}: {}", serial.path, e);
            std::process::exit(1);
        }
    };

    let mut client = Client::with_config(port, ClientConfig::from_env());
    if let Err(e) = client.set_mode(mode) {
        eprintln!("Failed to select {}: {}", mode, e);
        std::process::exit(1);
    }

    println!("Port:  {} @ {} baud", serial.path, serial.baud_rate);
    println!("Mode:  {} (outputs {:?})", mode, mode.outputs());
    println!();

    match client.request_detections() {
        Ok(records) if records.is_empty() => println!("Nothing detected"),
        Ok(records) => {
            for (i, r) in records.iter().enumerate() {
                let center = r.center();
                println!(
                    "  [{}] {:?} id={:?} box=({}, {}, {}x{}) center=({}, {})",
                    i, r.kind, r.identity, r.x, r.y, r.width, r.height, center.x, center.y
                );
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
