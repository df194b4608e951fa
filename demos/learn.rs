//! Teach or forget a learned identity.
//!
//! Usage: cargo run --example learn -- <learn|forget> <id> [mode-byte]

use huskylens::{AlgorithmMode, Client, ClientConfig, SerialConfig, SerialTransport};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (action, identity) = match (args.first(), args.get(1).and_then(|s| s.parse::<u32>().ok())) {
        (Some(a), Some(id)) if a == "learn" || a == "forget" => (a.clone(), id),
        _ => {
            eprintln!("Usage: learn <learn|forget> <id> [mode-byte]");
            std::process::exit(2);
        }
    };
    let mode = args
        .get(2)
        .and_then(|s| s.parse::<u8>().ok())
        .and_then(|b| AlgorithmMode::from_byte(b).ok())
        .unwrap_or(AlgorithmMode::ObjectRecognition);

    let port = match SerialTransport::from_config(&SerialConfig::from_env()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to open serial port: {}", e);
            std::process::exit(1);
        }
    };
    let mut client = Client::with_config(port, ClientConfig::from_env());

    let result = client.set_mode(mode).and_then(|_| {
        if action == "learn" {
            client.teach_identity(identity)
        } else {
            client.forget_identity(identity)
        }
    });

    match result {
        Ok(()) => println!("{} {} acknowledged ({})", action, identity, mode),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
