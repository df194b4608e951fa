use crate::protocol::{self, Command, MarkerScan, Packet, ReplyDecoder};
use crate::transport::Transport;
use crate::types::{AlgorithmMode, Arrow, DetectionKind, DetectionRecord};
use crate::{ProtocolError, Result};
use std::time::{Duration, Instant};

/// Per-session request settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// How long a request waits for its reply.
    pub timeout: Duration,
    /// Upper bound on the bytes read for one reply.
    pub read_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            read_buffer: 1024,
        }
    }
}

impl ClientConfig {
    /// Read `HUSKYLENS_TIMEOUT_MS` and `HUSKYLENS_READ_BUFFER`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout: Duration::from_millis(read_env_u64(
                "HUSKYLENS_TIMEOUT_MS",
                defaults.timeout.as_millis() as u64,
            )),
            read_buffer: read_env_u64("HUSKYLENS_READ_BUFFER", defaults.read_buffer as u64)
                .max(protocol::FRAME_OVERHEAD as u64) as usize,
        }
    }
}

/// A session with one sensor: the transport, the reply layout, and the
/// algorithm currently selected on the device.
///
/// Every request takes `&mut self`; a session is driven from one thread at a
/// time. Independent sensors get independent clients.
pub struct Client<T: Transport, D: ReplyDecoder = MarkerScan> {
    transport: Option<T>,
    decoder: D,
    config: ClientConfig,
    mode: Option<AlgorithmMode>,
}

impl<T: Transport> Client<T> {
    /// Open a session over `transport` with default settings.
    pub fn new(transport: T) -> Self {
        Self::with_decoder(transport, MarkerScan, ClientConfig::default())
    }

    /// Open a session over `transport` with explicit settings.
    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        Self::with_decoder(transport, MarkerScan, config)
    }

    /// A client with nothing attached; every request fails with `NotConnected`
    /// until `attach` is called.
    pub fn detached(config: ClientConfig) -> Self {
        Self {
            transport: None,
            decoder: MarkerScan,
            config,
            mode: None,
        }
    }
}

impl<T: Transport, D: ReplyDecoder> Client<T, D> {
    /// Open a session that interprets replies with a custom `decoder`.
    pub fn with_decoder(transport: T, decoder: D, config: ClientConfig) -> Self {
        Self {
            transport: Some(transport),
            decoder,
            config,
            mode: None,
        }
    }

    /// Attach a transport, returning the previous one if any. The held mode is
    /// cleared because the new device's state is unknown.
    pub fn attach(&mut self, transport: T) -> Option<T> {
        self.mode = None;
        self.transport.replace(transport)
    }

    /// Take the transport out, leaving the client detached.
    pub fn detach(&mut self) -> Option<T> {
        self.mode = None;
        self.transport.take()
    }

    /// Close the transport in place. Later requests fail with `NotConnected`.
    pub fn close(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            transport.close();
        }
        self.mode = None;
    }

    /// True if a transport is attached and reports open.
    pub fn is_connected(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_open())
    }

    /// Borrow the attached transport.
    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Settings used for every request.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Algorithm last confirmed by the device, `None` until `set_mode` succeeds.
    pub fn mode(&self) -> Option<AlgorithmMode> {
        self.mode
    }

    /// Switch the sensor's algorithm. The held mode only changes once the
    /// device has acknowledged with a valid frame.
    pub fn set_mode(&mut self, mode: AlgorithmMode) -> Result<()> {
        let reply = self.transaction(Command::Algorithm, &[mode.as_byte()])?;
        log::info!(
            "Algorithm set to {} (reply {:?}, {} payload bytes)",
            mode,
            reply.command,
            reply.payload.len()
        );
        self.mode = Some(mode);
        Ok(())
    }

    /// Ask for the blocks detected in the current frame.
    ///
    /// An empty list means nothing is in view. Errors are returned as-is; a
    /// polling loop should treat them as an empty frame and keep going.
    pub fn request_detections(&mut self) -> Result<Vec<DetectionRecord>> {
        let reply = self.transaction(Command::RequestBlocks, &[])?;
        let kind = self
            .mode
            .map(AlgorithmMode::detection_kind)
            .unwrap_or(DetectionKind::Object);
        let records = self.decoder.decode_blocks(kind, &reply.payload)?;
        log::debug!("Decoded {} block(s)", records.len());
        Ok(records)
    }

    /// Ask for line-tracking arrows.
    ///
    /// `MarkerScan` does not decode arrows yet, so with the default decoder
    /// this returns an empty list for every valid reply.
    pub fn request_arrows(&mut self) -> Result<Vec<Arrow>> {
        let reply = self.transaction(Command::RequestArrows, &[])?;
        self.decoder.decode_arrows(&reply.payload)
    }

    /// Tell the sensor to learn what is in view under `identity`.
    ///
    /// Success means the command was acknowledged; learning itself finishes
    /// on the device in its own time.
    pub fn teach_identity(&mut self, identity: u32) -> Result<()> {
        let payload = identity_payload(identity)?;
        self.transaction(Command::Learn, &payload)?;
        log::info!("Learn requested for identity {}", identity);
        Ok(())
    }

    /// Tell the sensor to drop the learned `identity`.
    pub fn forget_identity(&mut self, identity: u32) -> Result<()> {
        let payload = identity_payload(identity)?;
        self.transaction(Command::Forget, &payload)?;
        log::info!("Forget requested for identity {}", identity);
        Ok(())
    }

    /// Send one command and return the validated reply frame.
    ///
    /// encode -> write -> read until a whole frame, the buffer limit, or the
    /// timeout -> decode. No retries.
    pub fn transaction(&mut self, command: Command, payload: &[u8]) -> Result<Packet> {
        let request = protocol::encode(command, payload)?;
        let timeout = self.config.timeout;
        let max_len = self.config.read_buffer;

        let transport = match self.transport.as_mut() {
            Some(t) if t.is_open() => t,
            _ => return Err(ProtocolError::NotConnected),
        };

        transport.write(&request)?;
        log::trace!("-> {:02x?}", request);

        let response = read_frame(transport, max_len, timeout)?;
        log::trace!("<- {:02x?}", response);

        protocol::decode(&response)
    }
}

/// Accumulate reads until the frame announced by its length byte is complete.
fn read_frame<T: Transport>(transport: &mut T, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut response: Vec<u8> = Vec::new();

    loop {
        if let Some(len) = protocol::frame_len(&response) {
            if response.len() >= len {
                // Trailing bytes belong to nothing we asked for.
                response.truncate(len);
                break;
            }
        }
        if response.len() >= max_len {
            break;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        let chunk = transport.read(max_len - response.len(), remaining)?;
        if chunk.is_empty() {
            break;
        }
        response.extend_from_slice(&chunk);
    }

    if response.is_empty() {
        return Err(ProtocolError::Timeout);
    }
    Ok(response)
}

fn identity_payload(identity: u32) -> Result<[u8; 2]> {
    match u16::try_from(identity) {
        Ok(id) if id != 0 => Ok(id.to_le_bytes()),
        _ => Err(ProtocolError::MalformedPayload(format!(
            "identity {} outside 1..=65535",
            identity
        ))),
    }
}

#[cfg_attr(not(feature = "serial"), allow(dead_code))]
pub(crate) fn read_env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

pub(crate) fn read_env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg_attr(not(feature = "serial"), allow(dead_code))]
pub(crate) fn read_env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
