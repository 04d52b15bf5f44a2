use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serialport::SerialPort;

use crate::configs::Modem;
use crate::errors::ModemError;
use crate::services::modem::codec::strip_echo;

/// Outcome of a command/response exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The expected marker arrived; echo-stripped reply text
    Valid(String),
    /// Deadline passed without the marker; whatever was read, echo-stripped
    NoReply(String),
}

impl Reply {
    pub fn is_valid(&self) -> bool {
        matches!(self, Reply::Valid(_))
    }

    pub fn text(&self) -> &str {
        match self {
            Reply::Valid(text) | Reply::NoReply(text) => text,
        }
    }

    /// Valid and containing `needle`
    pub fn confirms(&self, needle: &str) -> bool {
        matches!(self, Reply::Valid(text) if text.contains(needle))
    }
}

/// Shared flag that unblocks and retires a transport from another task
#[derive(Debug, Clone, Default)]
pub struct LineCloser(Arc<AtomicBool>);

impl LineCloser {
    pub fn close(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[async_trait]
pub trait ModemTransport: Send + Sync {
    /// Writes `command`, then collects output until `expected` shows up or `timeout` passes
    async fn send(
        &mut self,
        command: &str,
        expected: &str,
        timeout: Duration,
    ) -> Result<Reply, ModemError>;

    fn closer(&self) -> LineCloser;
}

/// [`ModemTransport`] over a serial device
pub struct SerialTransport {
    port: Arc<Mutex<Box<dyn SerialPort>>>,
    settle: Duration,
    closer: LineCloser,
}

impl SerialTransport {
    /// Per-read timeout of the port, bounds how late a close is noticed
    const POLL: Duration = Duration::from_millis(100);

    pub fn open(modem: &Modem) -> Result<Self, ModemError> {
        tracing::debug!("Connect to port: {}", modem.port_path);

        let port = serialport::new(&modem.port_path, modem.baud_rate)
            .timeout(Self::POLL)
            .open()?;

        Ok(Self {
            port: Arc::new(Mutex::new(port)),
            settle: modem.settle(),
            closer: LineCloser::default(),
        })
    }
}

#[async_trait]
impl ModemTransport for SerialTransport {
    async fn send(
        &mut self,
        command: &str,
        expected: &str,
        timeout: Duration,
    ) -> Result<Reply, ModemError> {
        if self.closer.is_closed() {
            return Err(ModemError::LineClosed);
        }

        let port = self.port.clone();
        let closer = self.closer.clone();
        let settle = self.settle;
        let command = command.to_string();
        let expected = expected.to_string();

        let reply = tokio::task::spawn_blocking(move || {
            exchange(&port, &closer, &command, &expected, settle, timeout)
        })
        .await??;

        Ok(reply)
    }

    fn closer(&self) -> LineCloser {
        self.closer.clone()
    }
}

fn exchange(
    port: &Mutex<Box<dyn SerialPort>>,
    closer: &LineCloser,
    command: &str,
    expected: &str,
    settle: Duration,
    timeout: Duration,
) -> Result<Reply, ModemError> {
    let mut port = port.lock().map_err(|_| ModemError::LineClosed)?;

    port.write_all(command.as_bytes())?;
    port.flush()?;
    std::thread::sleep(settle);

    let (data, matched) = read_until(&mut *port, closer, expected, Instant::now() + timeout)?;

    Ok(decode_reply(&data, command, matched))
}

/// Reads until `expected` is reached or `deadline` passes, returning the bytes and
/// whether the marker was seen. Port read timeouts are polls, not failures.
fn read_until<R: Read + ?Sized>(
    reader: &mut R,
    closer: &LineCloser,
    expected: &str,
    deadline: Instant,
) -> Result<(Vec<u8>, bool), ModemError> {
    let mut data = Vec::new();
    let mut buffer = [0u8; 512];

    while Instant::now() < deadline {
        if closer.is_closed() {
            return Err(ModemError::LineClosed);
        }

        match reader.read(&mut buffer) {
            Ok(0) => continue,
            Ok(n) => {
                data.extend_from_slice(&buffer[..n]);
                if marker_reached(&data, expected.as_bytes()) {
                    return Ok((data, true));
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok((data, false))
}

/// Echo-stripped text; undecodable bytes become U+FFFD
fn decode_reply(data: &[u8], command: &str, matched: bool) -> Reply {
    let text = strip_echo(&String::from_utf8_lossy(data), command);
    tracing::debug!("Command: {:?}, Reply: {:?}", command, text);

    if matched {
        Reply::Valid(text)
    } else {
        Reply::NoReply(text)
    }
}

/// A marker ending in a line break must close the buffer, any other may appear anywhere
fn marker_reached(data: &[u8], marker: &[u8]) -> bool {
    if marker.ends_with(b"\n") {
        data.ends_with(marker)
    } else {
        contains(data, marker)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}
