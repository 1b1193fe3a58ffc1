//! Message transport abstraction. The engine needs two read modes: a
//! blocking wait while a thread is genuinely stopped, and a zero-timeout
//! poll while the debuggee runs free (the poll gate). The receive and send
//! halves are independent objects under independent locks: a thread blocked
//! waiting for a command must never delay another thread's outgoing report.
//! Repeated I/O failures past a bounded retry budget force session
//! termination.

use crate::protocol::{decode_incoming, encode_outgoing, IncomingMessage, OutgoingMessage};
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Consecutive I/O failures tolerated before the session is torn down.
const IO_RETRY_BUDGET: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed by peer")]
    Closed,
    #[error("i/o retry budget exhausted: {0}")]
    RetryBudget(std::io::Error),
    #[error("message codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Receiving half of a transport.
pub trait TransportRx: Send {
    /// Wait for the next command; blocks until one arrives.
    fn recv_blocking(&mut self) -> Result<IncomingMessage, TransportError>;

    /// Drain one already-arrived command, if any, without blocking.
    fn try_recv(&mut self) -> Result<Option<IncomingMessage>, TransportError>;
}

/// Sending half of a transport.
pub trait TransportTx: Send {
    /// Write a single message line, with `debuggerId` injected.
    fn send(&mut self, message: &OutgoingMessage, debugger_id: &str)
        -> Result<(), TransportError>;
}

/// A connected transport, pre-split into its two halves.
pub struct Transport {
    pub rx: Box<dyn TransportRx>,
    pub tx: Box<dyn TransportTx>,
}

impl Transport {
    pub fn new(rx: Box<dyn TransportRx>, tx: Box<dyn TransportTx>) -> Self {
        Transport { rx, tx }
    }

    /// Newline-delimited JSON over TCP. The stream is duplicated so the two
    /// halves carry their own handles.
    pub fn tcp(stream: TcpStream) -> std::io::Result<Self> {
        stream.set_nodelay(true)?;
        let write_half = stream.try_clone()?;
        Ok(Transport {
            rx: Box::new(TcpRx {
                stream,
                pending: Vec::new(),
                recv_failures: 0,
            }),
            tx: Box::new(TcpTx { stream: write_half }),
        })
    }
}

/// Receiving half of a TCP connection.
pub struct TcpRx {
    stream: TcpStream,
    /// Bytes received but not yet consumed as a full line.
    pending: Vec<u8>,
    recv_failures: u32,
}

impl TcpRx {
    /// Extract the next complete line from the pending buffer.
    fn take_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line).trim_end().to_string())
    }

    /// Read more bytes from the socket. `blocking=false` returns Ok(false)
    /// once the socket has nothing buffered. Transient read errors are
    /// retried up to the budget; only repeated failures are fatal.
    fn fill(&mut self, blocking: bool) -> Result<bool, TransportError> {
        // a read timeout, not O_NONBLOCK: the descriptor status flag would
        // be shared with the duplicated write half
        let timeout = (!blocking).then(|| Duration::from_millis(1));
        self.stream
            .set_read_timeout(timeout)
            .map_err(TransportError::RetryBudget)?;
        loop {
            let mut chunk = [0u8; 4096];
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => {
                    self.recv_failures = 0;
                    self.pending.extend_from_slice(&chunk[..n]);
                    return Ok(true);
                }
                Err(e)
                    if !blocking
                        && matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    return Ok(false)
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                    return Err(TransportError::Closed)
                }
                Err(e) => {
                    self.recv_failures += 1;
                    log::warn!(
                        target: "protocol",
                        "recv failure {}/{IO_RETRY_BUDGET}: {e}",
                        self.recv_failures
                    );
                    if self.recv_failures >= IO_RETRY_BUDGET {
                        return Err(TransportError::RetryBudget(e));
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }
    }

    fn decode_or_skip(line: String) -> Option<IncomingMessage> {
        if line.is_empty() {
            return None;
        }
        match decode_incoming(&line) {
            Ok(message) => Some(message),
            Err(err) => {
                // protocol error: drop the message, session continues
                log::warn!(target: "protocol", "malformed command dropped: {err}");
                None
            }
        }
    }
}

impl TransportRx for TcpRx {
    fn recv_blocking(&mut self) -> Result<IncomingMessage, TransportError> {
        loop {
            while let Some(line) = self.take_line() {
                if let Some(message) = Self::decode_or_skip(line) {
                    return Ok(message);
                }
            }
            self.fill(true)?;
        }
    }

    fn try_recv(&mut self) -> Result<Option<IncomingMessage>, TransportError> {
        loop {
            if let Some(line) = self.take_line() {
                match Self::decode_or_skip(line) {
                    Some(message) => return Ok(Some(message)),
                    None => continue,
                }
            }
            if !self.fill(false)? {
                return Ok(None);
            }
        }
    }
}

/// Sending half of a TCP connection.
pub struct TcpTx {
    stream: TcpStream,
}

impl TransportTx for TcpTx {
    fn send(
        &mut self,
        message: &OutgoingMessage,
        debugger_id: &str,
    ) -> Result<(), TransportError> {
        let mut line = encode_outgoing(message, debugger_id)?;
        line.push('\n');
        let bytes = line.as_bytes();

        // the written offset survives retries: a partial write must never
        // be resent from the start of the line
        let mut written = 0;
        let mut failures = 0;
        while written < bytes.len() {
            match self.stream.write(&bytes[written..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => {
                    failures = 0;
                    written += n;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset
                    ) =>
                {
                    return Err(TransportError::Closed)
                }
                Err(e) => {
                    failures += 1;
                    log::warn!(
                        target: "protocol",
                        "send failure {failures}/{IO_RETRY_BUDGET}: {e}"
                    );
                    if failures >= IO_RETRY_BUDGET {
                        return Err(TransportError::RetryBudget(e));
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }
        Ok(())
    }
}
