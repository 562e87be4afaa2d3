//! Scripted transport for tests.
//!
//! `MockTransport` plays back a fixed script of command/reply exchanges: each
//! write is checked against the next expected command, and its canned reply
//! (if any) is queued for subsequent reads. A read with no queued bytes
//! reports a timeout, which is also how a truncated binary transfer shows up
//! on a real wire.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::adapters::Transport;
use crate::error::{VnaError, VnaResult};

/// Nominal deadline reported by starved mock reads.
const MOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// One expected command and its canned reply.
#[derive(Debug, Clone)]
pub struct Exchange {
    expect: String,
    reply: Option<Vec<u8>>,
}

impl Exchange {
    /// A set command: expected line, no reply.
    pub fn command(expect: &str) -> Self {
        Self {
            expect: expect.to_string(),
            reply: None,
        }
    }

    /// A query: expected line, newline-terminated text reply.
    pub fn query(expect: &str, reply: &str) -> Self {
        Self {
            expect: expect.to_string(),
            reply: Some(format!("{}\n", reply).into_bytes()),
        }
    }

    /// A query answered with raw bytes, queued exactly as given.
    pub fn query_raw(expect: &str, reply: Vec<u8>) -> Self {
        Self {
            expect: expect.to_string(),
            reply: Some(reply),
        }
    }
}

/// Transport double that validates the command sequence.
pub struct MockTransport {
    script: VecDeque<Exchange>,
    inbox: VecDeque<u8>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: bool,
}

impl MockTransport {
    /// Build a transport from a playback script.
    pub fn new(script: Vec<Exchange>) -> Self {
        Self {
            script: script.into(),
            inbox: VecDeque::new(),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: false,
        }
    }

    /// Handle onto the log of commands actually written, usable after the
    /// transport has been moved into a session.
    pub fn sent_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.sent)
    }

    /// Number of script entries not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    fn record(&self, command: &str) {
        let mut log = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        log.push(command.to_string());
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write_line(&mut self, command: &str) -> VnaResult<()> {
        if self.closed {
            return Err(VnaError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport already closed",
            )));
        }
        self.record(command);
        let exchange = self.script.pop_front().ok_or_else(|| {
            VnaError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected command with exhausted script: {}", command),
            ))
        })?;
        if exchange.expect != command {
            return Err(VnaError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "script expected '{}' but driver sent '{}'",
                    exchange.expect, command
                ),
            )));
        }
        if let Some(reply) = exchange.reply {
            self.inbox.extend(reply);
        }
        Ok(())
    }

    async fn read_line(&mut self) -> VnaResult<String> {
        let terminator = self
            .inbox
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(VnaError::Timeout(MOCK_TIMEOUT))?;
        let line: Vec<u8> = self.inbox.drain(..=terminator).collect();
        Ok(String::from_utf8_lossy(&line).trim().to_string())
    }

    async fn read_exact(&mut self, n: usize) -> VnaResult<Vec<u8>> {
        if self.inbox.len() < n {
            return Err(VnaError::Timeout(MOCK_TIMEOUT));
        }
        Ok(self.inbox.drain(..n).collect())
    }

    async fn close(&mut self) -> VnaResult<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_replays_script_in_order() {
        tokio_test::block_on(async {
            let mut mock = MockTransport::new(vec![
                Exchange::command("*CLS"),
                Exchange::query("*IDN?", "Rohde&Schwarz,ZVA40,100042,1.10"),
            ]);

            mock.write_line("*CLS").await.unwrap();
            mock.write_line("*IDN?").await.unwrap();
            let idn = mock.read_line().await.unwrap();
            assert_eq!(idn, "Rohde&Schwarz,ZVA40,100042,1.10");
            assert_eq!(mock.remaining(), 0);
        });
    }

    #[test]
    fn test_mock_rejects_out_of_script_command() {
        tokio_test::block_on(async {
            let mut mock = MockTransport::new(vec![Exchange::command("*CLS")]);
            let err = mock.write_line("*RST").await.unwrap_err();
            assert!(matches!(err, VnaError::Io(_)));
        });
    }

    #[test]
    fn test_mock_starved_read_times_out() {
        tokio_test::block_on(async {
            let mut mock = MockTransport::new(vec![Exchange::command("*CLS")]);
            mock.write_line("*CLS").await.unwrap();
            assert!(matches!(mock.read_line().await, Err(VnaError::Timeout(_))));
            assert!(matches!(mock.read_exact(8).await, Err(VnaError::Timeout(_))));
        });
    }
}
