//! Raw SCPI socket transport.
//!
//! Most bench VNAs expose a "SCPI raw" TCP service (commonly port 5025) with
//! newline-terminated commands and replies. This transport wraps a tokio
//! `TcpStream` with the session deadlines from [`TimeoutSettings`].

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::adapters::Transport;
use crate::config::TimeoutSettings;
use crate::error::{VnaError, VnaResult};

/// TCP/IP socket transport.
pub struct TcpTransport {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    io_timeout: Duration,
    peer: String,
}

impl TcpTransport {
    /// Connect to `host:port` within the configured connect deadline.
    pub async fn connect(host: &str, port: u16, timeouts: &TimeoutSettings) -> VnaResult<Self> {
        let peer = format!("{}:{}", host, port);
        let stream = timeout(timeouts.connect, TcpStream::connect(&peer))
            .await
            .map_err(|_| {
                VnaError::Connect(format!(
                    "connect to {} timed out after {:?}",
                    peer, timeouts.connect
                ))
            })?
            .map_err(|e| VnaError::Connect(format!("failed to connect to {}: {}", peer, e)))?;

        // Command/response latency matters more than throughput here.
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        debug!("[{}] socket connected", peer);
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            io_timeout: timeouts.io,
            peer,
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn write_line(&mut self, command: &str) -> VnaResult<()> {
        let framed = format!("{}\n", command);
        timeout(self.io_timeout, self.writer.write_all(framed.as_bytes()))
            .await
            .map_err(|_| VnaError::Timeout(self.io_timeout))??;
        debug!("[{}] sent: {}", self.peer, command);
        Ok(())
    }

    async fn read_line(&mut self) -> VnaResult<String> {
        let mut buf = Vec::new();
        let n = timeout(self.io_timeout, self.reader.read_until(b'\n', &mut buf))
            .await
            .map_err(|_| VnaError::Timeout(self.io_timeout))??;
        if n == 0 {
            return Err(VnaError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by instrument",
            )));
        }
        let line = String::from_utf8_lossy(&buf).trim().to_string();
        debug!("[{}] received: {}", self.peer, line);
        Ok(line)
    }

    async fn read_exact(&mut self, n: usize) -> VnaResult<Vec<u8>> {
        let mut buf = vec![0u8; n];
        timeout(self.io_timeout, self.reader.read_exact(&mut buf))
            .await
            .map_err(|_| VnaError::Timeout(self.io_timeout))??;
        debug!("[{}] received {} raw bytes", self.peer, n);
        Ok(buf)
    }

    async fn close(&mut self) -> VnaResult<()> {
        self.writer.shutdown().await?;
        debug!("[{}] socket closed", self.peer);
        Ok(())
    }
}
