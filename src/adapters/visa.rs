//! GPIB transport via VISA.
//!
//! GPIB adapters have no portable userspace API, so this transport goes
//! through a local VISA installation using the `visa-rs` crate. VISA calls
//! are blocking; they run on tokio's blocking executor so the async session
//! API stays uniform across transports.
//!
//! Enabled with the `instrument_visa` feature.

use std::ffi::CString;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::debug;
use visa_rs::prelude::*;

use crate::adapters::Transport;
use crate::config::{InstrumentAddress, TimeoutSettings};
use crate::error::{VnaError, VnaResult};

/// GPIB (IEEE-488) transport backed by a VISA session.
pub struct VisaTransport {
    session: Arc<Mutex<Instrument>>,
    io_timeout: Duration,
    resource: String,
}

impl VisaTransport {
    /// Open the VISA resource for `address`.
    pub async fn open(address: &InstrumentAddress, timeouts: &TimeoutSettings) -> VnaResult<Self> {
        let resource = address.resource_string();
        let resource_for_task = resource.clone();

        let session = tokio::task::spawn_blocking(move || -> Result<Instrument, String> {
            let rm = DefaultRM::new().map_err(|e| e.to_string())?;
            let c_string =
                CString::new(resource_for_task.clone()).map_err(|e| e.to_string())?;
            let visa_string = visa_rs::VisaString::from(c_string);
            rm.open(&visa_string, AccessMode::NO_LOCK, TIMEOUT_IMMEDIATE)
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| VnaError::Connect(format!("VISA open task failed: {}", e)))?
        .map_err(|e| VnaError::Connect(format!("failed to open {}: {}", resource, e)))?;

        debug!("[{}] VISA session opened", resource);
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            io_timeout: timeouts.io,
            resource,
        })
    }
}

fn lock_session(session: &Arc<Mutex<Instrument>>) -> std::sync::MutexGuard<'_, Instrument> {
    session.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl Transport for VisaTransport {
    async fn write_line(&mut self, command: &str) -> VnaResult<()> {
        let session = Arc::clone(&self.session);
        let framed = format!("{}\n", command);
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut guard = lock_session(&session);
            guard.write_all(framed.as_bytes())
        })
        .await
        .map_err(|e| VnaError::Connect(format!("VISA write task failed: {}", e)))??;
        debug!("[{}] sent: {}", self.resource, command);
        Ok(())
    }

    async fn read_line(&mut self) -> VnaResult<String> {
        let session = Arc::clone(&self.session);
        let deadline = self.io_timeout;
        let line = tokio::task::spawn_blocking(move || -> VnaResult<String> {
            let mut guard = lock_session(&session);
            let start = Instant::now();
            let mut response: Vec<u8> = Vec::new();
            let mut buffer = [0u8; 1];
            loop {
                if start.elapsed() > deadline {
                    return Err(VnaError::Timeout(deadline));
                }
                let n = guard.read(&mut buffer)?;
                if n == 0 {
                    continue;
                }
                if buffer[0] == b'\n' {
                    break;
                }
                response.push(buffer[0]);
            }
            Ok(String::from_utf8_lossy(&response).trim().to_string())
        })
        .await
        .map_err(|e| VnaError::Connect(format!("VISA read task failed: {}", e)))??;
        debug!("[{}] received: {}", self.resource, line);
        Ok(line)
    }

    async fn read_exact(&mut self, n: usize) -> VnaResult<Vec<u8>> {
        let session = Arc::clone(&self.session);
        let deadline = self.io_timeout;
        let payload = tokio::task::spawn_blocking(move || -> VnaResult<Vec<u8>> {
            let mut guard = lock_session(&session);
            let start = Instant::now();
            let mut collected: Vec<u8> = Vec::with_capacity(n);
            let mut buffer = vec![0u8; 4096];
            while collected.len() < n {
                if start.elapsed() > deadline {
                    return Err(VnaError::Timeout(deadline));
                }
                let want = (n - collected.len()).min(buffer.len());
                let got = guard.read(&mut buffer[..want])?;
                collected.extend_from_slice(&buffer[..got]);
            }
            Ok(collected)
        })
        .await
        .map_err(|e| VnaError::Connect(format!("VISA read task failed: {}", e)))??;
        debug!("[{}] received {} raw bytes", self.resource, n);
        Ok(payload)
    }

    async fn close(&mut self) -> VnaResult<()> {
        debug!("[{}] VISA session closed", self.resource);
        Ok(())
    }
}
