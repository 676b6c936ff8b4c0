//! Persistent Python daemon hosting one engine
//!
//! The daemon listens on a Unix socket. Every call opens a connection and
//! exchanges one request and one response, each framed as a 4-byte
//! big-endian length followed by JSON.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::{Error, Result};

/// Upper bound on a single frame
pub(crate) const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct ControlRequest {
    command: &'static str,
}

/// Response from the daemon
#[derive(Debug, Default, Deserialize)]
pub struct DaemonResponse {
    pub status: Option<String>,
    pub error: Option<String>,
    pub text: Option<String>,
    pub language: Option<String>,
    pub device: Option<String>,
}

/// Handle to a running daemon. Dropping a handle that spawned its daemon
/// shuts the daemon down.
pub struct PythonDaemon {
    engine: String,
    socket_path: PathBuf,
    process: Mutex<Option<Child>>,
}

impl PythonDaemon {
    /// Spawn `python_cmd daemon_script --socket <path> --engine <engine> <args>`
    /// and wait until it answers a `check`.
    pub fn spawn(settings: &Settings, engine: &str, args: Vec<OsString>) -> Result<Self> {
        std::fs::create_dir_all(&settings.runtime_dir)?;
        let socket_path = settings
            .runtime_dir
            .join(format!("{}-{}.sock", engine, Uuid::new_v4().simple()));

        info!("Starting {} daemon on {:?}", engine, socket_path);

        let child = Command::new(&settings.python_cmd)
            .arg(&settings.daemon_script)
            .arg("--socket")
            .arg(&socket_path)
            .arg("--engine")
            .arg(engine)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                Error::EngineConstructionFailed(format!("Failed to start {} daemon: {}", engine, e))
            })?;

        let daemon = Self {
            engine: engine.to_string(),
            socket_path,
            process: Mutex::new(Some(child)),
        };
        daemon.wait_ready(Duration::from_secs(settings.daemon_startup_timeout_secs))?;

        info!("{} daemon ready", engine);
        Ok(daemon)
    }

    /// Handle to a daemon someone else manages
    pub fn attach(engine: &str, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            engine: engine.to_string(),
            socket_path: socket_path.into(),
            process: Mutex::new(None),
        }
    }

    /// Send one request. Transport failures and `error` responses are
    /// reported through `fail`.
    pub fn call<T: Serialize>(
        &self,
        request: &T,
        fail: fn(String) -> Error,
    ) -> Result<DaemonResponse> {
        let body = serde_json::to_vec(request)?;
        let response = self
            .exchange(&body)
            .map_err(|e| fail(format!("{} daemon: {}", self.engine, e)))?;

        let response: DaemonResponse = serde_json::from_slice(&response)
            .map_err(|e| fail(format!("Failed to parse {} daemon response: {}", self.engine, e)))?;

        if let Some(error) = response.error {
            return Err(fail(error));
        }
        Ok(response)
    }

    fn exchange(&self, body: &[u8]) -> io::Result<Vec<u8>> {
        let mut stream = UnixStream::connect(&self.socket_path)?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT)).ok();
        write_frame(&mut stream, body)?;
        read_frame(&mut stream)
    }

    fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        let mut next_report = Duration::from_secs(5);

        loop {
            if let Some(status) = self.exited()? {
                return Err(Error::EngineConstructionFailed(format!(
                    "{} daemon exited during startup ({})",
                    self.engine, status
                )));
            }

            if self.socket_path.exists() {
                let check = ControlRequest { command: "check" };
                if let Ok(response) = self.call(&check, Error::EngineConstructionFailed) {
                    if response.status.as_deref() == Some("ok") {
                        if let Some(device) = response.device {
                            info!("{} daemon running on {}", self.engine, device);
                        }
                        return Ok(());
                    }
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(Error::EngineConstructionFailed(format!(
                    "{} daemon failed to start within {} seconds",
                    self.engine,
                    timeout.as_secs()
                )));
            }
            if elapsed >= next_report {
                debug!(
                    "Waiting for {} daemon to start... ({}s)",
                    self.engine,
                    elapsed.as_secs()
                );
                next_report += Duration::from_secs(5);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn exited(&self) -> Result<Option<std::process::ExitStatus>> {
        let mut process = self.process.lock().unwrap_or_else(PoisonError::into_inner);
        match process.as_mut() {
            Some(child) => Ok(child.try_wait()?),
            None => Ok(None),
        }
    }
}

impl Drop for PythonDaemon {
    fn drop(&mut self) {
        let process = self
            .process
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(mut child) = process.take() else {
            return;
        };

        info!("Stopping {} daemon", self.engine);
        if let Ok(body) = serde_json::to_vec(&ControlRequest { command: "shutdown" }) {
            if let Ok(mut stream) = UnixStream::connect(&self.socket_path) {
                stream.set_read_timeout(Some(SHUTDOWN_GRACE)).ok();
                stream.set_write_timeout(Some(SHUTDOWN_GRACE)).ok();
                let _ = write_frame(&mut stream, &body).and_then(|()| read_frame(&mut stream));
            }
        }

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(_) => break,
            }
        }
        if let Ok(None) = child.try_wait() {
            warn!("{} daemon did not exit, killing it", self.engine);
            let _ = child.kill();
            let _ = child.wait();
        }

        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Write a length-prefixed frame
pub(crate) fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    if payload.len() > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds limit", payload.len()),
        ));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Read a length-prefixed frame
pub(crate) fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut length = [0u8; 4];
    reader.read_exact(&mut length)?;
    let length = u32::from_be_bytes(length) as usize;
    if length > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", length),
        ));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}
