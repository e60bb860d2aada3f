//! Camera-driven QR scanner for the door.
//!
//! ```text
//! Idle --start--> Requesting --opened--> Scanning --stop/drop/device error--> Stopped
//!                      |
//!                      +--denied/no camera/busy--> Idle (error reported)
//! ```
//!
//! While scanning, frames are sampled at a fixed rate and every successful
//! decode is handed to the callback. A hit does not stop the scanner; the
//! caller decides. The camera session is owned by the scanning task and is
//! released whenever that task ends, however it ends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

mod frame;

pub use frame::{decode_frame, Frame, MAX_FRAME_SIDE};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("no camera found")]
    NotFound,

    #[error("camera is in use by another application")]
    Busy,

    #[error("camera failure: {0}")]
    Device(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScannerError {
    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error("scanner is already running")]
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerState {
    Idle,
    Requesting,
    Scanning,
    Stopped,
}

#[async_trait]
pub trait Camera: Send + Sync {
    /// Negotiates permission and opens the device.
    async fn open(&self) -> Result<Box<dyn CameraSession>, CameraError>;
}

#[async_trait]
pub trait CameraSession: Send {
    /// Grabs the current frame, or `None` if the device has nothing new yet.
    async fn capture(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Closes the device. Called exactly once.
    fn release(&mut self);
}

/// Releases the camera when dropped, including when the task is aborted.
struct SessionGuard(Box<dyn CameraSession>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.release();
        debug!("camera session released");
    }
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub frames_per_second: u32,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            frames_per_second: 10,
        }
    }
}

impl ScannerConfig {
    fn frame_period(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.frames_per_second.max(1)))
    }
}

type DecodeCallback = Arc<dyn Fn(String) + Send + Sync>;

pub struct Scanner {
    camera: Arc<dyn Camera>,
    config: ScannerConfig,
    state: Arc<watch::Sender<ScannerState>>,
    errors: mpsc::UnboundedSender<ScannerError>,
    task: Option<JoinHandle<()>>,
}

impl Scanner {
    /// Returns the scanner together with its error channel. Only device and
    /// permission failures are sent there.
    pub fn new(
        camera: Arc<dyn Camera>,
        config: ScannerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ScannerError>) {
        let (errors, error_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ScannerState::Idle);
        let scanner = Self {
            camera,
            config,
            state: Arc::new(state),
            errors,
            task: None,
        };
        (scanner, error_rx)
    }

    pub fn state(&self) -> ScannerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScannerState> {
        self.state.subscribe()
    }

    pub async fn start<F>(&mut self, on_decode: F) -> Result<(), ScannerError>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        if matches!(
            self.state(),
            ScannerState::Requesting | ScannerState::Scanning
        ) {
            return Err(ScannerError::AlreadyRunning);
        }

        self.state.send_replace(ScannerState::Requesting);
        let session = match self.camera.open().await {
            Ok(session) => SessionGuard(session),
            Err(err) => {
                warn!(error = %err, "camera could not be opened");
                self.state.send_replace(ScannerState::Idle);
                let err = ScannerError::Camera(err);
                let _ = self.errors.send(err.clone());
                return Err(err);
            }
        };

        self.state.send_replace(ScannerState::Scanning);
        info!(fps = self.config.frames_per_second, "scanner started");
        self.task = Some(tokio::spawn(scan_loop(
            session,
            self.config.frame_period(),
            Arc::new(on_decode),
            Arc::clone(&self.state),
            self.errors.clone(),
        )));
        Ok(())
    }

    /// Stops scanning. The camera has been released when this returns.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        if self.state() != ScannerState::Idle {
            self.state.send_replace(ScannerState::Stopped);
        }
        info!("scanner stopped");
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn scan_loop(
    mut session: SessionGuard,
    period: Duration,
    on_decode: DecodeCallback,
    state: Arc<watch::Sender<ScannerState>>,
    errors: mpsc::UnboundedSender<ScannerError>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match session.0.capture().await {
            Ok(Some(frame)) => {
                if let Some(text) = decode_frame(&frame) {
                    debug!(bytes = text.len(), "decoded QR code");
                    on_decode(text);
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "camera failed while scanning");
                let _ = errors.send(ScannerError::Camera(err));
                break;
            }
        }
    }

    drop(session);
    state.send_replace(ScannerState::Stopped);
}
