//! Scene camera: keeps `latest_camera_image` fresh for the reasoning worker.
//!
//! ```text
//! ImageSource::read_image  every 0.5 / frame_rate s
//!   ├─ Some(image) → [latest_camera_image], error streak = 0
//!   ├─ None        → nothing new, keep previous image
//!   └─ Err         → error streak += 1
//!                     streak == max_reading_errors → deregister, give up
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use thiserror::Error;

use crate::broker::{Broker, CameraImage, ComponentId, LatestCameraImage};
use crate::config::CameraConfig;
use crate::worker::{run_polling_loop, Poll, PollPolicy, StopToken};

pub const COMPONENT_ID: &str = "usb_camera";

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("cannot read snapshot {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("snapshot {0} is empty")]
    Empty(PathBuf),

    #[error("camera frame unavailable: {0}")]
    Unavailable(String),
}

/// Anything that yields encoded frames.
pub trait ImageSource {
    /// `Ok(None)` when no new frame is available yet.
    fn read_image(&mut self) -> Result<Option<CameraImage>, CameraError>;
}

// ---------------------------------------------------------------------------
// SnapshotFileSource
// ---------------------------------------------------------------------------

/// Reads a single image file that an external capture process overwrites.
/// A snapshot whose modification time has not changed is not re-read.
pub struct SnapshotFileSource {
    path: PathBuf,
    mime_type: String,
    last_modified: Option<SystemTime>,
}

impl SnapshotFileSource {
    pub fn new(path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mime_type: mime_type.into(),
            last_modified: None,
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        Self::new(&config.snapshot_path, &config.image_format)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_error(&self, source: io::Error) -> CameraError {
        CameraError::Read {
            path: self.path.clone(),
            source,
        }
    }
}

impl ImageSource for SnapshotFileSource {
    fn read_image(&mut self) -> Result<Option<CameraImage>, CameraError> {
        let modified = fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .map_err(|e| self.read_error(e))?;
        if self.last_modified == Some(modified) {
            return Ok(None);
        }

        let bytes = fs::read(&self.path).map_err(|e| self.read_error(e))?;
        if bytes.is_empty() {
            return Err(CameraError::Empty(self.path.clone()));
        }
        self.last_modified = Some(modified);
        Ok(Some(CameraImage::new(bytes, self.mime_type.clone())))
    }
}

// ---------------------------------------------------------------------------
// CameraWorker
// ---------------------------------------------------------------------------

pub struct CameraWorker<S> {
    broker: Arc<Broker>,
    source: S,
    interval: Duration,
    max_errors: u32,
    error_streak: u32,
}

impl<S: ImageSource> CameraWorker<S> {
    pub fn new(broker: Arc<Broker>, source: S, interval: Duration, max_errors: u32) -> Self {
        Self {
            broker,
            source,
            interval,
            max_errors: max_errors.max(1),
            error_streak: 0,
        }
    }

    pub fn error_streak(&self) -> u32 {
        self.error_streak
    }

    /// Publish frames until stopped or until the error streak reaches the
    /// limit, which is reported as an error.
    pub fn run(mut self, stop: &StopToken) -> anyhow::Result<()> {
        let id = ComponentId::new(COMPONENT_ID);
        let session = StopToken::new();
        let policy = PollPolicy::new(self.interval, self.interval);

        self.broker.register_running(id.clone());
        run_polling_loop(COMPONENT_ID, &session, policy, || {
            if stop.is_stopped() {
                session.stop();
                return Ok(Poll::Idle);
            }
            let outcome = self.step();
            if self.error_streak >= self.max_errors {
                session.stop();
            }
            outcome
        });
        self.broker.deregister_running(&id);

        if self.error_streak >= self.max_errors {
            anyhow::bail!(
                "{COMPONENT_ID}: giving up after {} consecutive read errors",
                self.error_streak
            );
        }
        Ok(())
    }

    /// Read at most one frame.
    pub fn step(&mut self) -> anyhow::Result<Poll> {
        match self.source.read_image() {
            Ok(Some(image)) => {
                self.error_streak = 0;
                self.broker.set(LatestCameraImage, image);
                Ok(Poll::Busy)
            }
            Ok(None) => {
                self.error_streak = 0;
                Ok(Poll::Idle)
            }
            Err(e) => {
                self.error_streak += 1;
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::RunningComponents;
    use std::collections::VecDeque;

    struct ScriptedCamera {
        script: VecDeque<Result<Option<CameraImage>, CameraError>>,
    }

    impl ScriptedCamera {
        fn new(script: Vec<Result<Option<CameraImage>, CameraError>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl ImageSource for ScriptedCamera {
        fn read_image(&mut self) -> Result<Option<CameraImage>, CameraError> {
            self.script
                .pop_front()
                .unwrap_or_else(|| Err(CameraError::Unavailable("script exhausted".into())))
        }
    }

    fn frame(byte: u8) -> Result<Option<CameraImage>, CameraError> {
        Ok(Some(CameraImage::new(vec![byte; 4], "image/jpeg")))
    }

    fn failure() -> Result<Option<CameraImage>, CameraError> {
        Err(CameraError::Unavailable("no frame".into()))
    }

    #[test]
    fn publishes_latest_frame() {
        let broker = Arc::new(Broker::new());
        let mut worker = CameraWorker::new(
            Arc::clone(&broker),
            ScriptedCamera::new(vec![frame(1), frame(2), Ok(None)]),
            Duration::from_millis(1),
            3,
        );

        assert_eq!(worker.step().unwrap(), Poll::Busy);
        assert_eq!(worker.step().unwrap(), Poll::Busy);
        assert_eq!(worker.step().unwrap(), Poll::Idle);
        assert_eq!(&*broker.get(LatestCameraImage).unwrap().bytes, &[2u8; 4]);
    }

    #[test]
    fn success_resets_the_error_streak() {
        let broker = Arc::new(Broker::new());
        let mut worker = CameraWorker::new(
            broker,
            ScriptedCamera::new(vec![failure(), failure(), frame(7), failure()]),
            Duration::from_millis(1),
            3,
        );

        assert!(worker.step().is_err());
        assert!(worker.step().is_err());
        assert_eq!(worker.error_streak(), 2);
        worker.step().unwrap();
        assert_eq!(worker.error_streak(), 0);
        assert!(worker.step().is_err());
        assert_eq!(worker.error_streak(), 1);
    }

    #[test]
    fn gives_up_after_consecutive_errors() {
        let broker = Arc::new(Broker::new());
        let worker = CameraWorker::new(
            Arc::clone(&broker),
            ScriptedCamera::new(vec![frame(1), failure(), failure(), failure()]),
            Duration::from_millis(1),
            3,
        );

        let err = worker.run(&StopToken::new()).unwrap_err();
        assert!(err.to_string().contains("3 consecutive read errors"));
        assert_eq!(broker.expected_component_number(), 1);
        assert_eq!(broker.size(RunningComponents), 0);
        assert!(broker.get(LatestCameraImage).is_some());
    }

    #[test]
    fn stop_ends_the_worker_cleanly() {
        let broker = Arc::new(Broker::new());
        let worker = CameraWorker::new(
            Arc::clone(&broker),
            ScriptedCamera::new((0..1_000).map(|_| Ok(None)).collect()),
            Duration::from_millis(1),
            3,
        );
        let stop = StopToken::new();
        stop.stop();
        assert!(worker.run(&stop).is_ok());
        assert_eq!(broker.size(RunningComponents), 0);
    }

    #[test]
    fn snapshot_file_is_read_once_per_modification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        fs::write(&path, [0xff, 0xd8, 0xff]).unwrap();

        let mut source = SnapshotFileSource::new(&path, "image/jpeg");
        let image = source.read_image().unwrap().unwrap();
        assert_eq!(&*image.bytes, &[0xff, 0xd8, 0xff]);
        assert_eq!(image.mime_type, "image/jpeg");
        assert!(source.read_image().unwrap().is_none());
    }

    #[test]
    fn snapshot_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut missing = SnapshotFileSource::new(dir.path().join("absent.jpg"), "image/jpeg");
        assert!(matches!(missing.read_image(), Err(CameraError::Read { .. })));

        let empty_path = dir.path().join("empty.jpg");
        fs::write(&empty_path, b"").unwrap();
        let mut empty = SnapshotFileSource::new(&empty_path, "image/jpeg");
        assert!(matches!(empty.read_image(), Err(CameraError::Empty(_))));
    }
}
