use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    utils::{CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
};

use super::{
    rgba_converter,
    source::{FrameSource, now_ms},
};
use crate::types::Frame;

const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

/// How long `next_frame` waits for the capture thread before reporting "no frame".
const FRAME_WAIT: Duration = Duration::from_millis(100);

fn requested_formats() -> [RequestedFormat<'static>; 3] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

fn build_camera(index: CameraIndex) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats() {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
}

#[derive(Debug)]
struct CaptureThread {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CaptureThread {
    fn start(camera_index: u32, frame_tx: Sender<Frame>) -> Result<Self> {
        let index = CameraIndex::Index(camera_index);
        // Fail fast before spawning the capture thread.
        build_camera(index.clone())
            .with_context(|| format!("failed to open camera {camera_index}"))?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::spawn(move || {
            let mut camera = match build_camera(index) {
                Ok(cam) => cam,
                Err(err) => {
                    log::error!("failed to open camera {camera_index}: {err:?}");
                    return;
                }
            };
            log::info!("camera {camera_index} streaming");

            while !stop_flag.load(Ordering::Relaxed) {
                let frame_start = Instant::now();
                let buffer = match camera.frame() {
                    Ok(buffer) => buffer,
                    Err(err) => {
                        log::warn!(
                            "camera frame read failed (after {:?}): {err:?}",
                            frame_start.elapsed()
                        );
                        continue;
                    }
                };

                let converted = match rgba_converter::convert_camera_frame(&buffer) {
                    Ok(rgba) => rgba,
                    Err(err) => {
                        log::warn!("failed to decode camera frame {err:?}");
                        continue;
                    }
                };

                let frame = Frame {
                    rgba: converted.rgba,
                    width: converted.width,
                    height: converted.height,
                    timestamp_ms: now_ms(),
                };

                // Drop if the main loop is busy.
                let _ = frame_tx.try_send(frame);
            }
            log::info!("camera {camera_index} stopped");
        });

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

/// Webcam capture on a background thread; the main loop always sees the newest frame.
pub struct WebcamSource {
    capture: CaptureThread,
    frame_rx: Receiver<Frame>,
    camera_index: u32,
}

impl WebcamSource {
    pub fn open(camera_index: u32) -> Result<Self> {
        let (frame_tx, frame_rx) = bounded(1);
        let capture = CaptureThread::start(camera_index, frame_tx)?;
        Ok(Self {
            capture,
            frame_rx,
            camera_index,
        })
    }

    pub fn camera_index(&self) -> u32 {
        self.camera_index
    }
}

impl FrameSource for WebcamSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.frame_rx.recv_timeout(FRAME_WAIT) {
            Ok(mut frame) => {
                while let Ok(newer) = self.frame_rx.try_recv() {
                    frame = newer;
                }
                Ok(Some(frame))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(anyhow!("camera {} capture thread exited", self.camera_index))
            }
        }
    }

    fn reopen(&mut self, camera_index: u32) -> Result<()> {
        // The running stream stays up until the new device is streaming.
        let (frame_tx, frame_rx) = bounded(1);
        let capture = CaptureThread::start(camera_index, frame_tx)?;
        let mut previous = std::mem::replace(&mut self.capture, capture);
        previous.stop_and_join();
        self.frame_rx = frame_rx;
        self.camera_index = camera_index;
        log::info!("switched to camera {camera_index}");
        Ok(())
    }
}
