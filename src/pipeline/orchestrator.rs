use std::{sync::Arc, thread};

use anyhow::{Context, Result};
use crossbeam_channel::{Sender, TrySendError, bounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::detector::{DetectorSet, LandmarkDetector};
use crate::types::{FaceDetection, Frame, HandDetection, PoseDetection};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Detectors run on their own threads; results arrive whenever they are ready.
    #[default]
    Live,
    /// Every detector finishes the frame before `submit_frame` returns.
    Video,
}

/// Unresolved detector output. In live mode the parts may stem from different frames.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawDetections {
    pub pose: Option<PoseDetection>,
    pub hands: Option<Vec<HandDetection>>,
    pub face: Option<FaceDetection>,
    pub timestamp_ms: i64,
}

fn run_detector<T>(
    name: &str,
    detector: &mut dyn LandmarkDetector<T>,
    frame: &Frame,
    timestamp_ms: i64,
) -> Option<T> {
    match detector.detect(frame, timestamp_ms) {
        Ok(result) => result,
        Err(err) => {
            log::warn!("{name} detector failed at {timestamp_ms} ms: {err:?}");
            None
        }
    }
}

struct Completed<T> {
    timestamp_ms: i64,
    result: Option<T>,
}

/// A detector on its own thread with a single-frame mailbox and a result cell.
struct DetectorActor<T> {
    input: Option<Sender<(Arc<Frame>, i64)>>,
    cell: Arc<Mutex<Option<Completed<T>>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl<T: Send + 'static> DetectorActor<T> {
    fn spawn(name: &'static str, mut detector: Box<dyn LandmarkDetector<T>>) -> Result<Self> {
        let (input, frames) = bounded::<(Arc<Frame>, i64)>(1);
        let cell = Arc::new(Mutex::new(None));
        let worker_cell = cell.clone();

        let handle = thread::Builder::new()
            .name(format!("{name}-detector"))
            .spawn(move || {
                log::debug!("{name} detector started");
                for (frame, timestamp_ms) in frames.iter() {
                    let result = run_detector(name, detector.as_mut(), &frame, timestamp_ms);
                    *worker_cell.lock() = Some(Completed {
                        timestamp_ms,
                        result,
                    });
                }
                log::debug!("{name} detector stopped");
            })
            .with_context(|| format!("failed to spawn {name} detector thread"))?;

        Ok(Self {
            input: Some(input),
            cell,
            handle: Some(handle),
        })
    }

    /// Returns false when the detector is still busy with an earlier frame.
    fn offer(&self, frame: Arc<Frame>, timestamp_ms: i64) -> bool {
        let Some(input) = &self.input else {
            return false;
        };
        match input.try_send((frame, timestamp_ms)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("detector thread is gone");
                false
            }
        }
    }
}

impl<T: Clone> DetectorActor<T> {
    fn latest(&self) -> Option<T> {
        self.cell.lock().as_ref().and_then(|c| c.result.clone())
    }

    fn completed_ms(&self) -> Option<i64> {
        self.cell.lock().as_ref().map(|c| c.timestamp_ms)
    }
}

impl<T> Drop for DetectorActor<T> {
    fn drop(&mut self) {
        // Closing the mailbox ends the worker loop.
        self.input.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

enum Dispatch {
    Video {
        detectors: DetectorSet,
        pool: rayon::ThreadPool,
        latest: RawDetections,
    },
    Live {
        pose: Option<DetectorActor<PoseDetection>>,
        hands: Option<DetectorActor<Vec<HandDetection>>>,
        face: Option<DetectorActor<FaceDetection>>,
    },
}

pub struct DetectionOrchestrator {
    dispatch: Dispatch,
    last_timestamp_ms: Option<i64>,
}

impl DetectionOrchestrator {
    pub fn new(mode: DispatchMode, detectors: DetectorSet) -> Result<Self> {
        let active = detectors.active_count();
        let dispatch = match mode {
            DispatchMode::Video => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(active.max(1))
                    .thread_name(|i| format!("detector-pool-{i}"))
                    .build()
                    .context("failed to build detector pool")?;
                Dispatch::Video {
                    detectors,
                    pool,
                    latest: RawDetections::default(),
                }
            }
            DispatchMode::Live => {
                let DetectorSet { pose, hands, face } = detectors;
                Dispatch::Live {
                    pose: pose.map(|d| DetectorActor::spawn("pose", d)).transpose()?,
                    hands: hands.map(|d| DetectorActor::spawn("hand", d)).transpose()?,
                    face: face.map(|d| DetectorActor::spawn("face", d)).transpose()?,
                }
            }
        };
        log::info!("detection orchestrator in {mode:?} mode with {active} detectors");
        Ok(Self {
            dispatch,
            last_timestamp_ms: None,
        })
    }

    pub fn mode(&self) -> DispatchMode {
        match self.dispatch {
            Dispatch::Video { .. } => DispatchMode::Video,
            Dispatch::Live { .. } => DispatchMode::Live,
        }
    }

    /// Hands the frame to every active detector. Frames not newer than the last
    /// accepted one are skipped and `false` is returned.
    pub fn submit_frame(&mut self, frame: Arc<Frame>, timestamp_ms: i64) -> bool {
        if self.last_timestamp_ms.is_some_and(|last| timestamp_ms <= last) {
            log::debug!("skipping frame at {timestamp_ms} ms, not newer than the last one");
            return false;
        }
        self.last_timestamp_ms = Some(timestamp_ms);

        match &mut self.dispatch {
            Dispatch::Video {
                detectors,
                pool,
                latest,
            } => {
                *latest = detect_all(pool, detectors, &frame, timestamp_ms);
            }
            Dispatch::Live { pose, hands, face } => {
                let busy = [
                    pose.as_ref().map(|a| a.offer(frame.clone(), timestamp_ms)),
                    hands.as_ref().map(|a| a.offer(frame.clone(), timestamp_ms)),
                    face.as_ref().map(|a| a.offer(frame.clone(), timestamp_ms)),
                ]
                .into_iter()
                .flatten()
                .filter(|accepted| !accepted)
                .count();
                if busy > 0 {
                    log::debug!("{busy} detectors busy, frame {timestamp_ms} ms dropped for them");
                }
            }
        }
        true
    }

    pub fn latest_result(&self) -> RawDetections {
        match &self.dispatch {
            Dispatch::Video { latest, .. } => latest.clone(),
            Dispatch::Live { pose, hands, face } => RawDetections {
                pose: pose.as_ref().and_then(DetectorActor::latest),
                hands: hands.as_ref().and_then(DetectorActor::latest),
                face: face.as_ref().and_then(DetectorActor::latest),
                timestamp_ms: self.last_timestamp_ms.unwrap_or_default(),
            },
        }
    }

    /// Oldest timestamp that every active detector has finished.
    pub fn completed_through(&self) -> Option<i64> {
        match &self.dispatch {
            Dispatch::Video { .. } => self.last_timestamp_ms,
            Dispatch::Live { pose, hands, face } => {
                let stamps = [
                    pose.as_ref().map(DetectorActor::completed_ms),
                    hands.as_ref().map(DetectorActor::completed_ms),
                    face.as_ref().map(DetectorActor::completed_ms),
                ];
                stamps
                    .into_iter()
                    .flatten()
                    .try_fold(i64::MAX, |acc, stamp| stamp.map(|s| acc.min(s)))
                    .filter(|stamp| *stamp != i64::MAX)
            }
        }
    }
}

fn detect_all(
    pool: &rayon::ThreadPool,
    detectors: &mut DetectorSet,
    frame: &Frame,
    timestamp_ms: i64,
) -> RawDetections {
    let mut out = RawDetections {
        timestamp_ms,
        ..RawDetections::default()
    };
    let DetectorSet { pose, hands, face } = detectors;
    let RawDetections {
        pose: pose_slot,
        hands: hands_slot,
        face: face_slot,
        ..
    } = &mut out;

    pool.scope(|scope| {
        if let Some(detector) = pose.as_mut() {
            scope.spawn(move |_| {
                *pose_slot = run_detector("pose", detector.as_mut(), frame, timestamp_ms)
            });
        }
        if let Some(detector) = hands.as_mut() {
            scope.spawn(move |_| {
                *hands_slot = run_detector("hand", detector.as_mut(), frame, timestamp_ms)
            });
        }
        if let Some(detector) = face.as_mut() {
            scope.spawn(move |_| {
                *face_slot = run_detector("face", detector.as_mut(), frame, timestamp_ms)
            });
        }
    });
    out
}
