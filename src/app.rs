use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::Result;

use crate::{
    control::RuntimeState,
    filter::StreamFilters,
    offline::{self, DUMP_SIGMA, DUMP_WINDOW_SIZE},
    pipeline::{
        CachedSource, DetectionOrchestrator, RawDetections, SharedMemorySink, UdpDispatcher,
        overlay,
    },
    resolver::{HandIdentityResolver, ResolvedHands},
    types::{FaceLandmarks, HandsLandmarks, HolisticFrame, LandmarkPair},
};

#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// Not running, or no new frame was available.
    Idle,
    /// The frame was not newer than the previous one.
    Skipped,
    Processed(HolisticFrame),
    /// The source has no more frames.
    Finished,
}

/// Combines detector output with the resolved hand identities.
pub fn assemble_frame(raw: RawDetections, hands: ResolvedHands) -> HolisticFrame {
    HolisticFrame {
        pose: raw.pose.map(LandmarkPair::from).unwrap_or_default(),
        hands: HandsLandmarks {
            left: hands.left.map(LandmarkPair::from).unwrap_or_default(),
            right: hands.right.map(LandmarkPair::from).unwrap_or_default(),
        },
        face: raw.face.map(FaceLandmarks::from).unwrap_or_default(),
        time_s: raw.timestamp_ms as f64 / 1000.0,
    }
}

pub struct App {
    state: Arc<RuntimeState>,
    source: CachedSource,
    orchestrator: DetectionOrchestrator,
    resolver: HandIdentityResolver,
    filters: StreamFilters,
    dispatcher: Option<UdpDispatcher>,
    sink: Option<SharedMemorySink>,
    dump: Option<(PathBuf, Vec<HolisticFrame>)>,
    frame_interval: Duration,
    /// Device the source is currently reading from.
    active_camera: u32,
}

impl App {
    pub fn new(
        state: Arc<RuntimeState>,
        source: CachedSource,
        orchestrator: DetectionOrchestrator,
        resolver: HandIdentityResolver,
        filters: StreamFilters,
    ) -> Self {
        let active_camera = state.camera_index();
        Self {
            state,
            source,
            orchestrator,
            resolver,
            filters,
            dispatcher: None,
            sink: None,
            dump: None,
            frame_interval: Duration::ZERO,
            active_camera,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: UdpDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_sink(mut self, sink: SharedMemorySink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Keeps every processed frame and writes them to `path` on shutdown.
    pub fn with_dump(mut self, path: PathBuf) -> Self {
        self.dump = Some((path, Vec::new()));
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    fn handle_requests(&mut self) {
        let pending = self.state.pending();
        if let Some(index) = pending.camera_change {
            match self.source.reopen(index) {
                Ok(()) => {
                    self.active_camera = index;
                    self.state.acknowledge_camera_change();
                }
                Err(err) => {
                    log::error!(
                        "failed to switch to camera {index}, staying on {}: {err:?}",
                        self.active_camera
                    );
                    self.state.reject_camera_change(index, self.active_camera);
                }
            }
        }
        if pending.start {
            self.state.set_running(true);
            log::info!("processing started");
        }
        if pending.stop {
            self.state.set_running(false);
            self.resolver.reset();
            log::info!("processing stopped");
        }
    }

    pub fn tick(&mut self) -> Result<TickOutcome> {
        self.handle_requests();
        if !self.state.is_running() {
            return Ok(TickOutcome::Idle);
        }

        let Some(frame) = self.source.next_frame()? else {
            return Ok(if self.source.is_finished() {
                TickOutcome::Finished
            } else {
                TickOutcome::Idle
            });
        };
        if !self
            .orchestrator
            .submit_frame(frame.clone(), frame.timestamp_ms)
        {
            return Ok(TickOutcome::Skipped);
        }

        let raw = self.orchestrator.latest_result();
        let time_s = frame.timestamp_ms as f64 / 1000.0;
        let hands = self
            .resolver
            .resolve(raw.hands.as_deref().unwrap_or_default(), time_s);
        let mut holistic = assemble_frame(raw, hands);
        self.filters.apply(&mut holistic);

        if let Some(dispatcher) = &mut self.dispatcher {
            dispatcher.send(&holistic);
        }
        if let Some((_, frames)) = &mut self.dump {
            frames.push(holistic.clone());
        }
        if let Some(sink) = &self.sink {
            if self.state.preview_enabled() {
                let mut preview = (*frame).clone();
                overlay::draw_landmarks(&mut preview, &holistic, self.state.visualization());
                if !sink.write(preview) {
                    log::trace!("preview frame dropped, sink busy");
                }
            }
        }
        Ok(TickOutcome::Processed(holistic))
    }

    /// Ticks until `shutdown` is raised or the source runs dry.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        while !shutdown.load(Ordering::Relaxed) {
            let started = Instant::now();
            if self.tick()? == TickOutcome::Finished {
                log::info!("frame source exhausted");
                break;
            }
            if let Some(rest) = self.frame_interval.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }
        Ok(())
    }

    pub fn shutdown(mut self) -> Result<()> {
        if let Some(mut sink) = self.sink.take() {
            sink.close();
        }
        if let Some((path, mut frames)) = self.dump.take() {
            offline::smooth_recording(&mut frames, DUMP_SIGMA, DUMP_WINDOW_SIZE)?;
            offline::write_dump(&path, &frames)?;
        }
        self.state.set_running(false);
        Ok(())
    }
}
