use std::{
    collections::VecDeque,
    fs,
    sync::{Arc, atomic::AtomicBool},
    thread,
    time::{Duration, Instant},
};

use anyhow::Result;
use landmark_relay::{
    app::{App, TickOutcome},
    config::FiltersConfig,
    control::{ControlServicer, RuntimeState},
    filter::StreamFilters,
    pipeline::{
        CachedSource, DetectionOrchestrator, DetectorSet, DispatchMode, FrameRecordHeader,
        FrameSource, LandmarkDetector, SharedMemorySink,
    },
    resolver::{HandIdentityResolver, ResolverConfig},
    types::{
        FaceDetection, Frame, HAND_LANDMARKS, HandDetection, Handedness, HolisticFrame, Landmark,
        LandmarkStream,
    },
};
use parking_lot::Mutex;

struct Scripted {
    frames: VecDeque<Frame>,
    reopened: Arc<Mutex<Vec<u32>>>,
}

impl Scripted {
    fn new(timestamps: &[i64]) -> (Self, Arc<Mutex<Vec<u32>>>) {
        let reopened = Arc::new(Mutex::new(Vec::new()));
        let frames = timestamps
            .iter()
            .map(|&timestamp_ms| Frame {
                rgba: vec![0; 8 * 8 * 4],
                width: 8,
                height: 8,
                timestamp_ms,
            })
            .collect();
        (
            Self {
                frames,
                reopened: reopened.clone(),
            },
            reopened,
        )
    }
}

impl FrameSource for Scripted {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }

    fn reopen(&mut self, camera_index: u32) -> Result<()> {
        self.reopened.lock().push(camera_index);
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.frames.is_empty()
    }
}

/// One left hand drifting right by 1 cm per 100 ms.
struct DriftingHand;

impl LandmarkDetector<Vec<HandDetection>> for DriftingHand {
    fn detect(&mut self, _frame: &Frame, timestamp_ms: i64) -> Result<Option<Vec<HandDetection>>> {
        let x = timestamp_ms as f32 / 10_000.0;
        Ok(Some(vec![HandDetection {
            local: LandmarkStream::filled(HAND_LANDMARKS, Landmark::new(0.5, 0.5, 0.0, 0.0)),
            world: LandmarkStream::filled(HAND_LANDMARKS, Landmark::new(x, 0.0, 0.0, 0.0)),
            confidence: 0.9,
            label: Handedness::Left,
            raw_index: 0,
        }]))
    }
}

struct NoFace;

impl LandmarkDetector<FaceDetection> for NoFace {
    fn detect(&mut self, _frame: &Frame, _timestamp_ms: i64) -> Result<Option<FaceDetection>> {
        Ok(None)
    }
}

fn build_app(timestamps: &[i64], state: Arc<RuntimeState>) -> (App, Arc<Mutex<Vec<u32>>>) {
    let (source, reopened) = Scripted::new(timestamps);
    let detectors = DetectorSet {
        pose: None,
        hands: Some(Box::new(DriftingHand)),
        face: Some(Box::new(NoFace)),
    };
    let app = App::new(
        state,
        CachedSource::new(Box::new(source), 2),
        DetectionOrchestrator::new(DispatchMode::Video, detectors).unwrap(),
        HandIdentityResolver::new(ResolverConfig::default()),
        StreamFilters::from_config(&FiltersConfig::default()).unwrap(),
    );
    (app, reopened)
}

fn processed(outcome: TickOutcome) -> HolisticFrame {
    match outcome {
        TickOutcome::Processed(frame) => frame,
        other => panic!("expected a processed frame, got {other:?}"),
    }
}

#[test]
fn idle_until_remote_start() {
    let state = Arc::new(RuntimeState::default());
    let (mut app, _) = build_app(&[100, 200], state.clone());
    assert_eq!(app.tick().unwrap(), TickOutcome::Idle);

    let servicer = ControlServicer::new(state.clone());
    assert!(servicer.start().success);
    assert!(!state.is_running());

    let frame = processed(app.tick().unwrap());
    assert!(state.is_running());
    assert!(!state.pending().start);
    assert_eq!(frame.time_s, 0.1);
    assert!(!servicer.start().success);
}

#[test]
fn frames_are_resolved_and_smoothed() {
    let state = Arc::new(RuntimeState::default());
    state.request_start();
    let (mut app, _) = build_app(&[100, 200, 300], state);

    let first = processed(app.tick().unwrap());
    let left = first.hands.left.world.clone().unwrap();
    assert!(first.hands.right.world.is_none());
    assert!(first.face.landmarks.is_none());
    assert!((left[0].x - 0.01).abs() < 1e-6);
    assert!(left.iter().all(|lm| lm.confidence == 0.9));

    let second = processed(app.tick().unwrap());
    let x = second.hands.left.world.unwrap()[0].x;
    assert!(x > 0.01 && x < 0.02, "smoothed value {x}");

    processed(app.tick().unwrap());
    assert_eq!(app.tick().unwrap(), TickOutcome::Finished);
}

#[test]
fn repeated_timestamp_is_skipped() {
    let state = Arc::new(RuntimeState::default());
    state.request_start();
    let (mut app, _) = build_app(&[100, 100, 90, 150], state);

    processed(app.tick().unwrap());
    assert_eq!(app.tick().unwrap(), TickOutcome::Skipped);
    assert_eq!(app.tick().unwrap(), TickOutcome::Skipped);
    assert_eq!(processed(app.tick().unwrap()).time_s, 0.15);
}

#[test]
fn camera_switch_is_acknowledged_by_main_loop() {
    let state = Arc::new(RuntimeState::default());
    let (mut app, reopened) = build_app(&[100], state.clone());

    ControlServicer::new(state.clone()).select_camera(3);
    assert_eq!(state.pending().camera_change, Some(3));
    app.tick().unwrap();
    assert_eq!(state.pending().camera_change, None);
    assert_eq!(*reopened.lock(), vec![3]);
    assert_eq!(state.get_status().selected_camera_index, 3);
}

/// Only camera 0 exists.
struct SingleCamera(Scripted);

impl FrameSource for SingleCamera {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.0.next_frame()
    }

    fn reopen(&mut self, camera_index: u32) -> Result<()> {
        anyhow::ensure!(camera_index == 0, "camera {camera_index} not found");
        self.0.reopen(camera_index)
    }

    fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

#[test]
fn missing_camera_keeps_previous_stream() {
    let state = Arc::new(RuntimeState::default());
    state.request_start();
    let (scripted, reopened) = Scripted::new(&[100, 200]);
    let detectors = DetectorSet {
        pose: None,
        hands: Some(Box::new(DriftingHand)),
        face: None,
    };
    let mut app = App::new(
        state.clone(),
        CachedSource::new(Box::new(SingleCamera(scripted)), 2),
        DetectionOrchestrator::new(DispatchMode::Video, detectors).unwrap(),
        HandIdentityResolver::new(ResolverConfig::default()),
        StreamFilters::from_config(&FiltersConfig::default()).unwrap(),
    );
    processed(app.tick().unwrap());

    assert!(ControlServicer::new(state.clone()).select_camera(99).success);
    let frame = processed(app.tick().unwrap());
    assert_eq!(frame.time_s, 0.2);
    assert!(reopened.lock().is_empty());

    let status = state.get_status();
    assert_eq!(status.selected_camera_index, 0);
    assert!(status.is_running);
    assert_eq!(state.pending().camera_change, None);
}

#[test]
fn stop_request_halts_processing() {
    let state = Arc::new(RuntimeState::default());
    state.request_start();
    let (mut app, _) = build_app(&[100, 200], state.clone());
    processed(app.tick().unwrap());

    assert!(state.request_stop());
    assert_eq!(app.tick().unwrap(), TickOutcome::Idle);
    assert!(!state.is_running());
    assert!(!state.request_stop());
}

#[test]
fn offline_dump_written_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dump.json");
    let state = Arc::new(RuntimeState::default());
    state.request_start();
    let (app, _) = build_app(&[100, 200, 300, 400], state);
    let mut app = app.with_dump(path.clone());

    app.run(&AtomicBool::new(false)).unwrap();
    app.shutdown().unwrap();

    let frames: Vec<HolisticFrame> =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(frames.len(), 4);
    assert!(frames.iter().all(|f| f.hands.left.world.is_some()));
    assert!(frames.iter().all(|f| f.hands.right.world.is_none()));
}

#[test]
fn preview_reaches_frame_sink() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("preview.bin");
    let state = Arc::new(RuntimeState::new(0, true));
    state.request_start();
    let (app, _) = build_app(&[100], state);
    let mut app = app.with_sink(SharedMemorySink::create(&path, 4, 4).unwrap());

    processed(app.tick().unwrap());
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let bytes = fs::read(&path).unwrap();
        if let Ok(header) = FrameRecordHeader::parse(&bytes) {
            if header.sequence == 1 {
                assert_eq!(header.timestamp_ms, 100);
                assert_eq!((header.width, header.height), (4, 4));
                break;
            }
        }
        assert!(Instant::now() < deadline, "preview never written");
        thread::sleep(Duration::from_millis(5));
    }
    app.shutdown().unwrap();
}
