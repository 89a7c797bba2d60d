use std::{
    net::SocketAddr,
    path::Path,
    sync::{Arc, atomic::AtomicBool},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use landmark_relay::{
    app::App,
    cli::{Args, SourceKind},
    config::Config,
    control::{ControlServer, ControlServicer, RuntimeState},
    filter::StreamFilters,
    pipeline::{
        CachedSource, DetectionOrchestrator, DetectorSet, FrameSource, ImageSequenceSource,
        MmapFrameSource, ReplayDetector, SharedMemorySink, UdpDispatcher,
    },
    resolver::HandIdentityResolver,
    types::{FaceDetection, HandDetection, PoseDetection},
};

const DEFAULT_SETTINGS: &str = "settings.json";

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None if Path::new(DEFAULT_SETTINGS).exists() => Config::load(DEFAULT_SETTINGS)?,
        None => Config::default(),
    };
    if let Some(port) = args.control_port {
        config.control.port = port;
    }
    Ok(config)
}

fn open_source(args: &Args, config: &Config) -> Result<Box<dyn FrameSource>> {
    let source: Box<dyn FrameSource> = match args.source {
        SourceKind::Webcam => open_webcam(args.camera_index)?,
        SourceKind::Mmap => {
            let path = args
                .mmap_path
                .as_deref()
                .ok_or_else(|| anyhow!("--source mmap needs --mmap-path"))?;
            Box::new(MmapFrameSource::open(path, args.mmap_width, args.mmap_height)?)
        }
        SourceKind::Images => {
            let dir = args
                .images_dir
                .as_deref()
                .ok_or_else(|| anyhow!("--source images needs --images-dir"))?;
            Box::new(ImageSequenceSource::open(dir, config.runtime.frame_interval_ms)?)
        }
    };
    Ok(source)
}

#[cfg(feature = "camera-nokhwa")]
fn open_webcam(index: u32) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(landmark_relay::pipeline::WebcamSource::open(index)?))
}

#[cfg(not(feature = "camera-nokhwa"))]
fn open_webcam(_index: u32) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!("built without camera support, use --source mmap or images"))
}

fn load_detectors(args: &Args) -> Result<DetectorSet> {
    let mut detectors = DetectorSet::default();
    if args.enable_pose_inference {
        if let Some(path) = &args.pose_replay {
            detectors.pose = Some(Box::new(ReplayDetector::<PoseDetection>::open(path)?));
        } else {
            log::warn!("pose inference enabled but no pose detector is available");
        }
    }
    if let Some(path) = &args.hand_replay {
        detectors.hands = Some(Box::new(ReplayDetector::<Vec<HandDetection>>::open(path)?));
    }
    if let Some(path) = &args.face_replay {
        detectors.face = Some(Box::new(ReplayDetector::<FaceDetection>::open(path)?));
    }
    if detectors.active_count() == 0 {
        log::warn!("no detectors configured, frames will carry no landmarks");
    }
    Ok(detectors)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(&args)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, shutdown.clone())
            .context("failed to register signal handler")?;
    }

    let state = Arc::new(RuntimeState::new(
        args.camera_index,
        args.preview_mmap_path.is_some(),
    ));
    let source = CachedSource::new(open_source(&args, &config)?, config.runtime.source_cache_len);
    let orchestrator = DetectionOrchestrator::new(args.dispatch, load_detectors(&args)?)?;
    let resolver = HandIdentityResolver::new(config.resolver.clone());
    let filters = StreamFilters::from_config(&config.filters)?;
    let dispatcher = UdpDispatcher::connect(&config.sender.address())?;

    let mut app = App::new(state.clone(), source, orchestrator, resolver, filters)
        .with_dispatcher(dispatcher);
    if !args.is_offline() {
        app = app.with_frame_interval(Duration::from_millis(config.runtime.frame_interval_ms));
    }
    if let Some(path) = &args.preview_mmap_path {
        app = app.with_sink(SharedMemorySink::create(
            path,
            config.preview.width,
            config.preview.height,
        )?);
    }
    if let Some(path) = &args.dump {
        app = app.with_dump(path.clone());
    }

    let server = if config.control.enabled && !args.is_offline() {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.control.port));
        Some(ControlServer::start(addr, ControlServicer::new(state.clone()))?)
    } else {
        None
    };
    if args.autostart || server.is_none() {
        state.request_start();
    }

    let result = app.run(&shutdown);
    if let Some(server) = server {
        server.shutdown();
    }
    app.shutdown()?;
    log::info!("shut down");
    result
}
