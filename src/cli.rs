use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::pipeline::DispatchMode;

/// Landmark smoothing and hand tracking relay.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// JSON settings file. Falls back to `settings.json` when present.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Where frames come from.
    #[arg(long, value_enum, default_value_t = SourceKind::Webcam)]
    pub source: SourceKind,
    /// Raw RGBA buffer written by another process (`--source mmap`).
    #[arg(long)]
    pub mmap_path: Option<PathBuf>,
    #[arg(long, default_value_t = 640)]
    pub mmap_width: u32,
    #[arg(long, default_value_t = 480)]
    pub mmap_height: u32,
    /// Directory of still images processed in name order (`--source images`).
    #[arg(long)]
    pub images_dir: Option<PathBuf>,
    #[arg(long, default_value_t = 0)]
    pub camera_index: u32,
    /// Run the pose detector. Hands and face always run when available.
    #[arg(long, default_value_t = false)]
    pub enable_pose_inference: bool,
    /// Publish annotated preview frames into this memory-mapped file.
    #[arg(long)]
    pub preview_mmap_path: Option<PathBuf>,
    /// Overrides `control.port` from the settings file.
    #[arg(long)]
    pub control_port: Option<u16>,
    #[arg(long, value_enum, default_value_t = DispatchMode::Live)]
    pub dispatch: DispatchMode,
    /// Recorded pose detections, one JSON value per line.
    #[arg(long)]
    pub pose_replay: Option<PathBuf>,
    /// Recorded hand detections, one JSON array per line.
    #[arg(long)]
    pub hand_replay: Option<PathBuf>,
    /// Recorded face detections, one JSON value per line.
    #[arg(long)]
    pub face_replay: Option<PathBuf>,
    /// Write every processed frame to this JSON file on exit.
    #[arg(long)]
    pub dump: Option<PathBuf>,
    /// Start processing without waiting for a remote `start`.
    #[arg(long, default_value_t = false)]
    pub autostart: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Webcam,
    Mmap,
    Images,
}

impl Args {
    /// Image sequences are processed once, frame-exact.
    pub fn is_offline(&self) -> bool {
        self.source == SourceKind::Images
    }
}
