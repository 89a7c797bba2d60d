use std::{
    collections::VecDeque,
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result, anyhow};
use memmap2::Mmap;

use crate::types::Frame;

/// Produces RGBA frames for the main loop. `Ok(None)` means no new frame is
/// available right now, or the source is exhausted (see `is_finished`).
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Switches to another capture device. Sources without devices ignore it.
    fn reopen(&mut self, _camera_index: u32) -> Result<()> {
        Ok(())
    }

    fn is_finished(&self) -> bool {
        false
    }
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Keeps the last few frames produced by the wrapped source.
pub struct CachedSource {
    inner: Box<dyn FrameSource>,
    cache: VecDeque<Arc<Frame>>,
    capacity: usize,
}

impl CachedSource {
    pub fn new(inner: Box<dyn FrameSource>, capacity: usize) -> Self {
        Self {
            inner,
            cache: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn next_frame(&mut self) -> Result<Option<Arc<Frame>>> {
        let Some(frame) = self.inner.next_frame()? else {
            return Ok(None);
        };
        let frame = Arc::new(frame);
        if self.cache.len() == self.capacity {
            self.cache.pop_front();
        }
        self.cache.push_back(frame.clone());
        Ok(Some(frame))
    }

    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.cache.back().cloned()
    }

    /// Frame `age` steps back from the latest one; `lookback(0)` equals `latest()`.
    pub fn lookback(&self, age: usize) -> Option<Arc<Frame>> {
        let len = self.cache.len();
        (age < len).then(|| self.cache[len - 1 - age].clone())
    }

    /// On failure the previous device and cached frames are kept.
    pub fn reopen(&mut self, camera_index: u32) -> Result<()> {
        self.inner.reopen(camera_index)?;
        self.cache.clear();
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

/// Reads a raw RGBA image that another process keeps updating in a mapped file.
pub struct MmapFrameSource {
    mmap: Mmap,
    width: u32,
    height: u32,
    last_timestamp_ms: i64,
}

impl MmapFrameSource {
    pub fn open(path: &Path, width: u32, height: u32) -> Result<Self> {
        let expected = Frame::expected_len(width, height);
        if expected == 0 {
            return Err(anyhow!("mmap source needs a non-zero size, got {width}x{height}"));
        }
        let file = File::open(path)
            .with_context(|| format!("failed to open mmap source {}", path.display()))?;
        // SAFETY: the mapping is read-only; torn frames from a concurrent writer
        // are tolerated by the detectors.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("failed to map {}", path.display()))?;
        if mmap.len() < expected {
            return Err(anyhow!(
                "mmap source {} too small: got {} bytes, expected {expected}",
                path.display(),
                mmap.len()
            ));
        }
        log::info!("reading {width}x{height} frames from {}", path.display());
        Ok(Self {
            mmap,
            width,
            height,
            last_timestamp_ms: 0,
        })
    }
}

impl FrameSource for MmapFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let len = Frame::expected_len(self.width, self.height);
        // Keep timestamps strictly increasing even when polled twice in one millisecond.
        let timestamp_ms = now_ms().max(self.last_timestamp_ms + 1);
        self.last_timestamp_ms = timestamp_ms;
        Ok(Some(Frame {
            rgba: self.mmap[..len].to_vec(),
            width: self.width,
            height: self.height,
            timestamp_ms,
        }))
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Sorted image files of a directory, one frame each, stamped at a fixed interval.
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    position: usize,
    frame_interval_ms: i64,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, frame_interval_ms: u64) -> Result<Self> {
        let mut files = fs::read_dir(dir)
            .with_context(|| format!("failed to list images in {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect::<Vec<_>>();
        files.sort();
        if files.is_empty() {
            return Err(anyhow!("no images found in {}", dir.display()));
        }
        log::info!("image sequence with {} frames from {}", files.len(), dir.display());
        Ok(Self {
            files,
            position: 0,
            frame_interval_ms: frame_interval_ms.max(1) as i64,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.position) else {
            return Ok(None);
        };
        let image = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?
            .to_rgba8();
        // Start at one interval so the first frame passes a zero-initialised gate.
        let timestamp_ms = (self.position as i64 + 1) * self.frame_interval_ms;
        self.position += 1;
        Ok(Some(Frame {
            width: image.width(),
            height: image.height(),
            rgba: image.into_raw(),
            timestamp_ms,
        }))
    }

    fn is_finished(&self) -> bool {
        self.position >= self.files.len()
    }
}
