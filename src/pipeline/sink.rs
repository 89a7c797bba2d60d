use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use bytes::{Buf, BufMut};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use fast_image_resize as fir;
use memmap2::MmapMut;
use parking_lot::Mutex;
use thiserror::Error;

use super::rgba_converter::rgba_to_rgb_into;
use crate::types::Frame;

pub const HEADER_LEN: usize = 28;
pub const PIXEL_FORMAT_RGB24: u32 = 0;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("invalid sink shape {width}x{height}")]
    InvalidShape { width: u32, height: u32 },
    #[error("frame record truncated: got {actual} bytes, need {expected}")]
    Truncated { expected: usize, actual: usize },
    #[error("unsupported pixel format {0}")]
    UnknownPixelFormat(u32),
}

/// Little-endian record header placed in front of the pixel payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRecordHeader {
    pub sequence: u32,
    pub timestamp_ms: i64,
    pub width: u32,
    pub height: u32,
    pub pixel_format: u32,
    pub payload_size: u32,
}

impl FrameRecordHeader {
    pub fn encode(&self, mut dst: impl BufMut) {
        dst.put_u32_le(self.sequence);
        dst.put_i64_le(self.timestamp_ms);
        dst.put_u32_le(self.width);
        dst.put_u32_le(self.height);
        dst.put_u32_le(self.pixel_format);
        dst.put_u32_le(self.payload_size);
    }

    pub fn parse(mut src: &[u8]) -> Result<Self, SinkError> {
        if src.len() < HEADER_LEN {
            return Err(SinkError::Truncated {
                expected: HEADER_LEN,
                actual: src.len(),
            });
        }
        let header = Self {
            sequence: src.get_u32_le(),
            timestamp_ms: src.get_i64_le(),
            width: src.get_u32_le(),
            height: src.get_u32_le(),
            pixel_format: src.get_u32_le(),
            payload_size: src.get_u32_le(),
        };
        if header.pixel_format != PIXEL_FORMAT_RGB24 {
            return Err(SinkError::UnknownPixelFormat(header.pixel_format));
        }
        Ok(header)
    }
}

/// Size of one record for the given target shape.
pub fn record_len(width: u32, height: u32) -> usize {
    HEADER_LEN + width as usize * height as usize * 3
}

enum SinkMessage {
    Frame(Frame),
    Close,
}

struct SinkWorker {
    mmap: Arc<Mutex<Option<MmapMut>>>,
    width: u32,
    height: u32,
    resizer: fir::Resizer,
    rgb: Vec<u8>,
    sequence: u32,
}

impl SinkWorker {
    fn run(mut self, messages: Receiver<SinkMessage>, done: Sender<()>) {
        log::debug!("frame sink worker started");
        loop {
            match messages.recv_timeout(POLL_INTERVAL) {
                Ok(SinkMessage::Frame(frame)) => {
                    if let Err(err) = self.write_record(frame) {
                        log::warn!("frame sink write failed: {err:?}");
                    }
                }
                Ok(SinkMessage::Close) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
        log::debug!("frame sink worker stopped");
        let _ = done.send(());
    }

    fn fit_to_target(&mut self, frame: Frame) -> Result<Vec<u8>> {
        if frame.width == self.width && frame.height == self.height {
            return Ok(frame.rgba);
        }
        let src = fir::images::Image::from_vec_u8(
            frame.width,
            frame.height,
            frame.rgba,
            fir::PixelType::U8x4,
        )?;
        let mut dst = fir::images::Image::new(self.width, self.height, fir::PixelType::U8x4);
        let options = fir::ResizeOptions::new()
            .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
        self.resizer
            .resize(&src, &mut dst, Some(&options))
            .context("preview resize failed")?;
        Ok(dst.into_vec())
    }

    fn write_record(&mut self, frame: Frame) -> Result<()> {
        let timestamp_ms = frame.timestamp_ms;
        let rgba = self.fit_to_target(frame)?;
        rgba_to_rgb_into(&rgba, &mut self.rgb);

        let mut guard = self.mmap.lock();
        let Some(map) = guard.as_mut() else {
            return Ok(());
        };
        self.sequence = self.sequence.wrapping_add(1);
        let header = FrameRecordHeader {
            sequence: self.sequence,
            timestamp_ms,
            width: self.width,
            height: self.height,
            pixel_format: PIXEL_FORMAT_RGB24,
            payload_size: self.rgb.len() as u32,
        };
        // Payload first so a reader never sees a new sequence over stale pixels.
        map[HEADER_LEN..HEADER_LEN + self.rgb.len()].copy_from_slice(&self.rgb);
        header.encode(&mut map[..HEADER_LEN]);
        map.flush().context("failed to flush frame record")?;
        Ok(())
    }
}

/// Publishes preview frames into a memory-mapped file as fixed-size RGB24 records.
pub struct SharedMemorySink {
    path: PathBuf,
    mailbox: Sender<SinkMessage>,
    done: Receiver<()>,
    mmap: Arc<Mutex<Option<MmapMut>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SharedMemorySink {
    pub fn create(path: &Path, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SinkError::InvalidShape { width, height }.into());
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to open frame sink {}", path.display()))?;
        file.set_len(record_len(width, height) as u64)
            .with_context(|| format!("failed to size frame sink {}", path.display()))?;
        // SAFETY: the file was just sized to one record and is only written by the worker.
        let map = unsafe { MmapMut::map_mut(&file) }
            .with_context(|| format!("failed to map frame sink {}", path.display()))?;
        let mmap = Arc::new(Mutex::new(Some(map)));

        let (mailbox, messages) = bounded(1);
        let (done_tx, done) = bounded(1);
        let worker = SinkWorker {
            mmap: mmap.clone(),
            width,
            height,
            resizer: fir::Resizer::new(),
            rgb: vec![0u8; width as usize * height as usize * 3],
            sequence: 0,
        };
        let handle = thread::Builder::new()
            .name("frame-sink".to_string())
            .spawn(move || worker.run(messages, done_tx))
            .context("failed to spawn frame sink worker")?;

        log::info!("frame sink {}x{} at {}", width, height, path.display());
        Ok(Self {
            path: path.to_path_buf(),
            mailbox,
            done,
            mmap,
            handle: Some(handle),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never blocks. Returns false when the worker still holds an earlier frame
    /// and this one was dropped.
    pub fn write(&self, frame: Frame) -> bool {
        match self.mailbox.try_send(SinkMessage::Frame(frame)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("frame sink closed, dropping frame");
                false
            }
        }
    }

    /// Stops the worker within a bounded time and releases the mapping either way.
    pub fn close(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if self
            .mailbox
            .send_timeout(SinkMessage::Close, CLOSE_TIMEOUT)
            .is_err()
        {
            log::warn!("frame sink worker did not take the close request");
        }
        match self.done.recv_timeout(CLOSE_TIMEOUT) {
            Ok(()) => {
                let _ = handle.join();
            }
            Err(_) => log::warn!("frame sink worker did not stop in time, detaching it"),
        }

        match self.mmap.try_lock_for(CLOSE_TIMEOUT) {
            Some(mut guard) => {
                if let Some(map) = guard.take() {
                    if let Err(err) = map.flush() {
                        log::warn!("failed to flush frame sink on close: {err}");
                    }
                }
            }
            None => log::warn!("frame sink mapping still busy, leaving it to the worker"),
        }
        log::info!("frame sink {} closed", self.path.display());
    }
}

impl Drop for SharedMemorySink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, time::Instant};

    use super::*;

    fn solid(width: u32, height: u32, value: u8, timestamp_ms: i64) -> Frame {
        Frame {
            rgba: vec![value; width as usize * height as usize * 4],
            width,
            height,
            timestamp_ms,
        }
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn header_layout_is_little_endian() {
        let header = FrameRecordHeader {
            sequence: 3,
            timestamp_ms: -2,
            width: 4,
            height: 5,
            pixel_format: PIXEL_FORMAT_RGB24,
            payload_size: 60,
        };
        let mut buf = Vec::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), HEADER_LEN);
        assert_eq!(&buf[..4], &[3, 0, 0, 0]);
        assert_eq!(&buf[4..12], &[0xfe, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(FrameRecordHeader::parse(&buf).unwrap(), header);
        assert!(matches!(
            FrameRecordHeader::parse(&buf[..10]),
            Err(SinkError::Truncated { .. })
        ));
    }

    #[test]
    fn writes_resized_rgb_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.bin");
        let mut sink = SharedMemorySink::create(&path, 4, 2).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), record_len(4, 2) as u64);

        assert!(sink.write(solid(8, 4, 200, 77)));
        wait_until(|| {
            let bytes = fs::read(&path).unwrap();
            FrameRecordHeader::parse(&bytes).map(|h| h.sequence) == Ok(1)
        });
        sink.close();

        let bytes = fs::read(&path).unwrap();
        let header = FrameRecordHeader::parse(&bytes).unwrap();
        assert_eq!(header.timestamp_ms, 77);
        assert_eq!((header.width, header.height), (4, 2));
        assert_eq!(header.payload_size, 4 * 2 * 3);
        assert!(bytes[HEADER_LEN..].iter().all(|b| *b == 200));
    }

    #[test]
    fn busy_worker_drops_newest_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.bin");
        let mut sink = SharedMemorySink::create(&path, 2, 2).unwrap();

        let held = sink.mmap.lock();
        assert!(sink.write(solid(2, 2, 1, 1)));
        wait_until(|| sink.mailbox.is_empty());
        // Worker is stuck on the mapping with frame 1; the slot takes one more.
        assert!(sink.write(solid(2, 2, 2, 2)));
        assert!(!sink.write(solid(2, 2, 3, 3)));
        drop(held);

        wait_until(|| {
            let bytes = fs::read(&path).unwrap();
            FrameRecordHeader::parse(&bytes).map(|h| h.sequence) == Ok(2)
        });
        sink.close();

        let bytes = fs::read(&path).unwrap();
        let header = FrameRecordHeader::parse(&bytes).unwrap();
        assert_eq!(header.timestamp_ms, 2);
        assert!(bytes[HEADER_LEN..].iter().all(|b| *b == 2));
    }

    #[test]
    fn close_is_idempotent_and_stops_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SharedMemorySink::create(&dir.path().join("preview.bin"), 2, 2).unwrap();
        sink.close();
        sink.close();
        assert!(!sink.write(solid(2, 2, 9, 1)));
    }

    #[test]
    fn close_returns_while_mapping_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SharedMemorySink::create(&dir.path().join("preview.bin"), 2, 2).unwrap();
        let mmap = sink.mmap.clone();
        let held = mmap.lock();

        let started = Instant::now();
        sink.close();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!sink.write(solid(2, 2, 9, 1)));
        drop(held);
    }

    #[test]
    fn zero_shape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SharedMemorySink::create(&dir.path().join("x.bin"), 0, 2).is_err());
    }
}
