use std::{
    fs::File,
    io::{BufRead, BufReader},
    marker::PhantomData,
    path::Path,
};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use crate::types::{FaceDetection, Frame, HandDetection, PoseDetection};

/// One landmark model. `Ok(None)` means the part was not found in the frame.
pub trait LandmarkDetector<T>: Send {
    fn detect(&mut self, frame: &Frame, timestamp_ms: i64) -> Result<Option<T>>;
}

pub type PoseDetector = Box<dyn LandmarkDetector<PoseDetection>>;
pub type HandDetector = Box<dyn LandmarkDetector<Vec<HandDetection>>>;
pub type FaceDetector = Box<dyn LandmarkDetector<FaceDetection>>;

/// The detectors enabled for a run; any subset may be missing.
#[derive(Default)]
pub struct DetectorSet {
    pub pose: Option<PoseDetector>,
    pub hands: Option<HandDetector>,
    pub face: Option<FaceDetector>,
}

impl DetectorSet {
    pub fn active_count(&self) -> usize {
        [
            self.pose.is_some(),
            self.hands.is_some(),
            self.face.is_some(),
        ]
        .into_iter()
        .filter(|active| *active)
        .count()
    }
}

/// Plays back recorded detector output, one JSON value per line and per frame.
/// A `null` line is a frame where nothing was detected.
pub struct ReplayDetector<T> {
    entries: Vec<Option<T>>,
    position: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> ReplayDetector<T> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open replay {}", path.display()))?;
        let detector = Self::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to load replay {}", path.display()))?;
        log::info!(
            "loaded {} recorded frames from {}",
            detector.len(),
            path.display()
        );
        Ok(detector)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut entries = Vec::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(&line)
                .with_context(|| format!("line {} is not a valid detection", number + 1))?;
            entries.push(entry);
        }
        Ok(Self {
            entries,
            position: 0,
            _marker: PhantomData,
        })
    }
}

impl<T> ReplayDetector<T> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Clone + Send> LandmarkDetector<T> for ReplayDetector<T> {
    fn detect(&mut self, _frame: &Frame, _timestamp_ms: i64) -> Result<Option<T>> {
        let entry = self.entries.get(self.position).cloned().flatten();
        self.position += 1;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Handedness;

    fn blank() -> Frame {
        Frame {
            rgba: vec![0; 4],
            width: 1,
            height: 1,
            timestamp_ms: 1,
        }
    }

    #[test]
    fn replay_serves_lines_in_order() {
        let recording = concat!(
            r#"[{"local":[{"x":0.1,"y":0.2,"z":0.0}],"world":[{"x":0.0,"y":0.0,"z":0.0}],"confidence":0.9,"label":"Left"}]"#,
            "\n",
            "null\n",
            "\n",
            "[]\n",
        );
        let mut detector: ReplayDetector<Vec<HandDetection>> =
            ReplayDetector::from_reader(recording.as_bytes()).unwrap();
        assert_eq!(detector.len(), 3);

        let frame = blank();
        let first = detector.detect(&frame, 1).unwrap().unwrap();
        assert_eq!(first[0].label, Handedness::Left);
        assert_eq!(first[0].local[0].confidence, 0.0);
        assert!(detector.detect(&frame, 2).unwrap().is_none());
        assert_eq!(detector.detect(&frame, 3).unwrap(), Some(Vec::new()));
        assert!(detector.detect(&frame, 4).unwrap().is_none());
    }

    #[test]
    fn replay_reports_bad_line() {
        let result = ReplayDetector::<FaceDetection>::from_reader("{\"nope\":1}\n".as_bytes());
        let err = result.err().unwrap();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn active_count_tracks_enabled_detectors() {
        let mut set = DetectorSet::default();
        assert_eq!(set.active_count(), 0);
        set.face = Some(Box::new(
            ReplayDetector::<FaceDetection>::from_reader("null\n".as_bytes()).unwrap(),
        ));
        assert_eq!(set.active_count(), 1);
    }
}
