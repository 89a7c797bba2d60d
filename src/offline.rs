use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};

use crate::{
    filter::{FilterError, StreamId, gaussian_smooth_sequence},
    types::HolisticFrame,
};

pub const DUMP_SIGMA: f32 = 3.0;
pub const DUMP_WINDOW_SIZE: usize = 31;

/// Smooths every stream over each run of consecutive frames in which it is
/// present with an unchanged length. Gaps split runs.
pub fn smooth_recording(
    frames: &mut [HolisticFrame],
    sigma: f32,
    window_size: usize,
) -> Result<(), FilterError> {
    for id in StreamId::ALL {
        let mut start = 0;
        while start < frames.len() {
            let Some(len) = id.slot(&mut frames[start]).as_ref().map(|s| s.len()) else {
                start += 1;
                continue;
            };
            let mut end = start + 1;
            while end < frames.len()
                && id.slot(&mut frames[end]).as_ref().is_some_and(|s| s.len() == len)
            {
                end += 1;
            }

            let run: Vec<_> = frames[start..end]
                .iter_mut()
                .filter_map(|frame| id.slot(frame).clone())
                .collect();
            let smoothed = gaussian_smooth_sequence(&run, sigma, window_size)?;
            for (frame, stream) in frames[start..end].iter_mut().zip(smoothed) {
                *id.slot(frame) = Some(stream);
            }
            start = end;
        }
    }
    Ok(())
}

pub fn write_dump(path: &Path, frames: &[HolisticFrame]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create dump {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, frames)
        .with_context(|| format!("failed to write dump {}", path.display()))?;
    writer.flush()?;
    log::info!("wrote {} frames to {}", frames.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Landmark, LandmarkStream};

    fn frame_with_face(value: Option<f32>) -> HolisticFrame {
        let mut frame = HolisticFrame::default();
        frame.face.landmarks =
            value.map(|v| LandmarkStream::filled(2, Landmark::new(v, 0.0, 0.0, 1.0)));
        frame
    }

    #[test]
    fn runs_are_split_at_gaps() {
        let mut frames: Vec<_> = [Some(0.0), Some(0.0), Some(6.0), None, Some(1.0), Some(1.0)]
            .into_iter()
            .map(frame_with_face)
            .collect();
        smooth_recording(&mut frames, 1.0, 3).unwrap();

        let x = |i: usize| frames[i].face.landmarks.as_ref().map(|s| s[0].x);
        assert!(x(1).unwrap() > 0.0);
        assert!(x(2).unwrap() < 6.0);
        assert_eq!(x(3), None);
        // The second run never sees the spike.
        assert!((x(4).unwrap() - 1.0).abs() < 1e-6);
        assert!((x(5).unwrap() - 1.0).abs() < 1e-6);
        assert!(frames.iter().all(|f| f.pose.world.is_none()));
    }

    #[test]
    fn dump_is_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_dump(&path, &[frame_with_face(Some(0.5))]).unwrap();

        let loaded: Vec<HolisticFrame> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].face.landmarks.as_ref().unwrap()[0].x, 0.5);
    }
}
