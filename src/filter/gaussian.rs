use std::collections::VecDeque;

use super::{FilterError, LandmarkFilter};
use crate::types::{Landmark, LandmarkStream};

/// Kernel support in standard deviations.
const TRUNCATE: f32 = 4.0;

fn gaussian_kernel(sigma: f32, radius: usize) -> Vec<f32> {
    let r = radius as isize;
    let mut weights: Vec<f32> = (-r..=r)
        .map(|k| (-0.5 * (k * k) as f32 / (sigma * sigma)).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

/// Mirror index into `0..len`, repeating the edge sample (`d c b a | a b c d | d c b a`).
fn reflect_index(i: isize, len: usize) -> usize {
    let n = len as isize;
    let period = 2 * n;
    let mut m = i.rem_euclid(period);
    if m >= n {
        m = period - 1 - m;
    }
    m as usize
}

fn channels(lm: &Landmark) -> [f32; 4] {
    [lm.x, lm.y, lm.z, lm.confidence]
}

/// Gaussian-weighted value of every channel of landmark `index` at sequence position `center`.
fn smooth_at<'a, F>(sample: F, len: usize, center: usize, index: usize, kernel: &[f32]) -> Landmark
where
    F: Fn(usize) -> &'a LandmarkStream,
{
    let radius = (kernel.len() / 2) as isize;
    let mut acc = [0.0f32; 4];
    for (k, w) in kernel.iter().enumerate() {
        let pos = reflect_index(center as isize + k as isize - radius, len);
        let values = channels(&sample(pos)[index]);
        for c in 0..4 {
            acc[c] += w * values[c];
        }
    }
    Landmark::new(acc[0], acc[1], acc[2], acc[3])
}

fn odd_window(window_size: usize) -> usize {
    if window_size % 2 == 1 {
        window_size
    } else {
        window_size.saturating_sub(1).max(1)
    }
}

/// Sliding-window Gaussian smoothing; output is the smoothed value at the window centre.
pub struct GaussianWindowFilter {
    kernel: Vec<f32>,
    window_size: usize,
    window: VecDeque<LandmarkStream>,
}

impl GaussianWindowFilter {
    pub fn new(sigma: f32, window_size: usize) -> Self {
        let radius = (TRUNCATE * sigma + 0.5) as usize;
        Self {
            kernel: gaussian_kernel(sigma, radius),
            window_size: odd_window(window_size),
            window: VecDeque::new(),
        }
    }
}

impl LandmarkFilter for GaussianWindowFilter {
    fn filter(
        &mut self,
        current: &LandmarkStream,
        _timestamp_s: f64,
    ) -> Result<LandmarkStream, FilterError> {
        if let Some(front) = self.window.front() {
            if front.len() != current.len() {
                return Err(FilterError::LengthMismatch {
                    expected: front.len(),
                    actual: current.len(),
                });
            }
        }
        self.window.push_back(current.clone());
        while self.window.len() > self.window_size {
            self.window.pop_front();
        }

        let len = self.window.len();
        let center = len / 2;
        let window = &self.window;
        Ok((0..current.len())
            .map(|i| smooth_at(|pos| &window[pos], len, center, i, &self.kernel))
            .collect())
    }
}

/// Offline smoothing of a whole recorded sequence. All streams must share one length.
pub fn gaussian_smooth_sequence(
    sequence: &[LandmarkStream],
    sigma: f32,
    window_size: usize,
) -> Result<Vec<LandmarkStream>, FilterError> {
    let Some(first) = sequence.first() else {
        return Ok(Vec::new());
    };
    if let Some(bad) = sequence.iter().find(|s| s.len() != first.len()) {
        return Err(FilterError::LengthMismatch {
            expected: first.len(),
            actual: bad.len(),
        });
    }

    let kernel = gaussian_kernel(sigma, odd_window(window_size) / 2);
    let len = sequence.len();
    Ok((0..len)
        .map(|t| {
            (0..first.len())
                .map(|i| smooth_at(|pos| &sequence[pos], len, t, i, &kernel))
                .collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(v: f32) -> LandmarkStream {
        LandmarkStream::new(vec![Landmark::new(v, v, v, 1.0)])
    }

    #[test]
    fn kernel_is_normalised_and_symmetric() {
        let kernel = gaussian_kernel(3.0, 12);
        assert_eq!(kernel.len(), 25);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!((kernel[0] - kernel[24]).abs() < 1e-9);
        assert!(kernel[12] > kernel[11]);
    }

    #[test]
    fn reflect_repeats_edges() {
        assert_eq!(reflect_index(-1, 4), 0);
        assert_eq!(reflect_index(-2, 4), 1);
        assert_eq!(reflect_index(4, 4), 3);
        assert_eq!(reflect_index(5, 4), 2);
        assert_eq!(reflect_index(2, 4), 2);
        assert_eq!(reflect_index(-3, 1), 0);
    }

    #[test]
    fn window_filter_keeps_constant_signal() {
        let mut filter = GaussianWindowFilter::new(3.0, 31);
        for step in 0..40 {
            let out = filter.filter(&scalar(2.0), step as f64).unwrap();
            assert!((out[0].x - 2.0).abs() < 1e-5);
        }
        assert_eq!(filter.window.len(), 31);
    }

    #[test]
    fn even_window_is_forced_odd() {
        let filter = GaussianWindowFilter::new(1.0, 4);
        assert_eq!(filter.window_size, 3);
    }

    #[test]
    fn sequence_smoothing_flattens_spike() {
        let mut seq: Vec<LandmarkStream> = (0..9).map(|_| scalar(0.0)).collect();
        seq[4] = scalar(9.0);
        let smoothed = gaussian_smooth_sequence(&seq, 1.0, 5).unwrap();
        assert_eq!(smoothed.len(), 9);
        assert!(smoothed[4][0].x < 9.0);
        assert!(smoothed[3][0].x > 0.0);
        assert_eq!(smoothed[0][0].x, 0.0);
        let total: f32 = smoothed.iter().map(|s| s[0].x).sum();
        assert!((total - 9.0).abs() < 1e-4);
    }

    #[test]
    fn sequence_rejects_mixed_lengths() {
        let seq = vec![scalar(0.0), LandmarkStream::filled(2, Landmark::default())];
        assert!(gaussian_smooth_sequence(&seq, 1.0, 3).is_err());
    }
}
