use std::f64::consts::PI;

use super::{FilterError, LandmarkFilter};
use crate::types::{Landmark, LandmarkStream};

/// Timestamps closer than this are treated as duplicates.
const MIN_TIME_STEP: f64 = 1e-5;

/// alpha = 1 / (1 + tau * rate), tau = 1 / (2 * pi * cutoff)
fn smoothing_factor(update_rate: f64, cutoff: f64) -> f32 {
    let time_constant = 1.0 / (2.0 * PI * cutoff);
    (1.0 / (1.0 + time_constant * update_rate)) as f32
}

struct OneEuroState {
    position: Vec<Landmark>,
    derivative: Vec<Landmark>,
    last_time_s: f64,
    primed: bool,
}

/// Velocity-adaptive low-pass filter over a whole landmark stream.
pub struct OneEuroFilter {
    min_cutoff: f32,
    slope: f32,
    d_cutoff: f32,
    state: Option<OneEuroState>,
}

impl OneEuroFilter {
    pub fn new(min_cutoff: f32, slope: f32, d_cutoff: f32) -> Self {
        Self {
            min_cutoff,
            slope,
            d_cutoff,
            state: None,
        }
    }

    /// Drops cached state; the next call seeds again.
    pub fn reset(&mut self) {
        self.state = None;
    }
}

impl LandmarkFilter for OneEuroFilter {
    fn filter(
        &mut self,
        current: &LandmarkStream,
        timestamp_s: f64,
    ) -> Result<LandmarkStream, FilterError> {
        let Some(state) = self.state.as_mut() else {
            self.state = Some(OneEuroState {
                position: current.as_slice().to_vec(),
                derivative: vec![Landmark::default(); current.len()],
                last_time_s: timestamp_s,
                primed: false,
            });
            return Ok(current.clone());
        };

        if state.position.len() != current.len() {
            return Err(FilterError::LengthMismatch {
                expected: state.position.len(),
                actual: current.len(),
            });
        }

        let dt = timestamp_s - state.last_time_s;
        if dt < MIN_TIME_STEP {
            return Ok(current.clone());
        }
        let update_rate = 1.0 / dt;
        let alpha_d = smoothing_factor(update_rate, self.d_cutoff as f64);

        let mut filtered = Vec::with_capacity(current.len());
        for (i, value) in current.iter().enumerate() {
            let prev = state.position[i];
            let dx = if state.primed {
                value.sub(&prev).scale(update_rate as f32)
            } else {
                Landmark::default()
            };
            let edx = Landmark::lerp(&state.derivative[i], &dx, alpha_d);
            let cutoff = self.min_cutoff + self.slope * edx.magnitude();
            let alpha = smoothing_factor(update_rate, cutoff as f64);
            let smoothed = Landmark::lerp(&prev, value, alpha);

            state.derivative[i] = edx;
            state.position[i] = smoothed;
            filtered.push(smoothed);
        }
        state.primed = true;
        state.last_time_s = timestamp_s;

        Ok(LandmarkStream::new(filtered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(values: &[f32]) -> LandmarkStream {
        values
            .iter()
            .map(|&v| Landmark::new(v, -v, v * 0.5, 0.9))
            .collect()
    }

    #[test]
    fn smoothing_factor_bounds() {
        for &cutoff in &[0.1, 1.0, 10.0, 100.0] {
            for &rate in &[10.0, 30.0, 100.0, 1000.0] {
                let alpha = smoothing_factor(rate, cutoff);
                assert!(alpha > 0.0 && alpha < 1.0, "alpha={alpha} rate={rate} cutoff={cutoff}");
            }
        }
    }

    #[test]
    fn first_call_passes_through() {
        let mut filter = OneEuroFilter::new(1.0, 1.0, 1.0);
        let input = stream(&[0.3, 1.5, -2.0]);
        assert_eq!(filter.filter(&input, 12.5).unwrap(), input);
    }

    #[test]
    fn constant_input_converges() {
        let mut filter = OneEuroFilter::new(1.0, 0.5, 1.0);
        filter.filter(&stream(&[0.0, 0.0]), 0.0).unwrap();

        let target = stream(&[1.0, 2.0]);
        let mut out = LandmarkStream::default();
        for step in 1..=600 {
            out = filter.filter(&target, step as f64 / 60.0).unwrap();
        }
        for (got, want) in out.iter().zip(target.iter()) {
            assert!((got.x - want.x).abs() < 1e-4, "{got:?} vs {want:?}");
            assert!((got.y - want.y).abs() < 1e-4);
            assert!((got.z - want.z).abs() < 1e-4);
        }
    }

    #[test]
    fn duplicate_timestamp_returns_input_without_advancing() {
        let mut filter = OneEuroFilter::new(1.0, 1.0, 1.0);
        filter.filter(&stream(&[0.0]), 1.0).unwrap();

        let second = stream(&[5.0]);
        let a = filter.filter(&second, 1.0).unwrap();
        let b = filter.filter(&second, 1.0 + 1e-6).unwrap();
        assert_eq!(a, second);
        assert_eq!(b, second);
        assert!(a.iter().chain(b.iter()).all(|lm| lm.x.is_finite() && lm.y.is_finite()));

        // State still anchored at the seed, so a real step smooths from 0.
        let next = filter.filter(&second, 1.1).unwrap();
        assert!(next[0].x > 0.0 && next[0].x < 5.0);
    }

    #[test]
    fn higher_slope_tracks_fast_motion_closer() {
        let mut lazy = OneEuroFilter::new(1.0, 0.0, 1.0);
        let mut eager = OneEuroFilter::new(1.0, 5.0, 1.0);
        for filter in [&mut lazy, &mut eager] {
            filter.filter(&stream(&[0.0]), 0.0).unwrap();
            filter.filter(&stream(&[0.0]), 0.033).unwrap();
        }
        let r_lazy = lazy.filter(&stream(&[10.0]), 0.066).unwrap();
        let r_eager = eager.filter(&stream(&[10.0]), 0.066).unwrap();
        assert!(r_eager[0].x > r_lazy[0].x, "{} <= {}", r_eager[0].x, r_lazy[0].x);
    }

    #[test]
    fn length_change_is_rejected() {
        let mut filter = OneEuroFilter::new(1.0, 1.0, 1.0);
        filter.filter(&stream(&[0.0, 1.0]), 0.0).unwrap();
        assert_eq!(
            filter.filter(&stream(&[0.0]), 0.1),
            Err(FilterError::LengthMismatch {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn reset_reseeds() {
        let mut filter = OneEuroFilter::new(1.0, 1.0, 1.0);
        filter.filter(&stream(&[0.0]), 0.0).unwrap();
        filter.filter(&stream(&[1.0]), 0.1).unwrap();
        filter.reset();
        let input = stream(&[7.0]);
        assert_eq!(filter.filter(&input, 0.2).unwrap(), input);
    }
}
