use super::{FilterError, LandmarkFilter};
use crate::types::{Landmark, LandmarkStream};

pub struct ExponentialFilter {
    smoothing_factor: f32,
    prev: Option<LandmarkStream>,
}

impl ExponentialFilter {
    pub fn new(smoothing_factor: f32) -> Self {
        Self {
            smoothing_factor,
            prev: None,
        }
    }
}

impl LandmarkFilter for ExponentialFilter {
    fn filter(
        &mut self,
        current: &LandmarkStream,
        _timestamp_s: f64,
    ) -> Result<LandmarkStream, FilterError> {
        let filtered = match &self.prev {
            None => current.clone(),
            Some(prev) if prev.len() != current.len() => {
                return Err(FilterError::LengthMismatch {
                    expected: prev.len(),
                    actual: current.len(),
                });
            }
            Some(prev) => prev
                .iter()
                .zip(current.iter())
                .map(|(p, c)| Landmark::lerp(p, c, self.smoothing_factor))
                .collect(),
        };
        self.prev = Some(filtered.clone());
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blends_towards_current() {
        let mut filter = ExponentialFilter::new(0.25);
        let zero = LandmarkStream::filled(3, Landmark::new(0.0, 0.0, 0.0, 0.0));
        let one = LandmarkStream::filled(3, Landmark::new(1.0, 1.0, 1.0, 1.0));

        assert_eq!(filter.filter(&zero, 0.0).unwrap(), zero);
        let out = filter.filter(&one, 0.1).unwrap();
        assert!((out[0].x - 0.25).abs() < 1e-6);
        assert!((out[2].confidence - 0.25).abs() < 1e-6);

        let out = filter.filter(&one, 0.2).unwrap();
        assert!((out[1].y - 0.4375).abs() < 1e-6);
    }
}
