use std::ops::Index;

use serde::{Deserialize, Serialize};

pub const POSE_LANDMARKS: usize = 33;
pub const HAND_LANDMARKS: usize = 21;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: i64,
}

impl Frame {
    pub fn expected_len(width: u32, height: u32) -> usize {
        (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(4)
    }

    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.rgba.len() == Self::expected_len(self.width, self.height)
    }
}

pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    value.max(min).min(max)
}

pub fn lerp(from: f32, to: f32, t: f32) -> f32 {
    let t = clamp(t, 0.0, 1.0);
    from * (1.0 - t) + to * t
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(default)]
    pub confidence: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32, confidence: f32) -> Self {
        Self {
            x,
            y,
            z,
            confidence,
        }
    }

    pub fn position(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Position difference; the result is only as trustworthy as the weaker input.
    pub fn sub(&self, other: &Landmark) -> Landmark {
        Landmark::new(
            self.x - other.x,
            self.y - other.y,
            self.z - other.z,
            self.confidence.min(other.confidence),
        )
    }

    pub fn scale(&self, factor: f32) -> Landmark {
        Landmark::new(
            self.x * factor,
            self.y * factor,
            self.z * factor,
            self.confidence,
        )
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Interpolates all four channels, confidence included. `t` is clamped to `[0, 1]`.
    pub fn lerp(from: &Landmark, to: &Landmark, t: f32) -> Landmark {
        Landmark::new(
            lerp(from.x, to.x, t),
            lerp(from.y, to.y, t),
            lerp(from.z, to.z, t),
            lerp(from.confidence, to.confidence, t),
        )
    }
}

/// Index-significant landmark sequence for one anatomical part.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkStream(Vec<Landmark>);

impl LandmarkStream {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self(landmarks)
    }

    pub fn filled(len: usize, landmark: Landmark) -> Self {
        Self(vec![landmark; len])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Landmark> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Landmark] {
        &self.0
    }

    pub fn map(&self, f: impl Fn(&Landmark) -> Landmark) -> LandmarkStream {
        self.0.iter().map(f).collect()
    }
}

impl Index<usize> for LandmarkStream {
    type Output = Landmark;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl FromIterator<Landmark> for LandmarkStream {
    fn from_iter<I: IntoIterator<Item = Landmark>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub fn label(&self) -> &'static str {
        match self {
            Handedness::Left => "Left",
            Handedness::Right => "Right",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseDetection {
    pub local: LandmarkStream,
    pub world: LandmarkStream,
}

/// One hand as reported by the detector, before identity resolution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandDetection {
    pub local: LandmarkStream,
    pub world: LandmarkStream,
    pub confidence: f32,
    pub label: Handedness,
    #[serde(default)]
    pub raw_index: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub landmarks: LandmarkStream,
    #[serde(default)]
    pub blendshapes: Vec<f32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPair {
    pub local: Option<LandmarkStream>,
    pub world: Option<LandmarkStream>,
}

impl LandmarkPair {
    pub fn is_empty(&self) -> bool {
        self.local.is_none() && self.world.is_none()
    }
}

impl From<HandDetection> for LandmarkPair {
    fn from(hand: HandDetection) -> Self {
        // Hand landmarks carry the handedness score as their confidence.
        let confidence = hand.confidence;
        let stamp = |lm: &Landmark| Landmark { confidence, ..*lm };
        LandmarkPair {
            local: Some(hand.local.map(stamp)),
            world: Some(hand.world.map(stamp)),
        }
    }
}

impl From<PoseDetection> for LandmarkPair {
    fn from(pose: PoseDetection) -> Self {
        LandmarkPair {
            local: Some(pose.local),
            world: Some(pose.world),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HandsLandmarks {
    pub left: LandmarkPair,
    pub right: LandmarkPair,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub landmarks: Option<LandmarkStream>,
    pub blendshapes: Option<Vec<f32>>,
}

impl From<FaceDetection> for FaceLandmarks {
    fn from(face: FaceDetection) -> Self {
        FaceLandmarks {
            landmarks: Some(face.landmarks),
            blendshapes: Some(face.blendshapes),
        }
    }
}

/// Fully assembled per-frame result. Any part may be absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HolisticFrame {
    pub pose: LandmarkPair,
    pub hands: HandsLandmarks,
    pub face: FaceLandmarks,
    pub time_s: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_lerp_clamps_amount() {
        assert_eq!(lerp(0.0, 1.0, -1.0), 0.0);
        assert_eq!(lerp(0.0, 1.0, 0.0), 0.0);
        assert!((lerp(0.0, 1.0, 0.4) - 0.4).abs() < 1e-6);
        assert_eq!(lerp(0.0, 1.0, 1.0), 1.0);
        assert_eq!(lerp(0.0, 1.0, 2.0), 1.0);
    }

    #[test]
    fn clamp_limits_range() {
        assert_eq!(clamp(-1.0, 0.0, 1.0), 0.0);
        assert_eq!(clamp(0.3, 0.0, 1.0), 0.3);
        assert_eq!(clamp(1.4, 0.0, 1.0), 1.0);
    }

    #[test]
    fn landmark_lerp_covers_confidence() {
        let a = Landmark::new(0.0, 1.0, 2.0, 0.0);
        let b = Landmark::new(1.0, 2.0, 3.0, 1.0);
        assert_eq!(Landmark::lerp(&a, &b, -1.0), a);
        assert_eq!(Landmark::lerp(&a, &b, 0.0), a);
        assert_eq!(Landmark::lerp(&a, &b, 1.0), b);
        assert_eq!(Landmark::lerp(&a, &b, 2.0), b);

        let mid = Landmark::lerp(&a, &b, 0.3);
        assert!((mid.x - 0.3).abs() < 1e-6);
        assert!((mid.y - 1.3).abs() < 1e-6);
        assert!((mid.z - 2.3).abs() < 1e-6);
        assert!((mid.confidence - 0.3).abs() < 1e-6);
    }

    #[test]
    fn sub_keeps_weaker_confidence() {
        let a = Landmark::new(3.0, 4.0, 0.0, 0.9);
        let b = Landmark::new(0.0, 0.0, 0.0, 0.4);
        let d = a.sub(&b);
        assert_eq!(d.position(), [3.0, 4.0, 0.0]);
        assert_eq!(d.confidence, 0.4);
        assert_eq!(d.magnitude(), 5.0);
        assert_eq!(d.scale(2.0).position(), [6.0, 8.0, 0.0]);
        assert_eq!(d.scale(2.0).confidence, 0.4);
    }

    #[test]
    fn hand_detection_stamps_confidence() {
        let hand = HandDetection {
            local: LandmarkStream::filled(HAND_LANDMARKS, Landmark::new(0.5, 0.5, 0.0, 0.0)),
            world: LandmarkStream::filled(HAND_LANDMARKS, Landmark::default()),
            confidence: 0.8,
            label: Handedness::Left,
            raw_index: 0,
        };
        let pair = LandmarkPair::from(hand);
        let local = pair.local.unwrap();
        assert_eq!(local.len(), HAND_LANDMARKS);
        assert!(local.iter().all(|lm| lm.confidence == 0.8));
    }

    #[test]
    fn frame_shape_check() {
        let frame = Frame {
            rgba: vec![0; 2 * 3 * 4],
            width: 2,
            height: 3,
            timestamp_ms: 0,
        };
        assert!(frame.is_well_formed());
        let broken = Frame {
            rgba: vec![0; 5],
            ..frame
        };
        assert!(!broken.is_well_formed());
    }
}
