use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{
    config::{ConfigError, ensure_positive},
    types::{HandDetection, Handedness, LandmarkStream},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Sum of per-landmark Manhattan distances.
    L1,
    /// Sum of per-landmark Euclidean distances.
    L2,
}

impl DistanceMetric {
    /// Summed over all landmarks. Streams of different length are infinitely far apart.
    pub fn distance(&self, a: &LandmarkStream, b: &LandmarkStream) -> f32 {
        if a.len() != b.len() {
            return f32::INFINITY;
        }
        a.iter()
            .zip(b.iter())
            .map(|(p, q)| {
                let d = p.sub(q);
                match self {
                    DistanceMetric::L1 => d.x.abs() + d.y.abs() + d.z.abs(),
                    DistanceMetric::L2 => d.magnitude(),
                }
            })
            .sum()
    }
}

/// How two detections are split when both hands have fresh history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwoHandPolicy {
    /// Trust differing labels; break duplicate labels by the nearer cached hand.
    NearestCache,
    /// Pick the assignment with the smaller summed left + right distance.
    CombinedDistance,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_max_move_distance")]
    pub max_move_distance: f32,
    #[serde(default = "default_cache_expiration_s")]
    pub cache_expiration_s: f64,
    #[serde(default = "default_metric")]
    pub metric: DistanceMetric,
    #[serde(default = "default_two_hand_policy")]
    pub two_hand_policy: TwoHandPolicy,
}

fn default_max_move_distance() -> f32 {
    1.5
}
fn default_cache_expiration_s() -> f64 {
    1.0
}
fn default_metric() -> DistanceMetric {
    DistanceMetric::L2
}
fn default_two_hand_policy() -> TwoHandPolicy {
    TwoHandPolicy::NearestCache
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_move_distance: default_max_move_distance(),
            cache_expiration_s: default_cache_expiration_s(),
            metric: default_metric(),
            two_hand_policy: default_two_hand_policy(),
        }
    }
}

impl ResolverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("max_move_distance", self.max_move_distance as f64)?;
        ensure_positive("cache_expiration_s", self.cache_expiration_s)
    }
}

#[derive(Clone, Debug)]
struct HandCacheEntry {
    world: LandmarkStream,
    updated_at_s: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedHands {
    pub left: Option<HandDetection>,
    pub right: Option<HandDetection>,
}

impl ResolvedHands {
    fn none() -> Self {
        Self::default()
    }

    fn with(side: Handedness, hand: HandDetection) -> Self {
        let mut resolved = Self::default();
        *resolved.side_mut(side) = Some(hand);
        resolved
    }

    fn side_mut(&mut self, side: Handedness) -> &mut Option<HandDetection> {
        match side {
            Handedness::Left => &mut self.left,
            Handedness::Right => &mut self.right,
        }
    }
}

/// Keeps left/right assignment stable across frames using a short-lived cache of
/// the last resolved world landmarks per side.
pub struct HandIdentityResolver {
    config: ResolverConfig,
    left: Option<HandCacheEntry>,
    right: Option<HandCacheEntry>,
}

impl HandIdentityResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            left: None,
            right: None,
        }
    }

    pub fn reset(&mut self) {
        self.left = None;
        self.right = None;
    }

    pub fn has_valid_cache(&self, side: Handedness, now_s: f64) -> bool {
        self.cached(side, now_s).is_some()
    }

    fn entry(&self, side: Handedness) -> &Option<HandCacheEntry> {
        match side {
            Handedness::Left => &self.left,
            Handedness::Right => &self.right,
        }
    }

    fn cached(&self, side: Handedness, now_s: f64) -> Option<&LandmarkStream> {
        self.entry(side)
            .as_ref()
            .filter(|entry| now_s - entry.updated_at_s <= self.config.cache_expiration_s)
            .map(|entry| &entry.world)
    }

    fn distance_to(&self, side: Handedness, hand: &HandDetection, now_s: f64) -> Option<f32> {
        self.cached(side, now_s)
            .map(|world| self.config.metric.distance(&hand.world, world))
    }

    pub fn resolve(&mut self, detections: &[HandDetection], now_s: f64) -> ResolvedHands {
        let resolved = match detections {
            [] => ResolvedHands::none(),
            [hand] => self.resolve_single(hand, now_s),
            [first, second] => self.resolve_pair(first, second, now_s),
            more => {
                let mut ranked: Vec<&HandDetection> = more.iter().collect();
                ranked.sort_by(|a, b| {
                    b.confidence
                        .partial_cmp(&a.confidence)
                        .unwrap_or(Ordering::Equal)
                });
                log::debug!("{} hands detected, keeping the two most confident", more.len());
                self.resolve_pair(ranked[0], ranked[1], now_s)
            }
        };

        for side in [Handedness::Left, Handedness::Right] {
            let hand = match side {
                Handedness::Left => &resolved.left,
                Handedness::Right => &resolved.right,
            };
            if let Some(hand) = hand {
                let entry = HandCacheEntry {
                    world: hand.world.clone(),
                    updated_at_s: now_s,
                };
                match side {
                    Handedness::Left => self.left = Some(entry),
                    Handedness::Right => self.right = Some(entry),
                }
            }
        }
        resolved
    }

    fn resolve_single(&self, hand: &HandDetection, now_s: f64) -> ResolvedHands {
        let max = self.config.max_move_distance;
        let left = self.distance_to(Handedness::Left, hand, now_s);
        let right = self.distance_to(Handedness::Right, hand, now_s);

        let (side, distance) = match (left, right) {
            (Some(l), Some(r)) => {
                if l <= r {
                    (Handedness::Left, l)
                } else {
                    (Handedness::Right, r)
                }
            }
            (Some(l), None) => (Handedness::Left, l),
            (None, Some(r)) => (Handedness::Right, r),
            (None, None) => return ResolvedHands::with(hand.label, hand.clone()),
        };

        if side != hand.label || distance > max {
            log::debug!(
                "discarding {} hand: nearest cached side {} at {distance:.3}",
                hand.label.label(),
                side.label()
            );
            return ResolvedHands::none();
        }
        ResolvedHands::with(side, hand.clone())
    }

    fn resolve_pair(
        &self,
        first: &HandDetection,
        second: &HandDetection,
        now_s: f64,
    ) -> ResolvedHands {
        if self.config.two_hand_policy == TwoHandPolicy::CombinedDistance {
            if let Some(resolved) = self.resolve_pair_combined(first, second, now_s) {
                return resolved;
            }
        }

        if first.label != second.label {
            let mut resolved = ResolvedHands::none();
            *resolved.side_mut(first.label) = Some(first.clone());
            *resolved.side_mut(second.label) = Some(second.clone());
            return resolved;
        }

        // Both detections claim the same side; keep one of them.
        let side = first.label;
        let keep_first = match (
            self.distance_to(side, first, now_s),
            self.distance_to(side, second, now_s),
        ) {
            (Some(d0), Some(d1)) => d0 <= d1,
            _ => first.confidence >= second.confidence,
        };
        let kept = if keep_first { first } else { second };
        ResolvedHands::with(side, kept.clone())
    }

    fn resolve_pair_combined(
        &self,
        first: &HandDetection,
        second: &HandDetection,
        now_s: f64,
    ) -> Option<ResolvedHands> {
        let straight = self.distance_to(Handedness::Left, first, now_s)?
            + self.distance_to(Handedness::Right, second, now_s)?;
        let swapped = self.distance_to(Handedness::Left, second, now_s)?
            + self.distance_to(Handedness::Right, first, now_s)?;

        let (left, right) = if straight <= swapped {
            (first, second)
        } else {
            (second, first)
        };
        Some(ResolvedHands {
            left: Some(left.clone()),
            right: Some(right.clone()),
        })
    }
}
