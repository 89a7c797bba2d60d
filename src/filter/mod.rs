mod exponential;
mod gaussian;
mod one_euro;

use thiserror::Error;

use crate::{
    config::{ConfigError, FilterSpec, FiltersConfig},
    types::{HolisticFrame, LandmarkStream},
};

pub use exponential::ExponentialFilter;
pub use gaussian::{GaussianWindowFilter, gaussian_smooth_sequence};
pub use one_euro::OneEuroFilter;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("landmark stream length changed: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Temporal smoothing over one landmark stream. State lives in the filter and is
/// advanced by every accepted call, in call order.
pub trait LandmarkFilter: Send {
    fn filter(
        &mut self,
        current: &LandmarkStream,
        timestamp_s: f64,
    ) -> Result<LandmarkStream, FilterError>;
}

#[derive(Debug, Default)]
pub struct PassThrough;

impl LandmarkFilter for PassThrough {
    fn filter(
        &mut self,
        current: &LandmarkStream,
        _timestamp_s: f64,
    ) -> Result<LandmarkStream, FilterError> {
        Ok(current.clone())
    }
}

pub fn build_filter(spec: &FilterSpec) -> Result<Box<dyn LandmarkFilter>, ConfigError> {
    spec.validate()?;
    Ok(match *spec {
        FilterSpec::OneEuro {
            min_cutoff,
            slope,
            d_cutoff,
        } => Box::new(OneEuroFilter::new(min_cutoff, slope, d_cutoff)),
        FilterSpec::Exponential { smoothing_factor } => {
            Box::new(ExponentialFilter::new(smoothing_factor))
        }
        FilterSpec::Gaussian { sigma, window_size } => {
            Box::new(GaussianWindowFilter::new(sigma, window_size))
        }
        FilterSpec::None => Box::new(PassThrough),
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamId {
    PoseLocal,
    PoseWorld,
    LeftLocal,
    LeftWorld,
    RightLocal,
    RightWorld,
    Face,
}

impl StreamId {
    pub const ALL: [StreamId; 7] = [
        StreamId::PoseLocal,
        StreamId::PoseWorld,
        StreamId::LeftLocal,
        StreamId::LeftWorld,
        StreamId::RightLocal,
        StreamId::RightWorld,
        StreamId::Face,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StreamId::PoseLocal => "pose_local",
            StreamId::PoseWorld => "pose_world",
            StreamId::LeftLocal => "left_hand_local",
            StreamId::LeftWorld => "left_hand_world",
            StreamId::RightLocal => "right_hand_local",
            StreamId::RightWorld => "right_hand_world",
            StreamId::Face => "face_landmark",
        }
    }

    fn spec<'a>(&self, config: &'a FiltersConfig) -> &'a FilterSpec {
        match self {
            StreamId::PoseLocal | StreamId::PoseWorld => &config.pose,
            StreamId::LeftLocal
            | StreamId::LeftWorld
            | StreamId::RightLocal
            | StreamId::RightWorld => &config.hand,
            StreamId::Face => &config.face,
        }
    }

    pub fn slot<'a>(&self, frame: &'a mut HolisticFrame) -> &'a mut Option<LandmarkStream> {
        match self {
            StreamId::PoseLocal => &mut frame.pose.local,
            StreamId::PoseWorld => &mut frame.pose.world,
            StreamId::LeftLocal => &mut frame.hands.left.local,
            StreamId::LeftWorld => &mut frame.hands.left.world,
            StreamId::RightLocal => &mut frame.hands.right.local,
            StreamId::RightWorld => &mut frame.hands.right.world,
            StreamId::Face => &mut frame.face.landmarks,
        }
    }
}

/// One independent filter per stream; never shared between streams.
pub struct StreamFilters {
    filters: Vec<(StreamId, Box<dyn LandmarkFilter>)>,
}

impl StreamFilters {
    pub fn from_config(config: &FiltersConfig) -> Result<Self, ConfigError> {
        let filters = StreamId::ALL
            .iter()
            .map(|id| Ok((*id, build_filter(id.spec(config))?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self { filters })
    }

    /// Filters every present stream in place using the frame timestamp. Absent
    /// streams leave their filter state untouched.
    pub fn apply(&mut self, frame: &mut HolisticFrame) {
        let time_s = frame.time_s;
        for (id, filter) in &mut self.filters {
            let Some(stream) = id.slot(frame).as_mut() else {
                continue;
            };
            match filter.filter(stream, time_s) {
                Ok(filtered) => *stream = filtered,
                Err(err) => log::warn!("{} passed through unfiltered: {err}", id.name()),
            }
        }
    }
}
