#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod detector;
pub mod orchestrator;
pub mod overlay;
pub mod rgba_converter;
pub mod sender;
pub mod sink;
pub mod source;

#[cfg(feature = "camera-nokhwa")]
pub use camera::WebcamSource;
pub use detector::{DetectorSet, LandmarkDetector, ReplayDetector};
pub use orchestrator::{DetectionOrchestrator, DispatchMode, RawDetections};
pub use sender::{BinaryPacker, UdpDispatcher, WirePacker};
pub use sink::{FrameRecordHeader, SharedMemorySink, SinkError};
pub use source::{CachedSource, FrameSource, ImageSequenceSource, MmapFrameSource};
