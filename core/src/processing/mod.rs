pub mod axes;
pub mod cfar;
pub mod doppler;
pub mod framer;
pub mod normalize;
pub mod pipeline;
pub mod range;

pub use axes::AxisCalculator;
pub use cfar::{CfarConfig, CfarDetector};
pub use doppler::DopplerTransform;
pub use framer::{FramerConfig, SampleFramer};
pub use normalize::MapNormalizer;
pub use pipeline::{FrameSubscriber, Pipeline, PipelineHandle, PipelineSummary, ProcessedCpi};
pub use range::MatchedFilter;
