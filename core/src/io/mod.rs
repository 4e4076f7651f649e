pub mod recorder;
pub mod samples;
pub mod stream;

pub use recorder::{FrameRecorder, RecordingManifest};
pub use samples::{read_complex64, write_complex64, write_complex64_file, FileSampleSource};
pub use stream::{sample_channel, SampleStream, SampleWriter};
