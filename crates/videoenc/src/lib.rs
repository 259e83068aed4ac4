mod assemble;
mod encoder;
mod sequence;

pub use assemble::{AssemblyReport, VideoAssembler};
pub use encoder::{EncodeError, EncodeJob, EncoderStatus, FfmpegEncoder, VideoEncoder};
pub use sequence::{FrameSequence, FRAME_FILE_PATTERN};
