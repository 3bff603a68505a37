pub mod caption;
pub mod command;
pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod screenshot;
pub mod speech;
pub mod timeline;
pub mod timing;
pub mod transcribe;

pub use caption::{segment, CaptionUnit, Segmenter};
pub use config::Config;
pub use error::{Result, StorycutError};
pub use pipeline::{
    print_summary, CaptionSource, ImageSource, JobSpec, NarrationSource, Pipeline,
    PipelineConfig, PipelineResult, PipelineStats,
};
pub use timeline::{partition, split_timeline, PartLimits, PartRange, Timeline, TimelinePart};
