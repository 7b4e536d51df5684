pub mod assemble;
pub mod encode;
pub mod header;
pub mod pipeline;
pub mod resolve;
pub mod selector;
pub mod table;

pub use pipeline::{BatchConfig, BatchError, BatchErrorKind, BatchPipeline};
