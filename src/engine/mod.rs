// Media processing engine - independent of the CLI

pub mod batch;
pub mod compat;
pub mod core;
pub mod error;
pub mod hardware;
pub mod probe;
pub mod process;
pub mod worker;

pub use batch::{BatchObserver, BatchOptions, BatchPipeline, Timeouts};
pub use compat::{Compatibility, Mismatch};
pub use core::*;
pub use error::{EngineError, ErrorKind};
pub use hardware::{Backend, CapabilityDetector, CapabilitySnapshot, ToolOverrides};
pub use probe::{DescriptorCache, ImageDescriptor, MediaDescriptor, MetadataExtractor};
pub use process::{CommandRunner, Outcome, ProcessOutput, ProcessRunner};
pub use worker::{BatchHandle, WorkerMessage, spawn_batch};
