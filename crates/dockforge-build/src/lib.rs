//! Dockforge image build functionality
//!
//! This crate runs the external container build engine (docker, podman, ...)
//! against a staged build context, checking its exit status and enforcing
//! an optional timeout and cancellation.

pub mod builder;
pub mod error;
pub mod progress;

pub use builder::{
    BuildEngine, BuildOutcome, BuildRequest, ImageBuilder, LineSink, image_tag,
};
pub use error::{BuildError, Result};
pub use progress::BuildProgress;
