//! Pixel generation behind objects.
//!
//! # Responsibility
//! - Define the [`PixelSource`] contract objects render through.
//! - Ship the built-in example generator used by the default catalog.

pub mod example;
mod source;

pub use example::{ExampleSource, EXAMPLE_HEIGHT, EXAMPLE_WIDTH};
pub use source::{FrameRequest, HookOutcome, PixelSource, SourceFrame, WorkingSet};
