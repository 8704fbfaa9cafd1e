//! Pixel source contract and optional object hooks.
//!
//! # Responsibility
//! - Separate the replaceable generation algorithm from protocol bookkeeping.
//! - Provide default answers for every optional hook, so a source only
//!   implements what it advertises through [`PixelSource::features`].
//!
//! # Invariants
//! - `render` is only called with a request matching the declared working set
//!   and a destination of exactly `width * height * bytes_per_pixel` bytes.
//! - Hooks are only reached when the matching `ObjectFlags` bit was reported
//!   at prepare time; gating lives in the object layer, not here.

use crate::abi::{ObjectFlags, PixelFormat, UserCommand};
use crate::error::{ExtError, ExtResult};
use crate::parser::ArgValue;
use serde::Serialize;

/// Dimensions and format an object promises to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkingSet {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl WorkingSet {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    /// Byte size of one frame, or `None` on overflow.
    pub fn frame_len(&self) -> Option<usize> {
        self.format.frame_len(self.width, self.height)
    }
}

/// One host request for pixels. Read-only and never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRequest {
    /// Seconds since the animation started.
    pub time: f32,
    pub delta_time: f32,
    /// Host is rendering in real time (as opposed to exporting).
    pub realtime: bool,
    pub plane: u32,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl FrameRequest {
    /// Request for plane 0 of `working_set` at `time`.
    pub fn for_working_set(working_set: WorkingSet, time: f32) -> Self {
        Self {
            time,
            delta_time: 0.0,
            realtime: true,
            plane: 0,
            width: working_set.width,
            height: working_set.height,
            format: working_set.format,
        }
    }
}

/// Result of an optional hook that may be legitimately skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    Applied,
    Ignored,
}

/// Producer of pixel content for one object.
pub trait PixelSource: Send {
    /// Working set reported by `prepare`.
    fn working_set(&self) -> WorkingSet;

    /// Optional features this object supports.
    fn features(&self) -> ObjectFlags {
        ObjectFlags::NONE
    }

    /// Fills `pixels` for `request`.
    fn render(&self, request: &FrameRequest, pixels: &mut [u8]);

    /// Working set after the host was told the size may have changed.
    fn resized(&mut self) -> WorkingSet {
        self.working_set()
    }

    fn load_file(&mut self, _path: &str) -> ExtResult<()> {
        Err(ExtError::Source("file input is not implemented".to_string()))
    }

    fn unload_file(&mut self) -> ExtResult<()> {
        Err(ExtError::Source("file input is not implemented".to_string()))
    }

    fn set_expression_value(&mut self, _index: i32, _value: &ArgValue) -> HookOutcome {
        HookOutcome::Ignored
    }

    /// Format wanted for source `index`, or `None` to decline the offer.
    fn offer_source(&mut self, _index: i32, _width: u32, _height: u32) -> Option<PixelFormat> {
        None
    }

    fn accept_source_pixels(&mut self, _index: i32, _frame: SourceFrame<'_>) -> HookOutcome {
        HookOutcome::Ignored
    }

    fn user_command(&mut self, _command: UserCommand) -> HookOutcome {
        HookOutcome::Ignored
    }
}

/// Pixels of another host object delivered to a consuming object.
#[derive(Debug, Clone, Copy)]
pub struct SourceFrame<'a> {
    pub plane: u32,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: &'a [u8],
}
