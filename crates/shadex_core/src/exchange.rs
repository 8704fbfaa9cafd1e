//! Pixel exchange: buffers handed to the host and taken back.
//!
//! # Responsibility
//! - Validate fetch requests against the object's declared working set
//!   before any allocation happens.
//! - Track every outstanding buffer with its owning object so release can
//!   reject foreign, stale or double-released tokens.
//!
//! # Invariants
//! - A buffer holds exactly `width * height * bytes_per_pixel` bytes.
//! - Each buffer is released at most once, either by the host or when its
//!   owner is destroyed.

use crate::abi::PixelFormat;
use crate::arena::{Arena, Handle};
use crate::error::{ExtError, ExtResult, Resource};
use crate::object::ObjectRecord;
use crate::render::FrameRequest;
use crate::stats::ResourceStats;
use log::{debug, warn};

struct PixelBuffer {
    owner: Handle,
    plane: u32,
    format: PixelFormat,
    pixels: Box<[u8]>,
}

/// Outstanding pixel buffers of one module instance.
pub struct PixelExchange {
    buffers: Arena<PixelBuffer>,
}

impl Default for PixelExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelExchange {
    pub fn new() -> Self {
        Self {
            buffers: Arena::new(Resource::Buffer),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.buffers.len()
    }

    /// Renders one frame of `object` into a fresh buffer.
    pub fn fetch(
        &mut self,
        owner: Handle,
        object: &ObjectRecord,
        request: &FrameRequest,
        stats: &mut ResourceStats,
    ) -> ExtResult<Handle> {
        let len = validate_request(object, request)?;

        let mut pixels = Vec::new();
        pixels.try_reserve_exact(len).map_err(|_| {
            ExtError::Source(format!("allocation of {len} pixel bytes failed"))
        })?;
        pixels.resize(len, 0u8);
        object.render(request, &mut pixels);

        let handle = self.buffers.insert(PixelBuffer {
            owner,
            plane: request.plane,
            format: request.format,
            pixels: pixels.into_boxed_slice(),
        })?;
        stats.buffer_fetched(len);
        debug!(
            "event=pixels_fetch module=exchange status=ok object={} bytes={len} time={}",
            object.name(),
            request.time
        );
        Ok(handle)
    }

    /// Bytes of an outstanding buffer owned by `owner`.
    pub fn pixels(&self, owner: Handle, token: usize) -> ExtResult<&[u8]> {
        let handle = self.owned(owner, token)?;
        self.buffers
            .get(handle)
            .map(|buffer| &buffer.pixels[..])
            .ok_or(ExtError::UnknownHandle {
                resource: Resource::Buffer,
                token,
            })
    }

    /// Returns a buffer to the module. The token is dead afterwards.
    pub fn release(
        &mut self,
        owner: Handle,
        token: usize,
        stats: &mut ResourceStats,
    ) -> ExtResult<()> {
        let handle = self.owned(owner, token).inspect_err(|_| {
            warn!("event=pixels_release module=exchange status=rejected token={token:#x}");
        })?;
        let Some(buffer) = self.buffers.remove(handle) else {
            return Err(ExtError::UnknownHandle {
                resource: Resource::Buffer,
                token,
            });
        };
        stats.buffer_released(buffer.pixels.len());
        debug!(
            "event=pixels_release module=exchange status=ok plane={} format={:?} bytes={}",
            buffer.plane,
            buffer.format,
            buffer.pixels.len()
        );
        Ok(())
    }

    /// Frees every buffer still held for `owner` and returns how many.
    pub fn reclaim_owner(&mut self, owner: Handle, stats: &mut ResourceStats) -> usize {
        let orphaned: Vec<Handle> = self
            .buffers
            .handles()
            .into_iter()
            .filter(|handle| {
                self.buffers
                    .get(*handle)
                    .is_some_and(|buffer| buffer.owner == owner)
            })
            .collect();
        let count = orphaned.len();
        for handle in orphaned {
            if let Some(buffer) = self.buffers.remove(handle) {
                stats.buffer_released(buffer.pixels.len());
            }
        }
        count
    }

    /// Frees every outstanding buffer.
    pub fn reclaim_all(&mut self, stats: &mut ResourceStats) -> usize {
        let drained = self.buffers.drain();
        for buffer in &drained {
            stats.buffer_released(buffer.pixels.len());
        }
        drained.len()
    }

    fn owned(&self, owner: Handle, token: usize) -> ExtResult<Handle> {
        let handle = self.buffers.resolve(token)?;
        match self.buffers.get(handle) {
            Some(buffer) if buffer.owner == owner => Ok(handle),
            _ => Err(ExtError::UnknownHandle {
                resource: Resource::Buffer,
                token,
            }),
        }
    }
}

/// Checks `request` against the declared working set and returns the frame
/// size in bytes.
fn validate_request(object: &ObjectRecord, request: &FrameRequest) -> ExtResult<usize> {
    let declared = object.working_set("fetch_pixels")?;
    if request.plane != 0 {
        return Err(ExtError::RequestMismatch(format!(
            "plane {} requested; only plane 0 exists",
            request.plane
        )));
    }
    if request.width == 0 || request.height == 0 {
        return Err(ExtError::RequestMismatch(format!(
            "empty request {}x{}",
            request.width, request.height
        )));
    }
    if (request.width, request.height) != (declared.width, declared.height) {
        return Err(ExtError::RequestMismatch(format!(
            "requested {}x{} but working set is {}x{}",
            request.width, request.height, declared.width, declared.height
        )));
    }
    if request.format != declared.format {
        return Err(ExtError::RequestMismatch(format!(
            "requested {:?} but working set is {:?}",
            request.format, declared.format
        )));
    }
    request
        .format
        .frame_len(request.width, request.height)
        .ok_or_else(|| ExtError::RequestMismatch("frame size overflows".to_string()))
}
