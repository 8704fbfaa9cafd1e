//! Built-in example generator: a soft four-lobe shape over a vertical gradient.
//!
//! The picture is a pure function of pixel position and time. The object kind
//! only selects the colour channels: stills are drawn in red, animations in
//! green plus red or blue depending on the sign of the horizontal stretch.

use crate::abi::{ObjectKind, PixelFormat};
use crate::error::{ExtError, ExtResult};
use crate::parser::ParsedArgs;
use crate::render::source::{FrameRequest, PixelSource, WorkingSet};

/// Default working set of the `example` initializer.
pub const EXAMPLE_WIDTH: u32 = 640;
pub const EXAMPLE_HEIGHT: u32 = 480;

const LOBE_SIGNS: [f64; 5] = [1.0, 1.0, -1.0, -1.0, 1.0];
const LOBE_RADIUS: f64 = 0.11;
const LOBE_OFFSET: f64 = 0.25;
const LOBE_SPREAD: f64 = 0.09;

/// Generator behind both built-in initializers.
#[derive(Debug, Clone, PartialEq)]
pub struct ExampleSource {
    animated: bool,
    working_set: WorkingSet,
}

impl ExampleSource {
    pub fn new(kind: ObjectKind, width: u32, height: u32) -> Self {
        Self {
            animated: kind.is_animated(),
            working_set: WorkingSet::new(width, height, PixelFormat::RgbaByte),
        }
    }

    pub fn is_animated(&self) -> bool {
        self.animated
    }

    /// RGBA of one pixel in `0..=255` units.
    fn shade(&self, x: u32, y: u32, width: u32, height: u32, stretch: f64) -> [f64; 4] {
        let (w, h) = (f64::from(width), f64::from(height));
        let py = 2.0 * (f64::from(y) + 0.5) / h - 1.0;
        let px = (2.0 * (f64::from(x) + 0.5) / w - 1.0) * stretch * w / h;

        let mut distance = 0.5 - (px.abs() + py.abs());
        for lobe in 0..4 {
            let sign = LOBE_SIGNS[lobe] * LOBE_SIGNS[lobe + 1];
            let reach = LOBE_OFFSET - sign * LOBE_SPREAD;
            let dx = LOBE_SIGNS[lobe] * reach - px;
            let dy = LOBE_SIGNS[lobe + 1] * reach - py;
            let lobe_distance = (dx * dx + dy * dy).sqrt() - LOBE_RADIUS;
            let blend = unit_clamp(0.5 + 0.5 / LOBE_RADIUS * (lobe_distance - sign * distance));
            distance = sign
                * (sign * distance * blend + lobe_distance * (1.0 - blend)
                    - LOBE_RADIUS * blend * (1.0 - blend));
        }

        let channels = self.channel_mask(stretch);
        let alpha = 128.0 * (distance * h + 1.0);
        [
            (128.0 + 127.0 * py) * channels[0],
            (64.0 + 64.0 * py) * channels[1],
            (128.0 + 127.0 * py) * channels[2],
            if (0.0..=255.0).contains(&alpha) {
                alpha
            } else if alpha > 0.0 {
                255.0
            } else {
                0.0
            },
        ]
    }

    fn channel_mask(&self, stretch: f64) -> [f64; 3] {
        let on = |flag: bool| if flag { 1.0 } else { 0.0 };
        [
            on(!self.animated || stretch < 0.0),
            on(self.animated),
            on(self.animated && stretch > 0.0),
        ]
    }
}

impl PixelSource for ExampleSource {
    fn working_set(&self) -> WorkingSet {
        self.working_set
    }

    fn render(&self, request: &FrameRequest, pixels: &mut [u8]) {
        // Requests were matched against the byte working set before allocation.
        let stretch = 1.0 / (2.0 * f64::from(request.time)).cos();
        let width = request.width as usize;

        for (index, pixel) in pixels
            .chunks_exact_mut(PixelFormat::RgbaByte.bytes_per_pixel())
            .enumerate()
        {
            let x = (index % width) as u32;
            let y = (index / width) as u32;
            let rgba = self.shade(x, y, request.width, request.height, stretch);
            for (dst, value) in pixel.iter_mut().zip(rgba) {
                *dst = value as u8;
            }
        }
    }
}

fn unit_clamp(value: f64) -> f64 {
    if (0.0..=1.0).contains(&value) {
        value
    } else if value > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Source for the argument-less `example` initializer.
pub fn example_source(_args: &ParsedArgs, kind: ObjectKind) -> ExtResult<Box<dyn PixelSource>> {
    Ok(Box::new(ExampleSource::new(
        kind,
        EXAMPLE_WIDTH,
        EXAMPLE_HEIGHT,
    )))
}

/// Source for `example_sized(width, height)`.
pub fn sized_example_source(
    args: &ParsedArgs,
    kind: ObjectKind,
) -> ExtResult<Box<dyn PixelSource>> {
    let dimension = |index: usize| {
        args.int(index)
            .and_then(|value| u32::try_from(value).ok())
            .filter(|value| *value > 0)
            .ok_or_else(|| ExtError::Source(format!("argument {index} is not a positive int")))
    };
    let width = dimension(0)?;
    let height = dimension(1)?;
    Ok(Box::new(ExampleSource::new(kind, width, height)))
}
