//! Bit flags and closed enumerations of the host ABI.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

bitflags! {
    /// Capabilities advertised once at registration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExtensionFlags: u32 {
        /// Extension can produce still images.
        const IMAGE = 0x0001;
        /// Extension can produce animations.
        const ANIMATION = 0x0002;
        /// Strings exchanged with the host are UTF-8.
        const CHARSET_UTF8 = 0x0100;
    }
}

bitflags! {
    /// Object kinds one initializer keyword can produce.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KindSet: u32 {
        const IMAGE = 0x0001;
        const ANIMATION = 0x0002;
    }
}

bitflags! {
    /// Optional per-object features reported by `prepare`.
    ///
    /// Each flag unlocks one family of host calls for the object's lifetime.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObjectFlags: u32 {
        /// Host may re-query the working set through `object_size`.
        const DYNAMIC_SIZE = 0x0001;
        /// Object accepts `load_file`/`unload_file`.
        const FILE_INPUT = 0x0002;
        /// Object accepts expression value updates.
        const EXPRESSION_INPUT = 0x0004;
        /// Object consumes pixels of other host objects.
        const SOURCE_INPUT = 0x0008;
        /// Object reacts to user commands.
        const USER_COMMANDS = 0x0010;
    }
}

bitflags! {
    /// Hints the host passes into `prepare`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PrepareHints: u32 {
        const FULL_RANGE = 0x0001;
        const HARD_RESET = 0x0002;
    }
}

bitflags! {
    /// Set of argument kinds the parser accepts next. `NONE` ends the list.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ArgTypes: u32 {
        const BOOL = 0x0001;
        const INT = 0x0002;
        const FLOAT = 0x0004;
        const STRING = 0x0008;
    }
}

impl ExtensionFlags {
    pub const NONE: Self = Self::empty();
}

impl KindSet {
    pub const NONE: Self = Self::empty();
}

impl ObjectFlags {
    pub const NONE: Self = Self::empty();
}

impl PrepareHints {
    pub const NONE: Self = Self::empty();
}

impl ArgTypes {
    pub const NONE: Self = Self::empty();
}

/// Object kind, fixed for the lifetime of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Still image; reports itself as not animated.
    Image,
    /// Time-varying animation.
    Animation,
}

impl ObjectKind {
    /// Maps the host's single-bit kind value.
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Image),
            0x0002 => Some(Self::Animation),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Self::Image => 0x0001,
            Self::Animation => 0x0002,
        }
    }

    /// Single-member kind set for this kind.
    pub fn as_set(self) -> KindSet {
        match self {
            Self::Image => KindSet::IMAGE,
            Self::Animation => KindSet::ANIMATION,
        }
    }

    pub fn is_animated(self) -> bool {
        matches!(self, Self::Animation)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Animation => "animation",
        }
    }
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel layouts the host understands. Rows are tightly packed, top row first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 8-bit RGBA, channel-interleaved.
    RgbaByte,
    /// 32-bit float RGBA, channel-interleaved.
    RgbaFloat,
}

impl PixelFormat {
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::RgbaByte),
            2 => Some(Self::RgbaFloat),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Self::RgbaByte => 1,
            Self::RgbaFloat => 2,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::RgbaByte => 4,
            Self::RgbaFloat => 16,
        }
    }

    /// Byte size of a `width` x `height` frame, or `None` on overflow.
    pub fn frame_len(self, width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(self.bytes_per_pixel())
    }
}

/// String encodings accepted for text written back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Utf8,
    /// Native-endian UTF-16; lengths are counted in code units.
    Utf16,
}

impl Encoding {
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Utf8),
            2 => Some(Self::Utf16),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Self::Utf8 => 1,
            Self::Utf16 => 2,
        }
    }

    /// Bytes per length unit.
    pub fn unit_size(self) -> usize {
        match self {
            Self::Utf8 => 1,
            Self::Utf16 => 2,
        }
    }
}

/// Kind tag of one initializer argument value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgType {
    Bool,
    Int,
    Float,
    String,
}

impl ArgType {
    /// Maps a raw tag; the tag must name exactly one kind.
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Bool),
            0x0002 => Some(Self::Int),
            0x0004 => Some(Self::Float),
            0x0008 => Some(Self::String),
            _ => None,
        }
    }

    pub fn as_set(self) -> ArgTypes {
        match self {
            Self::Bool => ArgTypes::BOOL,
            Self::Int => ArgTypes::INT,
            Self::Float => ArgTypes::FLOAT,
            Self::String => ArgTypes::STRING,
        }
    }

    pub fn as_raw(self) -> i32 {
        self.as_set().bits() as i32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
        }
    }
}

impl Display for ArgTypes {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names = [ArgType::Bool, ArgType::Int, ArgType::Float, ArgType::String]
            .into_iter()
            .filter(|kind| self.contains(kind.as_set()))
            .map(ArgType::as_str)
            .collect::<Vec<_>>();
        f.write_str(&names.join("|"))
    }
}

/// Commands a user can trigger on an object from the host UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    /// Restart the animation from its first frame.
    Restart,
    Other(i32),
}

impl UserCommand {
    pub fn from_raw(value: i32) -> Self {
        match value {
            1 => Self::Restart,
            other => Self::Other(other),
        }
    }
}
