//! Host ABI vocabulary shared by core and the exported entry points.
//!
//! # Responsibility
//! - Define the closed value sets that cross the boundary (result codes,
//!   flags, formats, encodings, argument kinds).
//! - Keep raw integer values in one place so the FFI edge is a pure mapping.
//!
//! # Invariants
//! - Raw values must match the host header byte-for-byte; they are never
//!   renumbered.
//! - Conversions from raw integers are total: unknown values map to `None`,
//!   never to a default variant.

mod flags;
mod result;

pub use flags::{
    ArgType, ArgTypes, Encoding, ExtensionFlags, KindSet, ObjectFlags, ObjectKind, PixelFormat,
    PrepareHints, UserCommand,
};
pub use result::ResultCode;

/// Magic number written during registration to prove protocol agreement.
pub const HANDSHAKE_MAGIC: i32 = 0x5348_4431;

/// Name this extension registers under.
pub const EXTENSION_NAME: &str = "example";

/// Extension version reported to the host (`100` reads as 1.00).
pub const EXTENSION_VERSION: i32 = 100;

/// Capacity the host allocates for registration and initializer names.
pub const HOST_NAME_CAPACITY: usize = 256;
