//! Core of the `example` Shadron extension.
//! Everything here is safe Rust; raw pointers only appear in `shadex_ffi`.

pub mod abi;
pub mod arena;
pub mod config;
pub mod error;
pub mod exchange;
pub mod extension;
pub mod logging;
pub mod module;
pub mod object;
pub mod parser;
pub mod render;
pub mod stats;
pub mod text;

pub use abi::{
    ArgType, ArgTypes, Encoding, ExtensionFlags, KindSet, ObjectFlags, ObjectKind, PixelFormat,
    PrepareHints, ResultCode, UserCommand,
};
pub use config::ModuleConfig;
pub use error::{ExtError, ExtResult, Resource};
pub use extension::catalog::{InitializerCatalog, InitializerDescriptor, InitializerInfo};
pub use extension::registry::{
    register, register_with_catalog, unregister, verify_handshake, Registration,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use module::{BufferToken, ExtensionModule, ObjectToken, ParseToken};
pub use object::Prepared;
pub use parser::{ArgValue, ParsedArgs};
pub use render::{FrameRequest, HookOutcome, PixelSource, SourceFrame, WorkingSet};
pub use stats::ResourceStats;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
