//! Registration handshake and teardown.
//!
//! # Invariants
//! - Registration writes the extension name only when it fits; a short
//!   buffer fails without a partial copy and without creating a module.
//! - Logging failures never fail registration.
//! - Unregistration reclaims whatever the host leaked and reports it.

use crate::abi::{ExtensionFlags, EXTENSION_NAME, EXTENSION_VERSION, HANDSHAKE_MAGIC};
use crate::config::ModuleConfig;
use crate::error::{ExtError, ExtResult};
use crate::extension::catalog::InitializerCatalog;
use crate::logging::init_from_config;
use crate::module::ExtensionModule;
use crate::stats::ResourceStats;
use crate::text::copy_bounded;
use log::{info, warn};

/// What the host learns about the module at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub magic: i32,
    pub flags: ExtensionFlags,
    /// Bytes of the extension name written into the host buffer.
    pub name_len: usize,
    pub version: i32,
}

/// Capabilities advertised at registration.
pub fn registration_flags() -> ExtensionFlags {
    ExtensionFlags::IMAGE | ExtensionFlags::ANIMATION | ExtensionFlags::CHARSET_UTF8
}

/// Creates a module context for the built-in catalog.
pub fn register(
    config: ModuleConfig,
    name_buf: &mut [u8],
) -> ExtResult<(Registration, ExtensionModule)> {
    register_with_catalog(config, InitializerCatalog::builtin(), name_buf)
}

/// Creates a module context serving `catalog`.
pub fn register_with_catalog(
    config: ModuleConfig,
    catalog: InitializerCatalog,
    name_buf: &mut [u8],
) -> ExtResult<(Registration, ExtensionModule)> {
    let name_len = copy_bounded(EXTENSION_NAME.as_bytes(), name_buf)?;
    let logging = init_from_config(&config);

    let registration = Registration {
        magic: HANDSHAKE_MAGIC,
        flags: registration_flags(),
        name_len,
        version: EXTENSION_VERSION,
    };
    match logging {
        Ok(enabled) => info!(
            "event=extension_register module=extension status=ok name={EXTENSION_NAME} version={EXTENSION_VERSION} initializers={} file_logging={enabled}",
            catalog.len()
        ),
        Err(reason) => warn!(
            "event=extension_register module=extension status=degraded reason={reason}"
        ),
    }
    Ok((registration, ExtensionModule::new(config, catalog)))
}

/// Checks the magic a host echoes back against ours.
pub fn verify_handshake(magic: i32) -> ExtResult<()> {
    if magic == HANDSHAKE_MAGIC {
        Ok(())
    } else {
        Err(ExtError::HandshakeMismatch {
            expected: HANDSHAKE_MAGIC,
            actual: magic,
        })
    }
}

/// Tears down `module`, freeing any resources the host leaked.
pub fn unregister(mut module: ExtensionModule) -> ResourceStats {
    let before = module.stats();
    let stats = module.shutdown();
    if before.is_balanced() {
        info!("event=extension_unregister module=extension status=ok");
    } else {
        warn!(
            "event=extension_unregister module=extension status=leaked parse_contexts={} objects={} buffers={}",
            before.live_parse_contexts(),
            before.live_objects(),
            before.outstanding_buffers()
        );
    }
    stats
}
