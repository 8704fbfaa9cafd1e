//! Module context: one loaded extension instance and every live resource.
//!
//! # Responsibility
//! - Own the catalog, parse contexts, objects and pixel buffers of one
//!   registration.
//! - Implement each host protocol operation on typed tokens, leaving raw
//!   pointer handling to the export layer.
//!
//! # Invariants
//! - Every resource lives in exactly one arena and is counted in
//!   [`ResourceStats`]; destroy and release paths always update the ledger.
//! - Tokens are validated before use; unknown or stale tokens fail cleanly.

use crate::abi::{ArgTypes, Encoding, ObjectKind, PixelFormat, PrepareHints, UserCommand};
use crate::arena::{Arena, Handle};
use crate::config::ModuleConfig;
use crate::error::{ExtError, ExtResult, Resource};
use crate::exchange::PixelExchange;
use crate::extension::catalog::{InitializerCatalog, InitializerInfo};
use crate::object::{ObjectRecord, Prepared};
use crate::parser::{ArgValue, ParseContext, ParseLimits};
use crate::render::{FrameRequest, HookOutcome, SourceFrame, WorkingSet};
use crate::stats::ResourceStats;
use crate::text::{encoded_len, write_encoded};
use log::{debug, info, warn};

macro_rules! token_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(usize);

        impl $name {
            /// Wraps a raw value received from the host. Validity is checked
            /// when the token is used.
            pub fn from_raw(raw: usize) -> Self {
                Self(raw)
            }

            pub fn as_raw(self) -> usize {
                self.0
            }
        }

        impl From<Handle> for $name {
            fn from(handle: Handle) -> Self {
                Self(handle.to_token())
            }
        }
    };
}

token_type!(
    /// Opaque reference to an in-flight initializer parse.
    ParseToken
);
token_type!(
    /// Opaque reference to a live object.
    ObjectToken
);
token_type!(
    /// Opaque reference to an outstanding pixel buffer.
    BufferToken
);

/// Everything one registration owns.
pub struct ExtensionModule {
    config: ModuleConfig,
    limits: ParseLimits,
    catalog: InitializerCatalog,
    parses: Arena<ParseContext>,
    objects: Arena<ObjectRecord>,
    exchange: PixelExchange,
    stats: ResourceStats,
}

impl ExtensionModule {
    pub fn new(config: ModuleConfig, catalog: InitializerCatalog) -> Self {
        let limits = ParseLimits::from(&config);
        Self {
            config,
            limits,
            catalog,
            parses: Arena::new(Resource::ParseContext),
            objects: Arena::new(Resource::Object),
            exchange: PixelExchange::new(),
            stats: ResourceStats::default(),
        }
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn catalog(&self) -> &InitializerCatalog {
        &self.catalog
    }

    /// Snapshot of the allocation ledger.
    pub fn stats(&self) -> ResourceStats {
        self.stats
    }

    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    // ---- initializer enumeration and parsing ----

    pub fn enumerate_initializer(
        &self,
        index: i32,
        name_buf: &mut [u8],
    ) -> ExtResult<Option<InitializerInfo>> {
        self.catalog.describe(index, name_buf)
    }

    /// Opens a parse context and returns it with the first expected kinds.
    pub fn begin_parse(
        &mut self,
        kind: ObjectKind,
        index: i32,
        keyword: &[u8],
    ) -> ExtResult<(ParseToken, ArgTypes)> {
        let initializer = self.catalog.lookup(index, keyword)?;
        let descriptor = self
            .catalog
            .get(initializer)
            .ok_or_else(|| ExtError::UnknownInitializer {
                index,
                keyword: String::from_utf8_lossy(keyword).into_owned(),
            })?;
        let context = ParseContext::begin(initializer, descriptor, kind)?;
        let expected = context.expected();
        let handle = self.parses.insert(context)?;
        self.stats.parse_opened();
        debug!(
            "event=parse_begin module=parser status=ok keyword={} kind={kind} expected={expected}",
            descriptor.keyword
        );
        Ok((handle.into(), expected))
    }

    /// Offers one decoded argument to a parse context.
    pub fn apply_argument(
        &mut self,
        token: ParseToken,
        arg_index: i32,
        value: ArgValue,
    ) -> ExtResult<ArgTypes> {
        let limits = self.limits;
        let context = self.parse_mut(token)?;
        let position = usize::try_from(arg_index).unwrap_or(usize::MAX);
        let result = context.apply(position, value, &limits);
        if let Err(err) = &result {
            debug!("event=parse_argument module=parser status=rejected reason={err}");
        }
        result
    }

    /// Records an argument whose raw type tag is not a known kind.
    pub fn reject_argument_type(
        &mut self,
        token: ParseToken,
        arg_index: i32,
        raw_type: i32,
    ) -> ExtResult<ArgTypes> {
        let context = self.parse_mut(token)?;
        context.reject_type(usize::try_from(arg_index).unwrap_or(usize::MAX), raw_type)
    }

    /// Closes a parse context. On host-reported success the accepted
    /// arguments build a new object; on failure nothing is created.
    pub fn finish_parse(
        &mut self,
        token: ParseToken,
        parse_ok: bool,
        kind: ObjectKind,
        name: &str,
    ) -> ExtResult<Option<ObjectToken>> {
        let context = self.take_parse(token)?;
        if !parse_ok {
            debug!(
                "event=parse_finish module=parser status=discarded keyword={}",
                context.keyword()
            );
            return Ok(None);
        }

        let descriptor = self.catalog.get(context.initializer()).ok_or_else(|| {
            ExtError::UnknownInitializer {
                index: i32::try_from(context.initializer()).unwrap_or(i32::MAX),
                keyword: context.keyword().to_string(),
            }
        })?;
        if !descriptor.can_produce(kind) {
            return Err(ExtError::UnsupportedKind {
                keyword: descriptor.keyword.clone(),
                kind,
            });
        }
        if !context.is_complete() {
            return Err(ExtError::IncompleteArguments {
                keyword: descriptor.keyword.clone(),
                expected: context.expected(),
            });
        }

        let source = (descriptor.factory)(context.args(), kind)?;
        let record = ObjectRecord::new(name, context.keyword(), kind, source);
        let handle = self.objects.insert(record)?;
        self.stats.object_created();
        info!(
            "event=object_create module=object status=ok keyword={} kind={kind} name={name}",
            context.keyword()
        );
        Ok(Some(handle.into()))
    }

    /// Drops a parse context without creating anything.
    pub fn discard_parse(&mut self, token: ParseToken) -> ExtResult<()> {
        self.take_parse(token).map(|_| ())
    }

    /// Length of the recorded diagnostic in `encoding` units.
    pub fn parse_error_len(&self, token: ParseToken, encoding: Encoding) -> Option<usize> {
        let diagnostic = self.parse(token).ok()?.diagnostic()?;
        Some(encoded_len(diagnostic, encoding))
    }

    /// Writes the recorded diagnostic and returns the units written.
    pub fn write_parse_error(
        &self,
        token: ParseToken,
        encoding: Encoding,
        dst: &mut [u8],
    ) -> ExtResult<Option<usize>> {
        let Some(diagnostic) = self.parse(token).ok().and_then(|c| c.diagnostic()) else {
            return Ok(None);
        };
        write_encoded(diagnostic, encoding, dst).map(Some)
    }

    // ---- object lifecycle ----

    pub fn is_animated(&self, token: ObjectToken) -> ExtResult<bool> {
        Ok(self.object(token)?.1.is_animated())
    }

    pub fn prepare(&mut self, token: ObjectToken, hints: PrepareHints) -> ExtResult<Prepared> {
        self.object_mut(token)?.prepare(hints)
    }

    pub fn resize_query(&mut self, token: ObjectToken) -> ExtResult<WorkingSet> {
        self.object_mut(token)?.resize_query()
    }

    pub fn load_file(&mut self, token: ObjectToken, path: &str) -> ExtResult<()> {
        self.object_mut(token)?.load_file(path)
    }

    pub fn unload_file(&mut self, token: ObjectToken) -> ExtResult<()> {
        self.object_mut(token)?.unload_file()
    }

    pub fn set_expression_value(
        &mut self,
        token: ObjectToken,
        index: i32,
        value: &ArgValue,
    ) -> ExtResult<HookOutcome> {
        Ok(self.object_mut(token)?.set_expression_value(index, value))
    }

    pub fn offer_source_pixels(
        &mut self,
        token: ObjectToken,
        index: i32,
        width: u32,
        height: u32,
    ) -> ExtResult<Option<PixelFormat>> {
        Ok(self.object_mut(token)?.offer_source(index, width, height))
    }

    pub fn post_source_pixels(
        &mut self,
        token: ObjectToken,
        index: i32,
        frame: SourceFrame<'_>,
    ) -> ExtResult<HookOutcome> {
        Ok(self.object_mut(token)?.accept_source_pixels(index, frame))
    }

    pub fn user_command(
        &mut self,
        token: ObjectToken,
        command: UserCommand,
    ) -> ExtResult<HookOutcome> {
        Ok(self.object_mut(token)?.user_command(command))
    }

    /// Destroys an object and reclaims any buffers the host still holds.
    pub fn destroy(&mut self, token: ObjectToken) -> ExtResult<()> {
        let handle = self.objects.resolve(token.as_raw()).inspect_err(|_| {
            warn!(
                "event=object_destroy module=object status=rejected token={:#x}",
                token.as_raw()
            );
        })?;
        let reclaimed = self.exchange.reclaim_owner(handle, &mut self.stats);
        let Some(record) = self.objects.remove(handle) else {
            return Err(ExtError::UnknownHandle {
                resource: Resource::Object,
                token: token.as_raw(),
            });
        };
        self.stats.object_destroyed();
        if reclaimed > 0 {
            warn!(
                "event=object_destroy module=object status=reclaimed name={} buffers={reclaimed}",
                record.name()
            );
        }
        info!(
            "event=object_destroy module=object status=ok name={}",
            record.name()
        );
        Ok(())
    }

    // ---- pixel exchange ----

    pub fn fetch(&mut self, token: ObjectToken, request: &FrameRequest) -> ExtResult<BufferToken> {
        let handle = self.objects.resolve(token.as_raw())?;
        let object = self.objects.get(handle).ok_or(ExtError::UnknownHandle {
            resource: Resource::Object,
            token: token.as_raw(),
        })?;
        let buffer = self
            .exchange
            .fetch(handle, object, request, &mut self.stats)
            .inspect_err(|err| {
                debug!("event=pixels_fetch module=exchange status=rejected reason={err}");
            })?;
        Ok(buffer.into())
    }

    /// Bytes of a buffer previously fetched for `object`.
    pub fn pixels(&self, object: ObjectToken, buffer: BufferToken) -> ExtResult<&[u8]> {
        let (handle, _) = self.object(object)?;
        self.exchange.pixels(handle, buffer.as_raw())
    }

    pub fn release(&mut self, object: ObjectToken, buffer: BufferToken) -> ExtResult<()> {
        let handle = self.objects.resolve(object.as_raw())?;
        self.exchange
            .release(handle, buffer.as_raw(), &mut self.stats)
    }

    /// Frees everything still alive and returns the final ledger.
    pub fn shutdown(&mut self) -> ResourceStats {
        let buffers = self.exchange.reclaim_all(&mut self.stats);
        let objects = self.objects.drain().len();
        for _ in 0..objects {
            self.stats.object_destroyed();
        }
        let parses = self.parses.drain().len();
        for _ in 0..parses {
            self.stats.parse_closed();
        }
        if buffers + objects + parses > 0 {
            warn!(
                "event=module_shutdown module=extension status=reclaimed buffers={buffers} objects={objects} parse_contexts={parses}"
            );
        }
        self.stats
    }

    fn parse(&self, token: ParseToken) -> ExtResult<&ParseContext> {
        let handle = self.parses.resolve(token.as_raw())?;
        self.parses.get(handle).ok_or(ExtError::UnknownHandle {
            resource: Resource::ParseContext,
            token: token.as_raw(),
        })
    }

    fn parse_mut(&mut self, token: ParseToken) -> ExtResult<&mut ParseContext> {
        let handle = self.parses.resolve(token.as_raw())?;
        self.parses.get_mut(handle).ok_or(ExtError::UnknownHandle {
            resource: Resource::ParseContext,
            token: token.as_raw(),
        })
    }

    fn take_parse(&mut self, token: ParseToken) -> ExtResult<ParseContext> {
        let handle = self.parses.resolve(token.as_raw())?;
        let context = self.parses.remove(handle).ok_or(ExtError::UnknownHandle {
            resource: Resource::ParseContext,
            token: token.as_raw(),
        })?;
        self.stats.parse_closed();
        Ok(context)
    }

    fn object(&self, token: ObjectToken) -> ExtResult<(Handle, &ObjectRecord)> {
        let handle = self.objects.resolve(token.as_raw())?;
        self.objects
            .get(handle)
            .map(|object| (handle, object))
            .ok_or(ExtError::UnknownHandle {
                resource: Resource::Object,
                token: token.as_raw(),
            })
    }

    fn object_mut(&mut self, token: ObjectToken) -> ExtResult<&mut ObjectRecord> {
        let handle = self.objects.resolve(token.as_raw())?;
        self.objects.get_mut(handle).ok_or(ExtError::UnknownHandle {
            resource: Resource::Object,
            token: token.as_raw(),
        })
    }
}

impl Drop for ExtensionModule {
    fn drop(&mut self) {
        if !self.stats.is_balanced() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ExtensionModule, ObjectToken, ParseToken};
    use crate::abi::{ArgTypes, Encoding, ObjectKind, PrepareHints};
    use crate::config::ModuleConfig;
    use crate::error::ExtError;
    use crate::extension::catalog::InitializerCatalog;
    use crate::parser::ArgValue;

    fn module() -> ExtensionModule {
        ExtensionModule::new(ModuleConfig::default(), InitializerCatalog::builtin())
    }

    #[test]
    fn finish_with_failed_parse_creates_nothing() {
        let mut module = module();
        let (token, _) = module
            .begin_parse(ObjectKind::Image, 1, b"example_sized")
            .expect("begin");
        module
            .apply_argument(token, 0, ArgValue::String("wide".to_string()))
            .expect_err("string rejected");
        assert!(module.parse_error_len(token, Encoding::Utf8).expect("len") > 0);

        let created = module
            .finish_parse(token, false, ObjectKind::Image, "obj")
            .expect("finish");
        assert_eq!(created, None);
        assert!(module.stats().is_balanced());
        assert_eq!(module.parse_error_len(token, Encoding::Utf8), None);
    }

    #[test]
    fn finish_before_grammar_complete_is_unexpected() {
        let mut module = module();
        let (token, expected) = module
            .begin_parse(ObjectKind::Animation, 1, b"example_sized")
            .expect("begin");
        assert_eq!(expected, ArgTypes::INT);
        module
            .apply_argument(token, 0, ArgValue::Int(32))
            .expect("width");
        let err = module
            .finish_parse(token, true, ObjectKind::Animation, "obj")
            .expect_err("height missing");
        assert!(matches!(err, ExtError::IncompleteArguments { .. }));
        assert_eq!(module.stats().live_parse_contexts(), 0);
    }

    #[test]
    fn diagnostics_are_absent_for_clean_parses() {
        let mut module = module();
        let (token, _) = module
            .begin_parse(ObjectKind::Image, 0, b"example")
            .expect("begin");
        assert_eq!(module.parse_error_len(token, Encoding::Utf16), None);
        let mut dst = [0u8; 8];
        assert_eq!(
            module
                .write_parse_error(token, Encoding::Utf8, &mut dst)
                .expect("write"),
            None
        );
        module.discard_parse(token).expect("discard");
        assert!(module.discard_parse(token).is_err());
    }

    #[test]
    fn shutdown_reclaims_everything() {
        let mut module = module();
        module
            .begin_parse(ObjectKind::Image, 0, b"example")
            .expect("dangling parse");
        let (token, _) = module
            .begin_parse(ObjectKind::Image, 0, b"example")
            .expect("begin");
        let object = module
            .finish_parse(token, true, ObjectKind::Image, "obj")
            .expect("finish")
            .expect("object");
        module.prepare(object, PrepareHints::NONE).expect("prepare");

        let stats = module.shutdown();
        assert!(stats.is_balanced(), "{stats:?}");
        assert!(module.is_animated(object).is_err());
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        let mut module = module();
        assert!(module.destroy(ObjectToken::from_raw(0)).is_err());
        assert!(module
            .apply_argument(ParseToken::from_raw(0xDEAD), 0, ArgValue::Int(1))
            .is_err());
        assert!(module
            .prepare(ObjectToken::from_raw(usize::MAX), PrepareHints::NONE)
            .is_err());
    }
}
