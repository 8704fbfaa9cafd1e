//! Object lifecycle and capability-gated hooks.
//!
//! # Responsibility
//! - Hold one object's identity, kind, pixel source and lifecycle state.
//! - Fix the working set and feature flags at prepare time and gate every
//!   optional hook on those flags.
//!
//! # Invariants
//! - `kind` never changes after creation.
//! - `prepare` succeeds at most once; the working set only changes afterwards
//!   through `resize_query` on objects that advertised `DYNAMIC_SIZE`.
//! - File hooks without `FILE_INPUT` are contract violations (error); the
//!   other hooks without their flag are ignored.

use crate::abi::{ObjectFlags, ObjectKind, PixelFormat, PrepareHints, UserCommand};
use crate::error::{ExtError, ExtResult};
use crate::parser::ArgValue;
use crate::render::{FrameRequest, HookOutcome, PixelSource, SourceFrame, WorkingSet};
use log::debug;

/// Answer of a successful `prepare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prepared {
    pub flags: ObjectFlags,
    pub working_set: WorkingSet,
}

/// Lifecycle position of a live object. Destroyed objects leave the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Prepared(Prepared),
}

/// One host-visible object.
pub struct ObjectRecord {
    name: String,
    keyword: String,
    kind: ObjectKind,
    source: Box<dyn PixelSource>,
    lifecycle: Lifecycle,
}

impl ObjectRecord {
    pub fn new(
        name: impl Into<String>,
        keyword: impl Into<String>,
        kind: ObjectKind,
        source: Box<dyn PixelSource>,
    ) -> Self {
        Self {
            name: name.into(),
            keyword: keyword.into(),
            kind,
            source,
            lifecycle: Lifecycle::Created,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Initializer keyword that produced this object.
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn is_animated(&self) -> bool {
        self.kind.is_animated()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Flags captured by `prepare`; empty before.
    pub fn features(&self) -> ObjectFlags {
        match self.lifecycle {
            Lifecycle::Prepared(prepared) => prepared.flags,
            Lifecycle::Created => ObjectFlags::NONE,
        }
    }

    /// Declared working set. Fails before `prepare`.
    pub fn working_set(&self, operation: &'static str) -> ExtResult<WorkingSet> {
        match self.lifecycle {
            Lifecycle::Prepared(prepared) => Ok(prepared.working_set),
            Lifecycle::Created => Err(ExtError::InvalidState {
                operation,
                reason: "object has not been prepared",
            }),
        }
    }

    /// Fixes flags and working set. Legal exactly once.
    pub fn prepare(&mut self, hints: PrepareHints) -> ExtResult<Prepared> {
        if let Lifecycle::Prepared(_) = self.lifecycle {
            return Err(ExtError::InvalidState {
                operation: "prepare",
                reason: "object is already prepared",
            });
        }

        let working_set = checked_working_set(self.source.working_set())?;
        let prepared = Prepared {
            flags: self.source.features(),
            working_set,
        };
        self.lifecycle = Lifecycle::Prepared(prepared);
        debug!(
            "event=object_prepare module=object status=ok name={} hints={:#x} flags={:#x} width={} height={}",
            self.name,
            hints.bits(),
            prepared.flags.bits(),
            working_set.width,
            working_set.height
        );
        Ok(prepared)
    }

    /// Re-reads the working set if the object advertised dynamic sizing;
    /// otherwise answers the declared one unchanged.
    pub fn resize_query(&mut self) -> ExtResult<WorkingSet> {
        let Lifecycle::Prepared(prepared) = self.lifecycle else {
            return Err(ExtError::InvalidState {
                operation: "object_size",
                reason: "object has not been prepared",
            });
        };
        if !prepared.flags.contains(ObjectFlags::DYNAMIC_SIZE) {
            return Ok(prepared.working_set);
        }

        let working_set = checked_working_set(self.source.resized())?;
        self.lifecycle = Lifecycle::Prepared(Prepared {
            working_set,
            ..prepared
        });
        Ok(working_set)
    }

    pub fn load_file(&mut self, path: &str) -> ExtResult<()> {
        self.require(ObjectFlags::FILE_INPUT, "load_file", "FILE_INPUT")?;
        self.source.load_file(path)
    }

    pub fn unload_file(&mut self) -> ExtResult<()> {
        self.require(ObjectFlags::FILE_INPUT, "unload_file", "FILE_INPUT")?;
        self.source.unload_file()
    }

    pub fn set_expression_value(&mut self, index: i32, value: &ArgValue) -> HookOutcome {
        if !self.features().contains(ObjectFlags::EXPRESSION_INPUT) {
            return self.ignored("set_expression_value");
        }
        self.source.set_expression_value(index, value)
    }

    /// Format wanted for an offered source, `None` when declined.
    pub fn offer_source(&mut self, index: i32, width: u32, height: u32) -> Option<PixelFormat> {
        if !self.features().contains(ObjectFlags::SOURCE_INPUT) {
            self.ignored("offer_source_pixels");
            return None;
        }
        self.source.offer_source(index, width, height)
    }

    pub fn accept_source_pixels(&mut self, index: i32, frame: SourceFrame<'_>) -> HookOutcome {
        if !self.features().contains(ObjectFlags::SOURCE_INPUT) {
            return self.ignored("post_source_pixels");
        }
        self.source.accept_source_pixels(index, frame)
    }

    pub fn user_command(&mut self, command: UserCommand) -> HookOutcome {
        if !self.features().contains(ObjectFlags::USER_COMMANDS) {
            return self.ignored("user_command");
        }
        self.source.user_command(command)
    }

    pub(crate) fn render(&self, request: &FrameRequest, pixels: &mut [u8]) {
        self.source.render(request, pixels);
    }

    fn require(
        &self,
        flag: ObjectFlags,
        operation: &'static str,
        capability: &'static str,
    ) -> ExtResult<()> {
        if self.features().contains(flag) {
            Ok(())
        } else {
            Err(ExtError::CapabilityDenied {
                operation,
                capability,
            })
        }
    }

    fn ignored(&self, operation: &str) -> HookOutcome {
        debug!(
            "event={operation} module=object status=ignored name={} reason=capability_not_advertised",
            self.name
        );
        HookOutcome::Ignored
    }
}

fn checked_working_set(working_set: WorkingSet) -> ExtResult<WorkingSet> {
    if working_set.width == 0 || working_set.height == 0 {
        return Err(ExtError::Source(format!(
            "working set {}x{} has no pixels",
            working_set.width, working_set.height
        )));
    }
    if working_set.frame_len().is_none() {
        return Err(ExtError::Source(format!(
            "working set {}x{} overflows the address space",
            working_set.width, working_set.height
        )));
    }
    Ok(working_set)
}

#[cfg(test)]
mod tests {
    use super::{Lifecycle, ObjectRecord};
    use crate::abi::{ObjectFlags, ObjectKind, PixelFormat, PrepareHints, UserCommand};
    use crate::error::ExtError;
    use crate::parser::ArgValue;
    use crate::render::{
        ExampleSource, FrameRequest, HookOutcome, PixelSource, SourceFrame, WorkingSet,
    };

    fn example(kind: ObjectKind) -> ObjectRecord {
        ObjectRecord::new(
            "obj",
            "example",
            kind,
            Box::new(ExampleSource::new(kind, 640, 480)),
        )
    }

    /// Source that advertises every feature and grows on each resize.
    struct Growing {
        width: u32,
        restarts: u32,
    }

    impl PixelSource for Growing {
        fn working_set(&self) -> WorkingSet {
            WorkingSet::new(self.width, 4, PixelFormat::RgbaByte)
        }

        fn features(&self) -> ObjectFlags {
            ObjectFlags::DYNAMIC_SIZE
                | ObjectFlags::FILE_INPUT
                | ObjectFlags::EXPRESSION_INPUT
                | ObjectFlags::SOURCE_INPUT
                | ObjectFlags::USER_COMMANDS
        }

        fn render(&self, _request: &FrameRequest, pixels: &mut [u8]) {
            pixels.fill(0x7F);
        }

        fn resized(&mut self) -> WorkingSet {
            self.width += 1;
            self.working_set()
        }

        fn load_file(&mut self, _path: &str) -> crate::error::ExtResult<()> {
            Ok(())
        }

        fn user_command(&mut self, command: UserCommand) -> HookOutcome {
            if command == UserCommand::Restart {
                self.restarts += 1;
                HookOutcome::Applied
            } else {
                HookOutcome::Ignored
            }
        }
    }

    #[test]
    fn prepare_happens_once_and_fixes_working_set() {
        let mut object = example(ObjectKind::Image);
        assert_eq!(object.lifecycle(), Lifecycle::Created);
        assert!(object.working_set("fetch_pixels").is_err());

        let prepared = object.prepare(PrepareHints::HARD_RESET).expect("prepare");
        assert_eq!(prepared.flags, ObjectFlags::NONE);
        assert_eq!(
            prepared.working_set,
            WorkingSet::new(640, 480, PixelFormat::RgbaByte)
        );

        let err = object.prepare(PrepareHints::NONE).expect_err("second prepare");
        assert!(matches!(err, ExtError::InvalidState { .. }));
    }

    #[test]
    fn resize_without_dynamic_size_answers_literally() {
        let mut object = example(ObjectKind::Animation);
        assert!(object.resize_query().is_err());
        object.prepare(PrepareHints::NONE).expect("prepare");
        assert_eq!(
            object.resize_query().expect("size"),
            WorkingSet::new(640, 480, PixelFormat::RgbaByte)
        );
    }

    #[test]
    fn resize_with_dynamic_size_updates_working_set() {
        let mut object = ObjectRecord::new(
            "grow",
            "growing",
            ObjectKind::Animation,
            Box::new(Growing {
                width: 2,
                restarts: 0,
            }),
        );
        object.prepare(PrepareHints::NONE).expect("prepare");
        assert_eq!(object.resize_query().expect("resize").width, 3);
        assert_eq!(object.working_set("fetch_pixels").expect("declared").width, 3);
    }

    #[test]
    fn unadvertised_hooks_split_into_errors_and_ignores() {
        let mut object = example(ObjectKind::Image);
        object.prepare(PrepareHints::NONE).expect("prepare");

        assert!(matches!(
            object.load_file("a.png"),
            Err(ExtError::CapabilityDenied { .. })
        ));
        assert!(matches!(
            object.unload_file(),
            Err(ExtError::CapabilityDenied { .. })
        ));
        assert_eq!(
            object.set_expression_value(0, &ArgValue::Float(1.0)),
            HookOutcome::Ignored
        );
        assert_eq!(object.offer_source(0, 8, 8), None);
        let frame = SourceFrame {
            plane: 0,
            width: 1,
            height: 1,
            format: PixelFormat::RgbaByte,
            pixels: &[0, 0, 0, 0],
        };
        assert_eq!(object.accept_source_pixels(0, frame), HookOutcome::Ignored);
        assert_eq!(
            object.user_command(UserCommand::Restart),
            HookOutcome::Ignored
        );
    }

    #[test]
    fn advertised_hooks_reach_the_source() {
        let mut object = ObjectRecord::new(
            "grow",
            "growing",
            ObjectKind::Animation,
            Box::new(Growing {
                width: 2,
                restarts: 0,
            }),
        );
        assert!(
            object.load_file("before.png").is_err(),
            "hooks stay closed before prepare"
        );
        object.prepare(PrepareHints::NONE).expect("prepare");

        object.load_file("clip.png").expect("file input advertised");
        assert_eq!(
            object.user_command(UserCommand::Restart),
            HookOutcome::Applied
        );
        // Default hook implementation still answers for the source.
        assert!(object.unload_file().is_err());
        assert_eq!(
            object.set_expression_value(1, &ArgValue::Int(2)),
            HookOutcome::Ignored
        );
    }

    #[test]
    fn kind_is_fixed_at_creation() {
        let object = example(ObjectKind::Animation);
        assert!(object.is_animated());
        assert_eq!(object.kind(), ObjectKind::Animation);
        assert_eq!(object.keyword(), "example");
    }
}
