//! Type-directed initializer parsing.
//!
//! # Responsibility
//! - Track one initializer invocation between host calls: which argument
//!   kinds are expected next and which values were accepted so far.
//! - Record the first grammar failure as a diagnostic the host can fetch.
//!
//! # Invariants
//! - Control returns to the host after every argument; the context is the
//!   only place parse state lives.
//! - After the first rejection the context accepts nothing and expects
//!   `ArgTypes::NONE`.
//! - Arguments are accepted strictly in index order.

mod args;

pub use args::{ArgValue, ParsedArgs};

use crate::abi::{ArgTypes, ObjectKind};
use crate::config::ModuleConfig;
use crate::error::{ExtError, ExtResult};
use crate::extension::catalog::{ArgSpec, InitializerDescriptor};

/// Bounds applied while checking argument values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    pub max_dimension: u32,
}

impl From<&ModuleConfig> for ParseLimits {
    fn from(config: &ModuleConfig) -> Self {
        Self {
            max_dimension: config.max_dimension,
        }
    }
}

/// State of one initializer parse attempt.
#[derive(Debug, Clone)]
pub struct ParseContext {
    initializer: usize,
    keyword: String,
    kind: ObjectKind,
    schema: &'static [ArgSpec],
    args: ParsedArgs,
    expected: ArgTypes,
    diagnostic: Option<String>,
}

impl ParseContext {
    /// Starts parsing `descriptor` (catalog entry `initializer`) for `kind`.
    pub fn begin(
        initializer: usize,
        descriptor: &InitializerDescriptor,
        kind: ObjectKind,
    ) -> ExtResult<Self> {
        if !descriptor.can_produce(kind) {
            return Err(ExtError::UnsupportedKind {
                keyword: descriptor.keyword.clone(),
                kind,
            });
        }
        let mut context = Self {
            initializer,
            keyword: descriptor.keyword.clone(),
            kind,
            schema: descriptor.schema,
            args: ParsedArgs::default(),
            expected: ArgTypes::NONE,
            diagnostic: None,
        };
        context.expected = context.next_expected();
        Ok(context)
    }

    pub fn initializer(&self) -> usize {
        self.initializer
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Argument kinds acceptable next; `NONE` means the list must end.
    pub fn expected(&self) -> ArgTypes {
        self.expected
    }

    pub fn args(&self) -> &ParsedArgs {
        &self.args
    }

    /// First grammar failure, if any.
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    pub fn has_failed(&self) -> bool {
        self.diagnostic.is_some()
    }

    /// True when every positional argument has been accepted.
    pub fn is_complete(&self) -> bool {
        !self.has_failed() && self.args.len() == self.schema.len()
    }

    /// Offers argument `arg_index` and returns what is expected next.
    pub fn apply(
        &mut self,
        arg_index: usize,
        value: ArgValue,
        limits: &ParseLimits,
    ) -> ExtResult<ArgTypes> {
        if let Some(previous) = &self.diagnostic {
            return Err(ExtError::Syntax(format!(
                "initializer `{}` already failed: {previous}",
                self.keyword
            )));
        }

        let schema = self.schema;
        let position = self.args.len();
        let Some(arg) = schema.get(position) else {
            return self.reject(match schema.len() {
                0 => format!("initializer `{}` takes no arguments", self.keyword),
                count => format!(
                    "initializer `{}` takes {count} argument(s), got another one",
                    self.keyword
                ),
            });
        };
        if arg_index != position {
            return self.reject(format!(
                "argument {arg_index} arrived out of order; expected argument {position}"
            ));
        }
        if !self.expected.contains(value.arg_type().as_set()) {
            return self.reject(format!(
                "argument {position} (`{}`) must be {}, got {}",
                arg.name,
                self.expected,
                value.arg_type().as_str()
            ));
        }
        if let Some(check) = arg.check {
            if let Err(reason) = check(&value, limits) {
                return self.reject(format!("argument {position} (`{}`): {reason}", arg.name));
            }
        }

        self.args.push(value);
        self.expected = self.next_expected();
        Ok(self.expected)
    }

    /// Records an argument whose raw type tag could not be decoded.
    pub fn reject_type(&mut self, arg_index: usize, raw_type: i32) -> ExtResult<ArgTypes> {
        if self.has_failed() {
            return Err(ExtError::Syntax(format!(
                "initializer `{}` already failed",
                self.keyword
            )));
        }
        self.reject(format!(
            "argument {arg_index} has unknown type tag {raw_type:#x}; expected {}",
            self.expected
        ))
    }

    /// Consumes the context, yielding the accepted arguments.
    pub fn into_args(self) -> ParsedArgs {
        self.args
    }

    fn next_expected(&self) -> ArgTypes {
        self.schema
            .get(self.args.len())
            .map(|arg| arg.arg_type.as_set())
            .unwrap_or(ArgTypes::NONE)
    }

    fn reject(&mut self, message: String) -> ExtResult<ArgTypes> {
        self.expected = ArgTypes::NONE;
        self.diagnostic = Some(message.clone());
        Err(ExtError::Syntax(message))
    }
}
