//! C entry points of the `example` extension.
//!
//! # Responsibility
//! - Export the fixed `shadron_*` symbol set the host resolves at load time.
//! - Confine every raw pointer to this crate; `shadex_core` stays safe Rust.
//!
//! # See also
//! - `shadex_core::module` for the protocol semantics behind each symbol.

pub mod api;
mod boundary;

pub use boundary::StringArg;
