//! Extension surface: the initializer catalog and the registration handshake.

pub mod catalog;
pub mod registry;
