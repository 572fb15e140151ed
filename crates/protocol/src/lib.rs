//! Wire types for remote handles and realm evaluation.
//!
//! This crate contains the serde-serializable shapes exchanged with the
//! execution-context collaborator: remote values, argument encodings and the
//! option structs accepted by the query layer.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond serialization/deserialization and
//!   value conversion
//! - **Transport agnostic**: The collaborator decides how they travel
//! - **Stable**: Changes only when the remote contract changes
//!
//! Higher-level handle and world APIs are built on top of these types in `pwq`.

pub mod options;
pub mod types;
pub mod value;

pub use options::*;
pub use types::*;
pub use value::{ValueError, from_protocol_value, to_protocol_value};
