//! pw-query runtime - error taxonomy and the realm connection seam
//!
//! This crate provides the low-level contract between the query layer and
//! the session that talks to the remote JavaScript runtime:
//!
//! - **Errors**: One [`Error`] enum shared by every crate in the workspace
//! - **Connection**: The [`RealmConnection`] trait, scoped by world
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │     pwq     │  Worlds, handles, query handlers
//! └──────┬──────┘
//!        │ calls RealmConnection
//! ┌──────▼──────┐
//! │ pwq-runtime │  This crate
//! └──────┬──────┘
//!        │ implemented by
//! ┌──────▼──────┐
//! │   session   │  CDP / BiDi / test doubles
//! └─────────────┘
//! ```
//!
//! # Decoupling via RealmConnection
//!
//! The query layer never sees the transport. Anything that can evaluate a
//! function in a world, release references and map nodes between worlds can
//! back it, which keeps the handle lifecycle testable without a browser.

pub mod connection;
pub mod error;

pub use connection::{BoxFuture, RawBindingFn, RealmConnection};
pub use error::{Error, Result};
