//! The realm connection seam.
//!
//! [`RealmConnection`] is everything the query layer needs from the session
//! that carries requests to the remote runtime. Implementations own the wire
//! encoding; this crate only fixes the contract.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use pwq_protocol::{BackendNodeId, PageId, RemoteObjectId, RemoteValue, ScriptId, SerializedArgument, WorldId};

use crate::error::Result;

/// Boxed, sendable future used by the object-safe traits of this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Host callback invoked when remote code calls a global binding.
///
/// Arguments arrive as remote values owned by the callback. A returned
/// [`SerializedArgument::Handle`] transfers ownership of that reference to the
/// connection, which releases it once the result has been delivered.
pub type RawBindingFn =
	Arc<dyn Fn(Vec<RemoteValue>) -> BoxFuture<'static, Result<SerializedArgument>> + Send + Sync>;

/// Connection to the remote runtime, scoped by world.
///
/// Every method may fail with a stale-context error once navigation tore the
/// world down (see [`Error::is_stale_world`](crate::Error::is_stale_world)).
pub trait RealmConnection: Send + Sync {
	/// Calls `function` (JavaScript source of a function) with `args` in `world`.
	///
	/// With `return_by_value` the result is returned inline; otherwise objects
	/// come back as references that must eventually be released.
	fn evaluate<'a>(
		&'a self,
		world: &'a WorldId,
		function: &'a str,
		args: Vec<SerializedArgument>,
		return_by_value: bool,
	) -> BoxFuture<'a, Result<RemoteValue>>;

	/// Installs a global function `name` in `world` that calls back into `callback`.
	///
	/// Must be idempotent for a given world and name.
	fn create_binding<'a>(
		&'a self,
		world: &'a WorldId,
		name: &'a str,
		callback: RawBindingFn,
	) -> BoxFuture<'a, Result<()>>;

	/// Releases a remote reference. Unknown references are not an error.
	fn release_object<'a>(&'a self, world: &'a WorldId, object: &'a RemoteObjectId) -> BoxFuture<'a, Result<()>>;

	/// Returns the world-independent identity of a node reference.
	fn describe_node<'a>(
		&'a self,
		world: &'a WorldId,
		object: &'a RemoteObjectId,
	) -> BoxFuture<'a, Result<BackendNodeId>>;

	/// Resolves a node identity to a new reference owned by `world`.
	fn resolve_node<'a>(&'a self, world: &'a WorldId, node: BackendNodeId) -> BoxFuture<'a, Result<RemoteValue>>;

	/// Registers `source` to run in every future document of `page`.
	fn add_init_script<'a>(&'a self, page: &'a PageId, source: &'a str) -> BoxFuture<'a, Result<ScriptId>>;

	/// Queries the accessibility tree below `root`, filtered by accessible
	/// name and role, in document order.
	fn query_accessibility_tree<'a>(
		&'a self,
		world: &'a WorldId,
		root: &'a RemoteObjectId,
		name: Option<&'a str>,
		role: Option<&'a str>,
	) -> BoxFuture<'a, Result<Vec<BackendNodeId>>>;
}
