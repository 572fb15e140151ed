//! Arguments resolved against the world a call actually runs in.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use pwq_protocol::SerializedArgument;
use pwq_runtime::{BoxFuture, Result};

use crate::world::World;

type Resolver = dyn Fn(World) -> BoxFuture<'static, Result<SerializedArgument>> + Send + Sync;

/// A deferred evaluation argument.
///
/// The resolver runs with the target world immediately before every call, so
/// the same `LazyArg` can be reused across worlds and navigations. Results are
/// never cached here.
#[derive(Clone)]
pub struct LazyArg {
	resolver: Arc<Resolver>,
}

impl LazyArg {
	/// Creates a lazy argument from an async resolver.
	pub fn new<F, Fut>(resolver: F) -> Self
	where
		F: Fn(World) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<SerializedArgument>> + Send + 'static,
	{
		Self {
			resolver: Arc::new(move |world: World| -> BoxFuture<'static, Result<SerializedArgument>> {
				Box::pin(resolver(world))
			}),
		}
	}

	/// Resolves to the utility library of the target world.
	pub fn utility() -> Self {
		Self::new(|world: World| async move { world.utility_argument().await })
	}

	pub(crate) async fn resolve(&self, world: &World) -> Result<SerializedArgument> {
		(self.resolver)(world.clone()).await
	}
}

impl fmt::Debug for LazyArg {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LazyArg").finish_non_exhaustive()
	}
}
