//! User-registered query handlers.
//!
//! Custom engines are JavaScript functions evaluated in the page. They are
//! registered by name in a process-wide registry and addressed in selectors
//! as `name/expression` or `custom/name/expression`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use parking_lot::RwLock;
use pwq_runtime::{Error, Result};
use regex::Regex;

use super::{Primitive, QueryHandler};
use crate::js::PageFunction;
use crate::selector::{ARIA_ENGINE, CUSTOM_ENGINE};

static ENGINE_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]*$").expect("valid regex"));

static REGISTRY: LazyLock<RwLock<CustomQueryRegistry>> = LazyLock::new(|| RwLock::new(CustomQueryRegistry::new()));

static NEXT_REGISTRATION: AtomicU64 = AtomicU64::new(1);

/// Returns true if `name` is a syntactically valid engine name.
pub(crate) fn is_valid_name(name: &str) -> bool {
	ENGINE_NAME.is_match(name)
}

/// JavaScript sources of a custom engine.
///
/// Each source is a function `(root, selector, util)`; `query_all` may return
/// any iterable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomQuerySource {
	pub query_all: Option<String>,
	pub query_one: Option<String>,
}

impl CustomQuerySource {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the multi-result function.
	pub fn query_all(mut self, source: impl Into<String>) -> Self {
		self.query_all = Some(source.into());
		self
	}

	/// Sets the single-result function.
	pub fn query_one(mut self, source: impl Into<String>) -> Self {
		self.query_one = Some(source.into());
		self
	}
}

/// A handler built from [`CustomQuerySource`].
#[derive(Debug, Clone)]
pub struct CustomQueryHandler {
	source: CustomQuerySource,
	primitive: Primitive,
}

impl CustomQueryHandler {
	/// # Errors
	///
	/// Returns [`Error::Configuration`] if neither function is given.
	pub fn new(source: CustomQuerySource) -> Result<Self> {
		let primitive = Primitive::from_parts(
			source.query_all.clone().map(PageFunction::from),
			source.query_one.clone().map(PageFunction::from),
		)?;
		Ok(Self { source, primitive })
	}

	/// The sources this handler was built from.
	pub fn source(&self) -> &CustomQuerySource {
		&self.source
	}
}

impl QueryHandler for CustomQueryHandler {
	fn name(&self) -> &str {
		CUSTOM_ENGINE
	}

	fn primitive(&self) -> Result<&Primitive> {
		Ok(&self.primitive)
	}
}

#[derive(Debug, Clone)]
pub(crate) struct Registration {
	pub(crate) id: u64,
	pub(crate) handler: Arc<CustomQueryHandler>,
}

/// Named custom handlers.
///
/// The process-wide instance sits behind the free functions of this module;
/// standalone registries are useful for scoping engines in tests.
#[derive(Debug, Default)]
pub struct CustomQueryRegistry {
	handlers: IndexMap<String, Registration>,
}

impl CustomQueryRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `handler` under `name`.
	///
	/// # Errors
	///
	/// Returns [`Error::Configuration`] if the name is malformed, reserved for
	/// a built-in engine or already taken.
	pub fn register(&mut self, name: &str, handler: CustomQueryHandler) -> Result<()> {
		if !is_valid_name(name) {
			return Err(Error::Configuration(format!(
				"Custom query handler names may only contain [a-zA-Z0-9] and must start with a letter, got `{name}`"
			)));
		}
		if name == ARIA_ENGINE || name == CUSTOM_ENGINE {
			return Err(Error::Configuration(format!(
				"`{name}` is a built-in query handler and cannot be replaced"
			)));
		}
		if self.handlers.contains_key(name) {
			return Err(Error::Configuration(format!(
				"A custom query handler named `{name}` already exists"
			)));
		}

		let id = NEXT_REGISTRATION.fetch_add(1, Ordering::Relaxed);
		self.handlers.insert(name.to_owned(), Registration {
			id,
			handler: Arc::new(handler),
		});
		tracing::debug!(name, registration = id, "Registered custom query handler");
		Ok(())
	}

	/// Removes the handler registered under `name`.
	///
	/// # Errors
	///
	/// Returns [`Error::Configuration`] if nothing is registered under `name`.
	pub fn unregister(&mut self, name: &str) -> Result<()> {
		match self.handlers.shift_remove(name) {
			Some(_) => {
				tracing::debug!(name, "Unregistered custom query handler");
				Ok(())
			}
			None => Err(Error::Configuration(format!(
				"Cannot unregister unknown custom query handler `{name}`"
			))),
		}
	}

	/// The handler registered under `name`.
	pub fn get(&self, name: &str) -> Option<Arc<CustomQueryHandler>> {
		self.handlers.get(name).map(|registration| registration.handler.clone())
	}

	pub fn contains(&self, name: &str) -> bool {
		self.handlers.contains_key(name)
	}

	/// Registered names in registration order.
	pub fn names(&self) -> Vec<String> {
		self.handlers.keys().cloned().collect()
	}

	pub fn clear(&mut self) {
		self.handlers.clear();
	}

	pub(crate) fn registrations(&self) -> Vec<(String, Registration)> {
		self.handlers
			.iter()
			.map(|(name, registration)| (name.clone(), registration.clone()))
			.collect()
	}
}

/// Registers `handler` in the process-wide registry.
///
/// # Errors
///
/// See [`CustomQueryRegistry::register`].
pub fn register_custom_query_handler(name: &str, handler: CustomQueryHandler) -> Result<()> {
	REGISTRY.write().register(name, handler)
}

/// Removes `name` from the process-wide registry.
///
/// # Errors
///
/// See [`CustomQueryRegistry::unregister`].
pub fn unregister_custom_query_handler(name: &str) -> Result<()> {
	REGISTRY.write().unregister(name)
}

/// Names in the process-wide registry.
pub fn custom_query_handler_names() -> Vec<String> {
	REGISTRY.read().names()
}

/// Empties the process-wide registry.
pub fn clear_custom_query_handlers() {
	REGISTRY.write().clear();
}

pub(crate) fn is_registered(name: &str) -> bool {
	REGISTRY.read().contains(name)
}

pub(crate) fn lookup(name: &str) -> Option<Arc<CustomQueryHandler>> {
	REGISTRY.read().get(name)
}

pub(crate) fn registrations() -> Vec<(String, Registration)> {
	REGISTRY.read().registrations()
}
