//! Pages own the connection, the settings and page-wide preparation.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use pwq_protocol::{PageId, ScriptId};
use pwq_runtime::{RealmConnection, Result};

use crate::frame::Frame;
use crate::settings::QuerySettings;

/// A page: the unit init scripts are registered for.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Page {
	inner: Arc<PageInner>,
}

struct PageInner {
	id: PageId,
	connection: Arc<dyn RealmConnection>,
	settings: QuerySettings,
	prepared: Mutex<HashSet<&'static str>>,
}

impl Page {
	/// Creates a page with default settings.
	pub fn new(id: PageId, connection: Arc<dyn RealmConnection>) -> Self {
		Self::with_settings(id, connection, QuerySettings::default())
	}

	/// Creates a page with explicit settings.
	pub fn with_settings(id: PageId, connection: Arc<dyn RealmConnection>, settings: QuerySettings) -> Self {
		Self {
			inner: Arc::new(PageInner {
				id,
				connection,
				settings,
				prepared: Mutex::new(HashSet::new()),
			}),
		}
	}

	/// Page identifier.
	pub fn id(&self) -> &PageId {
		&self.inner.id
	}

	/// Settings shared by every frame of this page.
	pub fn settings(&self) -> &QuerySettings {
		&self.inner.settings
	}

	pub(crate) fn connection(&self) -> &Arc<dyn RealmConnection> {
		&self.inner.connection
	}

	/// Creates a frame of this page. Its worlds arrive through the frame hooks.
	pub fn attach_frame(&self, id: impl Into<String>) -> Frame {
		let id = id.into();
		tracing::debug!(page = %self.inner.id, frame = %id, "Frame attached");
		Frame::attach(id, self.clone())
	}

	/// Runs `source` in every future document of this page.
	pub async fn evaluate_on_new_document(&self, source: &str) -> Result<ScriptId> {
		self.inner.connection.add_init_script(&self.inner.id, source).await
	}

	/// Registers `source` as an init script the first time `key` is seen.
	///
	/// A failed registration is forgotten so the next caller retries.
	pub(crate) async fn prepare_once(&self, key: &'static str, source: &str) -> Result<()> {
		if !self.inner.prepared.lock().insert(key) {
			return Ok(());
		}
		match self.evaluate_on_new_document(source).await {
			Ok(script) => {
				tracing::debug!(page = %self.inner.id, key, script = %script.0, "Registered init script");
				Ok(())
			}
			Err(err) => {
				self.inner.prepared.lock().remove(key);
				Err(err)
			}
		}
	}
}

impl fmt::Debug for Page {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Page")
			.field("id", &self.inner.id)
			.field("settings", &self.inner.settings)
			.finish()
	}
}
