//! Option structs for query and wait operations.
//!
//! These types represent the configuration callers pass to the query layer.
//! They serialize with camelCase keys so they can be stored or forwarded as
//! JSON unchanged.

use serde::{Deserialize, Serialize};

/// Default timeout in milliseconds for wait operations.
pub const DEFAULT_TIMEOUT_MS: f64 = 30000.0;

/// Default interval in milliseconds between two polls of a wait operation.
pub const DEFAULT_POLLING_INTERVAL_MS: f64 = 100.0;

/// Default number of elements fetched per round trip when draining a remote
/// iterable.
pub const DEFAULT_ITERATOR_BATCH_SIZE: usize = 20;

/// Options for `wait_for` / `wait_for_selector`.
///
/// `visible` and `hidden` are mutually exclusive. With `hidden`, the wait
/// succeeds with no element once the selector is absent or not visible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitForSelectorOptions {
	/// Maximum wait time in milliseconds; `0` disables the timeout
	#[serde(skip_serializing_if = "Option::is_none")]
	pub timeout: Option<f64>,

	/// Wait for the element to be present and visible
	#[serde(skip_serializing_if = "Option::is_none")]
	pub visible: Option<bool>,

	/// Wait for the element to be absent or hidden
	#[serde(skip_serializing_if = "Option::is_none")]
	pub hidden: Option<bool>,

	/// Interval between polls in milliseconds
	#[serde(skip_serializing_if = "Option::is_none")]
	pub polling: Option<f64>,

	/// Keep polling in the new document after a navigation
	#[serde(skip_serializing_if = "Option::is_none")]
	pub resume_on_navigation: Option<bool>,
}

impl WaitForSelectorOptions {
	/// Creates new default options.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the timeout in milliseconds.
	pub fn timeout(mut self, timeout: f64) -> Self {
		self.timeout = Some(timeout);
		self
	}

	/// Requires the matched element to be visible.
	pub fn visible(mut self, visible: bool) -> Self {
		self.visible = Some(visible);
		self
	}

	/// Waits for the element to disappear or become hidden.
	pub fn hidden(mut self, hidden: bool) -> Self {
		self.hidden = Some(hidden);
		self
	}

	/// Sets the polling interval in milliseconds.
	pub fn polling(mut self, interval: f64) -> Self {
		self.polling = Some(interval);
		self
	}

	/// Controls whether polling resumes after navigation.
	pub fn resume_on_navigation(mut self, resume: bool) -> Self {
		self.resume_on_navigation = Some(resume);
		self
	}

	/// Returns true if the element must be visible.
	pub fn wants_visible(&self) -> bool {
		self.visible.unwrap_or(false)
	}

	/// Returns true if the wait is for disappearance.
	pub fn wants_hidden(&self) -> bool {
		self.hidden.unwrap_or(false)
	}
}
