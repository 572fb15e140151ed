//! Page-wide defaults for query and wait operations.

use std::time::Duration;

use pwq_protocol::{DEFAULT_ITERATOR_BATCH_SIZE, DEFAULT_POLLING_INTERVAL_MS, DEFAULT_TIMEOUT_MS};

/// Environment variable overriding [`QuerySettings::default_timeout`] (milliseconds).
pub const ENV_DEFAULT_TIMEOUT: &str = "PWQ_DEFAULT_TIMEOUT_MS";
/// Environment variable overriding [`QuerySettings::polling_interval`] (milliseconds).
pub const ENV_POLLING_INTERVAL: &str = "PWQ_POLLING_INTERVAL_MS";
/// Environment variable overriding [`QuerySettings::iterator_batch_size`].
pub const ENV_ITERATOR_BATCH_SIZE: &str = "PWQ_ITERATOR_BATCH_SIZE";

/// Defaults applied when per-call options leave a value unset.
///
/// Owned by a [`Page`](crate::Page) and shared by its frames.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySettings {
	/// Timeout for waits and for waiting on a world to appear. `None` waits forever.
	pub default_timeout: Option<Duration>,
	/// Delay between two polls of a wait task.
	pub polling_interval: Duration,
	/// Elements fetched per round trip when draining a remote iterable.
	pub iterator_batch_size: usize,
	/// Whether wait tasks re-arm in the new document after navigation.
	pub resume_on_navigation: bool,
}

impl Default for QuerySettings {
	fn default() -> Self {
		Self {
			default_timeout: Some(Duration::from_millis(DEFAULT_TIMEOUT_MS as u64)),
			polling_interval: Duration::from_millis(DEFAULT_POLLING_INTERVAL_MS as u64),
			iterator_batch_size: DEFAULT_ITERATOR_BATCH_SIZE,
			resume_on_navigation: true,
		}
	}
}

impl QuerySettings {
	/// Creates settings with built-in defaults.
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds settings from defaults overridden by `PWQ_*` environment variables.
	///
	/// Unparseable values are ignored with a warning.
	pub fn from_env() -> Self {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
		let mut settings = Self::default();

		if let Some(ms) = parse_var::<u64>(&lookup, ENV_DEFAULT_TIMEOUT) {
			settings.default_timeout = (ms > 0).then(|| Duration::from_millis(ms));
		}
		if let Some(ms) = parse_var::<u64>(&lookup, ENV_POLLING_INTERVAL) {
			settings.polling_interval = Duration::from_millis(ms);
		}
		if let Some(size) = parse_var::<usize>(&lookup, ENV_ITERATOR_BATCH_SIZE) {
			settings.iterator_batch_size = size.max(1);
		}

		settings
	}

	/// Sets the default timeout; `None` disables it.
	pub fn default_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.default_timeout = timeout;
		self
	}

	/// Sets the polling interval.
	pub fn polling_interval(mut self, interval: Duration) -> Self {
		self.polling_interval = interval;
		self
	}

	/// Sets the iterator batch size (at least 1).
	pub fn iterator_batch_size(mut self, size: usize) -> Self {
		self.iterator_batch_size = size.max(1);
		self
	}

	/// Sets whether waits resume after navigation.
	pub fn resume_on_navigation(mut self, resume: bool) -> Self {
		self.resume_on_navigation = resume;
		self
	}
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
	let raw = lookup(key)?;
	match raw.trim().parse() {
		Ok(value) => Some(value),
		Err(_) => {
			tracing::warn!(key, value = %raw, "Ignoring unparseable setting");
			None
		}
	}
}
