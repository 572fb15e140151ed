//! Error types for the realm runtime.

use pwq_protocol::ValueError;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Message fragments the remote runtime uses when a context went away.
const STALE_CONTEXT_MESSAGES: [&str; 3] = [
	"Execution context was destroyed",
	"Cannot find context with specified id",
	"Inspected target navigated or closed",
];

/// Errors that can occur while evaluating, querying or waiting.
#[derive(Debug, Error)]
pub enum Error {
	/// Protocol-level error (unexpected shape from the collaborator).
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// Error thrown by the remote runtime with full context.
	#[error("{name}: {message}")]
	Remote {
		/// Error type name (e.g., "TypeError", "Error")
		name: String,
		/// Human-readable error message
		message: String,
		/// JavaScript stack trace (if available)
		stack: Option<String>,
	},

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// A remote value could not be converted to the requested type.
	#[error("Serialization error: {0}")]
	Serialization(String),

	/// Timeout waiting for an element or object.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// Target was closed (page or frame).
	#[error("Target closed: Cannot perform operation on closed {target_type}. {context}")]
	TargetClosed {
		target_type: String,
		context: String,
	},

	/// The world was torn down by navigation or detach.
	#[error("Execution world {world} was destroyed, most likely because of a navigation")]
	StaleWorld { world: String },

	/// Invalid query handler setup or registry misuse.
	#[error("Configuration error: {0}")]
	Configuration(String),

	/// Selector could not be parsed.
	#[error("Invalid selector '{selector}': {reason}")]
	InvalidSelector { selector: String, reason: String },

	/// Invalid argument provided to method.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
}

impl Error {
	/// Returns the error name if this is a Remote error.
	pub fn error_name(&self) -> Option<&str> {
		match self {
			Error::Remote { name, .. } => Some(name),
			_ => None,
		}
	}

	/// Returns the stack trace if this is a Remote error with a stack.
	pub fn stack_trace(&self) -> Option<&str> {
		match self {
			Error::Remote { stack, .. } => stack.as_deref(),
			_ => None,
		}
	}

	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		match self {
			Error::Timeout(_) => true,
			Error::Remote { name, .. } => name == "TimeoutError",
			_ => false,
		}
	}

	/// Returns true if this is a target closed error.
	pub fn is_target_closed(&self) -> bool {
		match self {
			Error::TargetClosed { .. } => true,
			Error::Remote { name, .. } => name == "TargetClosedError",
			_ => false,
		}
	}

	/// Returns true if the error reports a world invalidated by navigation.
	pub fn is_stale_world(&self) -> bool {
		match self {
			Error::StaleWorld { .. } => true,
			Error::Remote { message, .. } => STALE_CONTEXT_MESSAGES.iter().any(|m| message.contains(m)),
			_ => false,
		}
	}

	/// Returns true for registry and handler setup errors.
	pub fn is_configuration(&self) -> bool {
		matches!(self, Error::Configuration(_))
	}
}

impl From<ValueError> for Error {
	fn from(err: ValueError) -> Self {
		Error::Serialization(err.to_string())
	}
}
