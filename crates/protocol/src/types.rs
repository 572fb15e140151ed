//! Core protocol types used across the realm boundary.
//!
//! These types identify worlds, remote objects and DOM nodes, and describe
//! values returned by or passed to remote evaluation.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value::{ValueError, from_protocol_value, to_protocol_value};

/// Opaque identifier of an execution world, assigned by the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(pub String);

impl From<&str> for WorldId {
	fn from(value: &str) -> Self {
		Self(value.to_owned())
	}
}

impl fmt::Display for WorldId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Identifier of the page that owns a set of frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(pub String);

impl From<&str> for PageId {
	fn from(value: &str) -> Self {
		Self(value.to_owned())
	}
}

impl fmt::Display for PageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Reference to an object kept alive by the remote runtime until released.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteObjectId(pub String);

impl From<&str> for RemoteObjectId {
	fn from(value: &str) -> Self {
		Self(value.to_owned())
	}
}

impl fmt::Display for RemoteObjectId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// World-independent identity of a DOM node.
///
/// Used to re-resolve the same node inside another world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendNodeId(pub u64);

/// Identifier of a script registered to run in every future document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptId(pub String);

/// The two realms every frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorldKind {
	/// Page-authored realm, shared with page scripts.
	Main,
	/// Automation-owned realm, invisible to page scripts.
	Isolated,
}

impl WorldKind {
	/// Returns the kind as a static string.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Main => "main",
			Self::Isolated => "isolated",
		}
	}
}

impl fmt::Display for WorldKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Type tag of a remote value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteType {
	Undefined,
	Null,
	String,
	Number,
	Boolean,
	Bigint,
	Symbol,
	Object,
	Array,
	Function,
	Node,
	Iterator,
	Generator,
	Promise,
	Map,
	Set,
	Error,
	Window,
}

impl RemoteType {
	/// Returns true for types that are always transferred inline.
	pub fn is_primitive(&self) -> bool {
		matches!(
			self,
			Self::Undefined | Self::Null | Self::String | Self::Number | Self::Boolean | Self::Bigint
		)
	}

	/// Returns the type name used in handle descriptions.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Undefined => "undefined",
			Self::Null => "null",
			Self::String => "string",
			Self::Number => "number",
			Self::Boolean => "boolean",
			Self::Bigint => "bigint",
			Self::Symbol => "symbol",
			Self::Object => "object",
			Self::Array => "array",
			Self::Function => "function",
			Self::Node => "node",
			Self::Iterator => "iterator",
			Self::Generator => "generator",
			Self::Promise => "promise",
			Self::Map => "map",
			Self::Set => "set",
			Self::Error => "error",
			Self::Window => "window",
		}
	}
}

/// A value produced by remote evaluation.
///
/// Objects and nodes carry a [`RemoteObjectId`] in `handle`; primitives are
/// transferred inline in `value` using the protocol value encoding
/// (see [`crate::value`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteValue {
	/// Type of the remote value.
	#[serde(rename = "type")]
	pub kind: RemoteType,
	/// Remote reference, present for objects and nodes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub handle: Option<RemoteObjectId>,
	/// Inline protocol-encoded value, present for primitives.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<Value>,
}

impl RemoteValue {
	/// Creates a reference to a remote object.
	pub fn reference(kind: RemoteType, handle: impl Into<RemoteObjectId>) -> Self {
		Self {
			kind,
			handle: Some(handle.into()),
			value: None,
		}
	}

	/// Creates an inline primitive from plain JSON.
	pub fn primitive(json: &Value) -> Self {
		let kind = match json {
			Value::Null => RemoteType::Null,
			Value::Bool(_) => RemoteType::Boolean,
			Value::Number(_) => RemoteType::Number,
			Value::String(_) => RemoteType::String,
			Value::Array(_) => RemoteType::Array,
			Value::Object(_) => RemoteType::Object,
		};
		Self {
			kind,
			handle: None,
			value: Some(to_protocol_value(json)),
		}
	}

	/// The inline `undefined` value.
	pub fn undefined() -> Self {
		Self {
			kind: RemoteType::Undefined,
			handle: None,
			value: Some(serde_json::json!({ "v": "undefined" })),
		}
	}

	/// Returns the remote reference, if any.
	pub fn object_id(&self) -> Option<&RemoteObjectId> {
		self.handle.as_ref()
	}

	/// Returns true if this value refers to a DOM node.
	pub fn is_node(&self) -> bool {
		self.kind == RemoteType::Node && self.handle.is_some()
	}

	/// Decodes an inline value to plain JSON.
	///
	/// Returns `Ok(None)` for references, which must be fetched by value.
	pub fn inline_json(&self) -> Result<Option<Value>, ValueError> {
		if self.handle.is_some() {
			return Ok(None);
		}
		match &self.value {
			Some(value) => from_protocol_value(value).map(Some),
			None => Ok(Some(Value::Null)),
		}
	}
}

impl From<String> for RemoteObjectId {
	fn from(value: String) -> Self {
		Self(value)
	}
}

/// An evaluation argument as sent to the collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SerializedArgument {
	/// Protocol-encoded inline value.
	Value(Value),
	/// Reference to an object living in the target world.
	Handle(RemoteObjectId),
}

impl SerializedArgument {
	/// Encodes plain JSON as an inline argument.
	pub fn json(value: &Value) -> Self {
		Self::Value(to_protocol_value(value))
	}

	/// The inline `undefined` argument.
	pub fn undefined() -> Self {
		Self::Value(serde_json::json!({ "v": "undefined" }))
	}
}
