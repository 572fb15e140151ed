//! Selector parsing.
//!
//! A selector is a whitespace-separated chain of steps. Each step is either
//! `engine/expression` or plain CSS:
//!
//! ```text
//! div.list aria/Submit custom/items/li
//! └──css─┘ └─aria──┘  └────custom───┘
//! ```
//!
//! Whitespace inside brackets, parentheses or quotes does not split, nor does
//! a backslash-escaped space. Adjacent CSS steps merge into one descendant
//! selector.

use pwq_runtime::{Error, Result};
use serde::Serialize;

use crate::query_handler::custom::is_valid_name;

/// Engine name reserved for the ARIA handler.
pub const ARIA_ENGINE: &str = "aria";
/// Engine name reserved for the namespaced custom form `custom/<name>/<expr>`.
pub const CUSTOM_ENGINE: &str = "custom";

/// One step of a parsed selector, serialized as handed to the in-page resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "engine", rename_all = "lowercase")]
pub enum SelectorStep {
	/// Native CSS.
	Css { expression: String },
	/// Accessible name and role query.
	Aria { expression: String },
	/// A registered custom engine.
	Custom { name: String, expression: String },
}

/// Parses `selector` into steps.
///
/// `is_registered` decides which `name/...` prefixes are custom engines;
/// anything else containing a slash stays CSS.
///
/// # Errors
///
/// Returns [`Error::InvalidSelector`] for an empty selector or a
/// `custom/<name>` step naming an unregistered engine.
pub fn parse_selector(selector: &str, is_registered: impl Fn(&str) -> bool) -> Result<Vec<SelectorStep>> {
	let mut steps: Vec<SelectorStep> = Vec::new();

	for token in tokenize(selector) {
		let step = classify(selector, &token, &is_registered)?;
		if let (Some(SelectorStep::Css { expression }), SelectorStep::Css { expression: next }) =
			(steps.last_mut(), &step)
		{
			expression.push(' ');
			expression.push_str(next);
			continue;
		}
		steps.push(step);
	}

	if steps.is_empty() {
		return Err(invalid(selector, "selector is empty"));
	}
	Ok(steps)
}

fn classify(selector: &str, token: &str, is_registered: &impl Fn(&str) -> bool) -> Result<SelectorStep> {
	let Some((prefix, rest)) = token.split_once('/') else {
		return Ok(css(token));
	};
	if !is_valid_name(prefix) {
		return Ok(css(token));
	}

	match prefix {
		ARIA_ENGINE => Ok(SelectorStep::Aria {
			expression: unescape_spaces(rest),
		}),
		CUSTOM_ENGINE => {
			let (name, expression) = rest.split_once('/').unwrap_or((rest, ""));
			if !is_registered(name) {
				return Err(invalid(selector, &format!("unknown custom query handler `{name}`")));
			}
			Ok(SelectorStep::Custom {
				name: name.to_owned(),
				expression: expression.to_owned(),
			})
		}
		name if is_registered(name) => Ok(SelectorStep::Custom {
			name: name.to_owned(),
			expression: rest.to_owned(),
		}),
		_ => Ok(css(token)),
	}
}

fn css(token: &str) -> SelectorStep {
	SelectorStep::Css {
		expression: token.to_owned(),
	}
}

fn invalid(selector: &str, reason: &str) -> Error {
	Error::InvalidSelector {
		selector: selector.to_owned(),
		reason: reason.to_owned(),
	}
}

fn unescape_spaces(expression: &str) -> String {
	expression.replace("\\ ", " ")
}

/// Splits on top-level whitespace.
fn tokenize(selector: &str) -> Vec<String> {
	let mut tokens = Vec::new();
	let mut current = String::new();
	let mut depth = 0usize;
	let mut quote: Option<char> = None;
	let mut escaped = false;

	for ch in selector.chars() {
		if escaped {
			current.push(ch);
			escaped = false;
			continue;
		}
		match ch {
			'\\' => {
				current.push(ch);
				escaped = true;
			}
			'"' | '\'' if quote == Some(ch) => {
				quote = None;
				current.push(ch);
			}
			'"' | '\'' if quote.is_none() => {
				quote = Some(ch);
				current.push(ch);
			}
			'[' | '(' if quote.is_none() => {
				depth += 1;
				current.push(ch);
			}
			']' | ')' if quote.is_none() => {
				depth = depth.saturating_sub(1);
				current.push(ch);
			}
			c if c.is_whitespace() && quote.is_none() && depth == 0 => {
				if !current.is_empty() {
					tokens.push(std::mem::take(&mut current));
				}
			}
			c => current.push(c),
		}
	}
	if !current.is_empty() {
		tokens.push(current);
	}
	tokens
}
