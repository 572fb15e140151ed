//! Page functions evaluated by the query layer.
//!
//! Every constant is the source of a JavaScript function handed to
//! [`RealmConnection::evaluate`](pwq_runtime::RealmConnection::evaluate).
//! They are public so connection implementations and test doubles can
//! recognise them.

use std::borrow::Cow;
use std::fmt;

/// Source of a function evaluated in a remote world.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageFunction(Cow<'static, str>);

impl PageFunction {
	/// Wraps function source.
	pub fn new(source: impl Into<Cow<'static, str>>) -> Self {
		Self(source.into())
	}

	/// Returns the function source.
	pub fn source(&self) -> &str {
		&self.0
	}
}

impl From<&'static str> for PageFunction {
	fn from(source: &'static str) -> Self {
		Self(Cow::Borrowed(source))
	}
}

impl From<String> for PageFunction {
	fn from(source: String) -> Self {
		Self(Cow::Owned(source))
	}
}

impl fmt::Display for PageFunction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Shared utility library injected once per world.
///
/// Evaluates to an object exposing chained-selector resolution and the
/// visibility check used by waits.
pub const UTILITY_SOURCE: &str = r#"() => {
	const domSort = nodes => {
		const unique = [...new Set(nodes)];
		unique.sort((a, b) => {
			if (a === b) return 0;
			return a.compareDocumentPosition(b) & Node.DOCUMENT_POSITION_FOLLOWING ? -1 : 1;
		});
		return unique;
	};
	const collect = async iterable => {
		const nodes = [];
		for await (const node of iterable) nodes.push(node);
		return nodes;
	};
	const runCss = (root, expression, chained) => {
		if (/^\s*[>+~]/.test(expression)) return [...root.querySelectorAll(`:scope ${expression}`)];
		const found = [...root.querySelectorAll(expression)];
		return chained && root.matches?.(expression) ? [root, ...found] : found;
	};
	const runStep = async (root, step, chained) => {
		switch (step.engine) {
			case 'css':
				return runCss(root, step.expression, chained);
			case 'aria':
				return collect(await globalThis.__pwqAriaResolver.queryAll(root, step.expression));
			case 'custom': {
				const engine = globalThis[`__pwqCustomEngine_${step.name}`];
				if (!engine) throw new Error(`Unknown query handler: ${step.name}`);
				if (engine.queryAll) return collect(engine.queryAll(root, step.expression, util));
				const node = await engine.queryOne(root, step.expression, util);
				return node ? [node] : [];
			}
		}
		throw new Error(`Unknown selector step: ${step.engine}`);
	};
	const util = {
		async *pQuerySelectorAll(root, steps) {
			let roots = [root];
			for (const [index, step] of steps.entries()) {
				const next = [];
				for (const current of roots) next.push(...(await runStep(current, step, index > 0)));
				roots = domSort(next);
			}
			yield* roots;
		},
		async pQuerySelector(root, steps) {
			for await (const node of util.pQuerySelectorAll(root, steps)) return node;
			return null;
		},
		checkVisibility(node) {
			const element = node.nodeType === Node.TEXT_NODE ? node.parentElement : node;
			if (!element) return false;
			const style = getComputedStyle(element);
			const rect = element.getBoundingClientRect();
			return style.visibility !== 'hidden' && rect.width > 0 && rect.height > 0;
		},
	};
	return util;
}"#;

/// Installs the resolver the utility library uses for ARIA steps.
///
/// Idempotent; also registered as an init script so every new document has it.
pub const ARIA_RESOLVER_INIT: &str = r#"() => {
	if (globalThis.__pwqAriaResolver) return;
	Object.defineProperty(globalThis, '__pwqAriaResolver', {
		value: Object.freeze({
			async queryAll(root, selector) {
				return (await globalThis.__ariaQuerySelectorAll(root, selector)) ?? [];
			},
			async queryOne(root, selector) {
				return (await globalThis.__ariaQuerySelector?.(root, selector)) ?? null;
			},
		}),
	});
}"#;

/// Exposes a registered custom engine as `__pwqCustomEngine_<name>`.
pub const EXPOSE_CUSTOM_ENGINE: &str = r#"(name, queryAll, queryOne) => {
	globalThis[`__pwqCustomEngine_${name}`] = Object.freeze({
		queryAll: queryAll ? new Function(`return ${queryAll}`)() : undefined,
		queryOne: queryOne ? new Function(`return ${queryOne}`)() : undefined,
	});
}"#;

/// Native multi-result CSS query.
pub const CSS_QUERY_ALL: &str = "(root, selector) => root.querySelectorAll(selector)";

/// Native single-result CSS query.
pub const CSS_QUERY_ONE: &str = "(root, selector) => root.querySelector(selector)";

/// Chained-selector query over parsed steps.
pub const P_QUERY_ALL: &str = "(root, steps, util) => util.pQuerySelectorAll(root, steps)";

/// Chained-selector query returning the first match.
pub const P_QUERY_ONE: &str = "(root, steps, util) => util.pQuerySelector(root, steps)";

/// Turns an iterable (sync or async) into an iterator.
pub const ITERATOR_FROM: &str = r#"(iterable) => {
	if (iterable[Symbol.asyncIterator]) return iterable[Symbol.asyncIterator]();
	return iterable[Symbol.iterator]();
}"#;

/// Pulls at most `size` values off an iterator.
pub const ITERATOR_NEXT_BATCH: &str = r#"async (iterator, size) => {
	const results = [];
	while (results.length < size) {
		const result = await iterator.next();
		if (result.done) break;
		results.push(result.value);
	}
	return results;
}"#;

/// Enumerable own property names.
pub const OWN_PROPERTY_NAMES: &str = "(object) => Object.keys(object)";

/// Property lookup.
pub const GET_PROPERTY: &str = "(object, name) => object[name]";

/// Returns its argument, used to fetch a value by value.
pub const IDENTITY: &str = "(object) => object";

/// The document of the world.
pub const DOCUMENT: &str = "() => document";

/// Packs arguments into an array.
pub const COLLECT: &str = "(...values) => values";

/// Visibility check delegated to the utility library.
pub const CHECK_VISIBILITY: &str = "(node, util) => util.checkVisibility(node)";
