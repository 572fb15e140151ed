//! In-memory stand-in for a browser session.
//!
//! `FakeBrowser` implements `RealmConnection` over a tiny DOM. Remote calls are
//! dispatched on the source of the page function, which is why the functions
//! of `pwq::js` are public. Every object reference lives in a per-world table
//! so tests can assert exactly what was released.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use pwq::{
	BackendNodeId, BoxFuture, Error, Frame, Page, PageId, QuerySettings, RawBindingFn, RealmConnection,
	RemoteObjectId, RemoteType, RemoteValue, Result, ScriptId, SerializedArgument, World, WorldId, WorldKind, js,
};
use pwq_protocol::from_protocol_value;
use serde_json::{Value, json};

/// Custom engine source whose `queryAll` treats the selector as CSS.
pub const ENGINE_ALL_CSS: &str = "(root, selector) => root.querySelectorAll(selector).values()";
/// Custom engine source whose `queryOne` treats the selector as CSS.
pub const ENGINE_ONE_CSS: &str = "(node, selector) => node.querySelector(selector)";
/// Custom engine source yielding every `.foo` container, ignoring the selector.
pub const ENGINE_ALL_FOO: &str = "function* (root) { yield* root.querySelectorAll('.foo'); }";
/// Custom engine source yielding every `<li>`, ignoring the selector.
pub const ENGINE_ALL_LI: &str = "function* (root) { yield* root.querySelectorAll('li'); }";

#[derive(Debug, Clone)]
struct Node {
	tag: String,
	id: Option<String>,
	classes: Vec<String>,
	parent: Option<usize>,
	visible: bool,
	role: Option<String>,
	name: Option<String>,
	attached: bool,
}

#[derive(Debug, Clone)]
enum Item {
	Node(usize),
	Value(Value),
}

#[derive(Debug, Default)]
struct IterState {
	items: Vec<Item>,
	position: usize,
}

#[derive(Debug, Clone)]
enum Object {
	Node(usize),
	Array(Vec<Item>),
	Iter(Arc<Mutex<IterState>>),
	Util,
}

#[derive(Debug, Clone)]
enum Arg {
	Object(Object),
	Value(Value),
}

#[derive(Default)]
struct WorldState {
	alive: bool,
	objects: HashMap<String, Object>,
	bindings: HashMap<String, RawBindingFn>,
	exposed: HashMap<String, (Option<String>, Option<String>)>,
	aria_resolver: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
	All,
	One,
}

#[derive(Default)]
struct State {
	dom: Vec<Node>,
	worlds: HashMap<WorldId, WorldState>,
	next_object: u64,
	calls: Vec<(WorldId, String)>,
	released: Vec<(WorldId, RemoteObjectId)>,
	init_scripts: Vec<String>,
	binding_registrations: Vec<(WorldId, String)>,
	engines: HashMap<String, Shape>,
	fail_expose: HashSet<String>,
	pulled: usize,
}

/// In-memory browser.
pub struct FakeBrowser {
	state: Mutex<State>,
	resolve_delay: Mutex<Option<Duration>>,
}

impl Default for FakeBrowser {
	fn default() -> Self {
		let mut state = State::default();
		state.dom.push(Node {
			tag: "#document".into(),
			id: None,
			classes: Vec::new(),
			parent: None,
			visible: true,
			role: None,
			name: None,
			attached: true,
		});
		for source in [ENGINE_ALL_CSS, ENGINE_ALL_FOO, ENGINE_ALL_LI] {
			state.engines.insert(source.to_owned(), Shape::All);
		}
		state.engines.insert(ENGINE_ONE_CSS.to_owned(), Shape::One);
		Self {
			state: Mutex::new(state),
			resolve_delay: Mutex::new(None),
		}
	}
}

fn remote_error(message: &str) -> Error {
	Error::Remote {
		name: "Error".into(),
		message: message.into(),
		stack: None,
	}
}

impl FakeBrowser {
	/// Appends an element described as `tag#id.class1.class2` under `parent`
	/// (`#id` of an existing element, or `""` for the document).
	pub fn add(&self, parent: &str, spec: &str) -> usize {
		let mut state = self.state.lock();
		let parent = if parent.is_empty() {
			0
		} else {
			find_by_id(&state.dom, parent.trim_start_matches('#')).expect("parent exists")
		};
		let compound = parse_compound(spec);
		state.dom.push(Node {
			tag: compound.tag.unwrap_or_else(|| "div".into()),
			id: compound.id,
			classes: compound.classes,
			parent: Some(parent),
			visible: true,
			role: None,
			name: None,
			attached: true,
		});
		state.dom.len() - 1
	}

	pub fn set_visible(&self, id: &str, visible: bool) {
		let mut state = self.state.lock();
		let index = find_by_id(&state.dom, id).expect("element exists");
		state.dom[index].visible = visible;
	}

	pub fn set_aria(&self, id: &str, role: &str, name: &str) {
		let mut state = self.state.lock();
		let index = find_by_id(&state.dom, id).expect("element exists");
		state.dom[index].role = Some(role.into());
		state.dom[index].name = Some(name.into());
	}

	pub fn remove(&self, id: &str) {
		let mut state = self.state.lock();
		let index = find_by_id(&state.dom, id).expect("element exists");
		state.dom[index].attached = false;
	}

	pub fn fail_expose(&self, engine: &str) {
		self.state.lock().fail_expose.insert(engine.to_owned());
	}

	/// Delays every node resolution, which is the adopting half of a transfer.
	pub fn delay_resolve(&self, delay: Duration) {
		*self.resolve_delay.lock() = Some(delay);
	}

	pub fn create_world(&self, id: &str) {
		self.state.lock().worlds.insert(WorldId::from(id), WorldState {
			alive: true,
			..WorldState::default()
		});
	}

	pub fn kill_worlds(&self) {
		for world in self.state.lock().worlds.values_mut() {
			world.alive = false;
		}
	}

	/// How many times `object` was released.
	pub fn release_count(&self, object: &RemoteObjectId) -> usize {
		self.state.lock().released.iter().filter(|(_, id)| id == object).count()
	}

	pub fn released_in(&self, world: &str) -> usize {
		let world = WorldId::from(world);
		self.state.lock().released.iter().filter(|(w, _)| *w == world).count()
	}

	/// Live references in `world`, not counting the utility library.
	pub fn live_objects(&self, world: &str) -> usize {
		let state = self.state.lock();
		state.worlds.get(&WorldId::from(world)).map_or(0, |world| {
			world
				.objects
				.values()
				.filter(|object| !matches!(object, Object::Util))
				.count()
		})
	}

	pub fn calls_of(&self, world: &str, function: &str) -> usize {
		let world = WorldId::from(world);
		self.state
			.lock()
			.calls
			.iter()
			.filter(|(w, f)| *w == world && f == function)
			.count()
	}

	pub fn binding_registrations(&self, world: &str, name: &str) -> usize {
		let world = WorldId::from(world);
		self.state
			.lock()
			.binding_registrations
			.iter()
			.filter(|(w, n)| *w == world && n == name)
			.count()
	}

	pub fn exposed_engines(&self, world: &str) -> Vec<String> {
		let state = self.state.lock();
		let mut names: Vec<String> = state
			.worlds
			.get(&WorldId::from(world))
			.map(|world| world.exposed.keys().cloned().collect())
			.unwrap_or_default();
		names.sort();
		names
	}

	pub fn init_scripts(&self) -> Vec<String> {
		self.state.lock().init_scripts.clone()
	}

	/// Calls a binding the way page code would.
	pub async fn call_binding(&self, world: &str, name: &str, args: Vec<RemoteValue>) -> Result<SerializedArgument> {
		let binding = {
			let state = self.state.lock();
			world_ref(&state, &WorldId::from(world))?
				.bindings
				.get(name)
				.cloned()
				.ok_or_else(|| remote_error(&format!("{name} is not defined")))?
		};
		binding(args).await
	}

	/// Elements pulled off remote iterators so far.
	pub fn pulled(&self) -> usize {
		self.state.lock().pulled
	}

	fn evaluate_sync(
		&self,
		world: &WorldId,
		function: &str,
		args: Vec<SerializedArgument>,
		by_value: bool,
	) -> Result<RemoteValue> {
		let mut state = self.state.lock();
		let args = decode_args(&state, world, args)?;

		let result = match function {
			js::UTILITY_SOURCE => return Ok(alloc(&mut state, world, Object::Util, RemoteType::Object)),
			js::DOCUMENT => Item::Node(0),
			js::CSS_QUERY_ALL | ENGINE_ALL_CSS => {
				let nodes = css_all(&state.dom, node_arg(&args, 0)?, &string_arg(&args, 1)?);
				return Ok(array_or_iter(&mut state, world, nodes, function == ENGINE_ALL_CSS));
			}
			ENGINE_ALL_FOO | ENGINE_ALL_LI => {
				let fixed = if function == ENGINE_ALL_FOO { ".foo" } else { "li" };
				let nodes = css_all(&state.dom, node_arg(&args, 0)?, fixed);
				return Ok(array_or_iter(&mut state, world, nodes, true));
			}
			js::CSS_QUERY_ONE | ENGINE_ONE_CSS => {
				match css_all(&state.dom, node_arg(&args, 0)?, &string_arg(&args, 1)?).first() {
					Some(node) => Item::Node(*node),
					None => Item::Value(Value::Null),
				}
			}
			js::ITERATOR_FROM => {
				let iter = match args.first() {
					Some(Arg::Object(Object::Array(items))) => Arc::new(Mutex::new(IterState {
						items: items.clone(),
						position: 0,
					})),
					Some(Arg::Object(Object::Iter(iter))) => iter.clone(),
					_ => return Err(remote_error("object is not iterable")),
				};
				return Ok(alloc(&mut state, world, Object::Iter(iter), RemoteType::Iterator));
			}
			js::ITERATOR_NEXT_BATCH => {
				let Some(Arg::Object(Object::Iter(iter))) = args.first() else {
					return Err(remote_error("iterator.next is not a function"));
				};
				let size = match args.get(1) {
					Some(Arg::Value(size)) => size.as_u64().unwrap_or(0) as usize,
					_ => 0,
				};
				let batch: Vec<Item> = {
					let mut iter = iter.lock();
					let end = (iter.position + size).min(iter.items.len());
					let batch = iter.items[iter.position..end].to_vec();
					iter.position = end;
					batch
				};
				state.pulled += batch.len();
				return Ok(alloc(&mut state, world, Object::Array(batch), RemoteType::Array));
			}
			js::OWN_PROPERTY_NAMES => {
				let names: Vec<Value> = match args.first() {
					Some(Arg::Object(Object::Array(items))) => (0..items.len()).map(|i| json!(i.to_string())).collect(),
					_ => Vec::new(),
				};
				Item::Value(Value::Array(names))
			}
			js::GET_PROPERTY => {
				let name = string_arg(&args, 1)?;
				match args.first() {
					Some(Arg::Object(Object::Array(items))) => name
						.parse::<usize>()
						.ok()
						.and_then(|index| items.get(index).cloned())
						.unwrap_or(Item::Value(Value::Null)),
					Some(Arg::Object(Object::Node(index))) => {
						let node = &state.dom[*index];
						match name.as_str() {
							"id" => Item::Value(json!(node.id.clone().unwrap_or_default())),
							"tagName" => Item::Value(json!(node.tag.to_uppercase())),
							_ => return Ok(RemoteValue::undefined()),
						}
					}
					_ => return Ok(RemoteValue::undefined()),
				}
			}
			js::IDENTITY => match args.into_iter().next() {
				Some(Arg::Value(value)) => Item::Value(value),
				Some(Arg::Object(_)) => Item::Value(json!({})),
				None => return Ok(RemoteValue::undefined()),
			},
			js::COLLECT => {
				let items = args
					.into_iter()
					.map(|arg| match arg {
						Arg::Object(Object::Node(index)) => Item::Node(index),
						Arg::Value(value) => Item::Value(value),
						Arg::Object(_) => Item::Value(json!({})),
					})
					.collect();
				return Ok(alloc(&mut state, world, Object::Array(items), RemoteType::Array));
			}
			js::CHECK_VISIBILITY => {
				let index = node_arg(&args, 0)?;
				if !matches!(args.get(1), Some(Arg::Object(Object::Util))) {
					return Err(remote_error("util is not defined"));
				}
				Item::Value(json!(state.dom[index].visible && state.dom[index].attached))
			}
			js::ARIA_RESOLVER_INIT => {
				world_mut(&mut state, world)?.aria_resolver = true;
				return Ok(RemoteValue::undefined());
			}
			js::EXPOSE_CUSTOM_ENGINE => {
				let name = string_arg(&args, 0)?;
				if state.fail_expose.contains(&name) {
					return Err(remote_error(&format!("SyntaxError in engine {name}")));
				}
				let all = optional_string_arg(&args, 1);
				let one = optional_string_arg(&args, 2);
				world_mut(&mut state, world)?.exposed.insert(name, (all, one));
				return Ok(RemoteValue::undefined());
			}
			_ => return Err(remote_error(&format!("unsupported function: {function}"))),
		};

		Ok(match result {
			Item::Node(index) if !by_value => alloc(&mut state, world, Object::Node(index), RemoteType::Node),
			Item::Node(_) => RemoteValue::primitive(&json!({})),
			Item::Value(value) => RemoteValue::primitive(&value),
		})
	}

	async fn p_query(&self, world: &WorldId, all: bool, args: Vec<SerializedArgument>) -> Result<RemoteValue> {
		let (root, steps) = {
			let state = self.state.lock();
			let args = decode_args(&state, world, args)?;
			if !matches!(args.get(2), Some(Arg::Object(Object::Util))) {
				return Err(remote_error("util is not defined"));
			}
			let steps = match args.get(1) {
				Some(Arg::Value(Value::Array(steps))) => steps.clone(),
				_ => return Err(remote_error("steps must be an array")),
			};
			(node_arg(&args, 0)?, steps)
		};

		let mut roots = vec![root];
		for (position, step) in steps.into_iter().enumerate() {
			let expression = step["expression"].as_str().unwrap_or_default().to_owned();
			let mut next = Vec::new();
			for current in roots {
				let found = match step["engine"].as_str() {
					Some("css") => self.css_step(current, &expression, position > 0),
					Some("custom") => {
						let name = step["name"].as_str().unwrap_or_default();
						self.run_exposed(world, name, current, &expression)?
					}
					Some("aria") => self.call_aria_binding(world, current, &expression).await?,
					_ => return Err(remote_error("unknown step")),
				};
				next.extend(found);
			}
			next.sort_unstable();
			next.dedup();
			roots = next;
		}

		let mut state = self.state.lock();
		if all {
			let items = roots.into_iter().map(Item::Node).collect();
			let iter = Arc::new(Mutex::new(IterState { items, position: 0 }));
			return Ok(alloc(&mut state, world, Object::Iter(iter), RemoteType::Generator));
		}
		Ok(match roots.first() {
			Some(index) => alloc(&mut state, world, Object::Node(*index), RemoteType::Node),
			None => RemoteValue::primitive(&Value::Null),
		})
	}

	fn css_step(&self, root: usize, selector: &str, chained: bool) -> Vec<usize> {
		let state = self.state.lock();
		let mut found = css_all(&state.dom, root, selector);
		if chained && !selector.trim_start().starts_with('>') && css_matches(&state.dom, root, selector) {
			found.insert(0, root);
		}
		found
	}

	fn run_exposed(&self, world: &WorldId, name: &str, root: usize, expression: &str) -> Result<Vec<usize>> {
		let state = self.state.lock();
		let Some((all, one)) = world_ref(&state, world)?.exposed.get(name).cloned() else {
			return Err(remote_error(&format!("Unknown query handler: {name}")));
		};
		let source = all.or(one).unwrap_or_default();
		let nodes = match source.as_str() {
			ENGINE_ALL_FOO => css_all(&state.dom, root, ".foo"),
			ENGINE_ALL_LI => css_all(&state.dom, root, "li"),
			ENGINE_ALL_CSS => css_all(&state.dom, root, expression),
			ENGINE_ONE_CSS => css_all(&state.dom, root, expression).into_iter().take(1).collect(),
			_ => return Err(remote_error("engine source is not understood")),
		};
		Ok(nodes)
	}

	async fn call_aria_binding(&self, world: &WorldId, root: usize, selector: &str) -> Result<Vec<usize>> {
		let (binding, root_ref) = {
			let mut state = self.state.lock();
			let binding = world_ref(&state, world)?
				.bindings
				.get("__ariaQuerySelectorAll")
				.cloned()
				.ok_or_else(|| remote_error("__ariaQuerySelectorAll is not defined"))?;
			let root_ref = alloc(&mut state, world, Object::Node(root), RemoteType::Node);
			(binding, root_ref)
		};

		let result = binding(vec![root_ref, RemoteValue::primitive(&json!(selector))]).await?;
		let SerializedArgument::Handle(array) = result else {
			return Err(remote_error("binding did not return an array"));
		};

		// The binding handed the array over; it is ours to release.
		let mut state = self.state.lock();
		let world_state = world_mut(&mut state, world)?;
		match world_state.objects.remove(&array.0) {
			Some(Object::Array(items)) => Ok(items
				.into_iter()
				.filter_map(|item| match item {
					Item::Node(index) => Some(index),
					Item::Value(_) => None,
				})
				.collect()),
			_ => Err(remote_error("binding result is not an array")),
		}
	}
}

impl RealmConnection for FakeBrowser {
	fn evaluate<'a>(
		&'a self,
		world: &'a WorldId,
		function: &'a str,
		args: Vec<SerializedArgument>,
		return_by_value: bool,
	) -> BoxFuture<'a, Result<RemoteValue>> {
		Box::pin(async move {
			{
				let mut state = self.state.lock();
				world_ref(&state, world)?;
				state.calls.push((world.clone(), function.to_owned()));
			}
			match function {
				js::P_QUERY_ALL => self.p_query(world, true, args).await,
				js::P_QUERY_ONE => self.p_query(world, false, args).await,
				_ => self.evaluate_sync(world, function, args, return_by_value),
			}
		})
	}

	fn create_binding<'a>(
		&'a self,
		world: &'a WorldId,
		name: &'a str,
		callback: RawBindingFn,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			// A real transport round-trips here.
			tokio::task::yield_now().await;
			let mut state = self.state.lock();
			world_mut(&mut state, world)?.bindings.insert(name.to_owned(), callback);
			state.binding_registrations.push((world.clone(), name.to_owned()));
			Ok(())
		})
	}

	fn release_object<'a>(&'a self, world: &'a WorldId, object: &'a RemoteObjectId) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = self.state.lock();
			world_mut(&mut state, world)?.objects.remove(&object.0);
			state.released.push((world.clone(), object.clone()));
			Ok(())
		})
	}

	fn describe_node<'a>(
		&'a self,
		world: &'a WorldId,
		object: &'a RemoteObjectId,
	) -> BoxFuture<'a, Result<BackendNodeId>> {
		Box::pin(async move {
			let state = self.state.lock();
			match world_ref(&state, world)?.objects.get(&object.0) {
				Some(Object::Node(index)) => Ok(BackendNodeId(*index as u64)),
				_ => Err(remote_error("Could not find node with given id")),
			}
		})
	}

	fn resolve_node<'a>(&'a self, world: &'a WorldId, node: BackendNodeId) -> BoxFuture<'a, Result<RemoteValue>> {
		Box::pin(async move {
			let delay = *self.resolve_delay.lock();
			if let Some(delay) = delay {
				tokio::time::sleep(delay).await;
			}
			let mut state = self.state.lock();
			world_ref(&state, world)?;
			let index = node.0 as usize;
			if !state.dom.get(index).is_some_and(|node| node.attached) {
				return Err(remote_error("No node with given id found"));
			}
			Ok(alloc(&mut state, world, Object::Node(index), RemoteType::Node))
		})
	}

	fn add_init_script<'a>(&'a self, _page: &'a PageId, source: &'a str) -> BoxFuture<'a, Result<ScriptId>> {
		Box::pin(async move {
			let mut state = self.state.lock();
			state.init_scripts.push(source.to_owned());
			Ok(ScriptId(format!("script-{}", state.init_scripts.len())))
		})
	}

	fn query_accessibility_tree<'a>(
		&'a self,
		world: &'a WorldId,
		root: &'a RemoteObjectId,
		name: Option<&'a str>,
		role: Option<&'a str>,
	) -> BoxFuture<'a, Result<Vec<BackendNodeId>>> {
		Box::pin(async move {
			let state = self.state.lock();
			let root = match world_ref(&state, world)?.objects.get(&root.0) {
				Some(Object::Node(index)) => *index,
				_ => return Err(remote_error("root is not a node")),
			};
			Ok((1..state.dom.len())
				.filter(|&index| is_connected_below(&state.dom, index, root))
				.filter(|&index| {
					let node = &state.dom[index];
					(node.role.is_some() || node.name.is_some())
						&& name.is_none_or(|name| node.name.as_deref() == Some(name))
						&& role.is_none_or(|role| node.role.as_deref() == Some(role))
				})
				.map(|index| BackendNodeId(index as u64))
				.collect())
		})
	}
}

fn world_ref<'s>(state: &'s State, world: &WorldId) -> Result<&'s WorldState> {
	match state.worlds.get(world) {
		Some(world) if world.alive => Ok(world),
		Some(_) => Err(remote_error("Execution context was destroyed")),
		None => Err(remote_error("Cannot find context with specified id")),
	}
}

fn world_mut<'s>(state: &'s mut State, world: &WorldId) -> Result<&'s mut WorldState> {
	match state.worlds.get_mut(world) {
		Some(world) if world.alive => Ok(world),
		Some(_) => Err(remote_error("Execution context was destroyed")),
		None => Err(remote_error("Cannot find context with specified id")),
	}
}

fn alloc(state: &mut State, world: &WorldId, object: Object, kind: RemoteType) -> RemoteValue {
	state.next_object += 1;
	let id = format!("{world}:obj{}", state.next_object);
	if let Some(world) = state.worlds.get_mut(world) {
		world.objects.insert(id.clone(), object);
	}
	RemoteValue::reference(kind, id)
}

fn array_or_iter(state: &mut State, world: &WorldId, nodes: Vec<usize>, lazy: bool) -> RemoteValue {
	let items: Vec<Item> = nodes.into_iter().map(Item::Node).collect();
	if lazy {
		let iter = Arc::new(Mutex::new(IterState { items, position: 0 }));
		alloc(state, world, Object::Iter(iter), RemoteType::Generator)
	} else {
		alloc(state, world, Object::Array(items), RemoteType::Array)
	}
}

fn decode_args(state: &State, world: &WorldId, args: Vec<SerializedArgument>) -> Result<Vec<Arg>> {
	let world = world_ref(state, world)?;
	args.into_iter()
		.map(|arg| match arg {
			SerializedArgument::Value(value) => Ok(Arg::Value(from_protocol_value(&value)?)),
			SerializedArgument::Handle(id) => world
				.objects
				.get(&id.0)
				.cloned()
				.map(Arg::Object)
				.ok_or_else(|| remote_error(&format!("Could not find object with given id {id}"))),
		})
		.collect()
}

fn node_arg(args: &[Arg], position: usize) -> Result<usize> {
	match args.get(position) {
		Some(Arg::Object(Object::Node(index))) => Ok(*index),
		_ => Err(remote_error("argument is not a node")),
	}
}

fn string_arg(args: &[Arg], position: usize) -> Result<String> {
	match args.get(position) {
		Some(Arg::Value(Value::String(value))) => Ok(value.clone()),
		_ => Err(remote_error("argument is not a string")),
	}
}

fn optional_string_arg(args: &[Arg], position: usize) -> Option<String> {
	match args.get(position) {
		Some(Arg::Value(Value::String(value))) => Some(value.clone()),
		_ => None,
	}
}

fn find_by_id(dom: &[Node], id: &str) -> Option<usize> {
	dom.iter()
		.position(|node| node.attached && node.id.as_deref() == Some(id))
}

/// True if `index` is attached and a strict descendant of `root`.
fn is_connected_below(dom: &[Node], index: usize, root: usize) -> bool {
	if index == root {
		return false;
	}
	let mut below_root = false;
	let mut current = Some(index);
	while let Some(i) = current {
		if !dom[i].attached {
			return false;
		}
		below_root |= i == root;
		current = dom[i].parent;
	}
	below_root
}

#[derive(Debug, Default)]
struct Compound {
	tag: Option<String>,
	id: Option<String>,
	classes: Vec<String>,
}

fn parse_compound(spec: &str) -> Compound {
	let mut compound = Compound::default();
	let mut kind = 't';
	let mut current = String::new();
	for ch in spec.chars() {
		if ch == '#' || ch == '.' {
			flush(kind, &mut current, &mut compound);
			kind = ch;
		} else {
			current.push(ch);
		}
	}
	flush(kind, &mut current, &mut compound);
	compound
}

fn flush(kind: char, current: &mut String, compound: &mut Compound) {
	if current.is_empty() {
		return;
	}
	let value = std::mem::take(current);
	match kind {
		'#' => compound.id = Some(value),
		'.' => compound.classes.push(value),
		_ if value != "*" => compound.tag = Some(value),
		_ => {}
	}
}

fn compound_matches(node: &Node, compound: &Compound) -> bool {
	node.tag != "#document"
		&& compound.tag.as_ref().is_none_or(|tag| *tag == node.tag)
		&& compound.id.as_ref().is_none_or(|id| node.id.as_ref() == Some(id))
		&& compound.classes.iter().all(|class| node.classes.contains(class))
}

/// Descendant (` `) and child (`>`) combinators over simple compounds. A
/// leading `>` anchors the first compound to the children of `root`.
fn css_all(dom: &[Node], root: usize, selector: &str) -> Vec<usize> {
	let parts = parse_parts(selector);
	if parts.is_empty() {
		return Vec::new();
	}
	(1..dom.len())
		.filter(|&index| is_connected_below(dom, index, root))
		.filter(|&index| matches_from(dom, index, &parts, parts.len() - 1, Some(root)))
		.collect()
}

/// `Element.matches` for `index`, ancestors unrestricted.
fn css_matches(dom: &[Node], index: usize, selector: &str) -> bool {
	let parts = parse_parts(selector);
	!parts.is_empty() && matches_from(dom, index, &parts, parts.len() - 1, None)
}

fn parse_parts(selector: &str) -> Vec<(bool, Compound)> {
	let mut parts: Vec<(bool, Compound)> = Vec::new();
	let mut child = false;
	for token in selector.split_whitespace() {
		if token == ">" {
			child = true;
			continue;
		}
		parts.push((child, parse_compound(token)));
		child = false;
	}
	parts
}

fn matches_from(dom: &[Node], index: usize, parts: &[(bool, Compound)], at: usize, scope: Option<usize>) -> bool {
	if !compound_matches(&dom[index], &parts[at].1) {
		return false;
	}
	if at == 0 {
		return match scope {
			Some(root) if parts[0].0 => dom[index].parent == Some(root),
			_ => true,
		};
	}
	let child = parts[at].0;
	let mut current = dom[index].parent;
	while let Some(parent) = current {
		if matches_from(dom, parent, parts, at - 1, scope) {
			return true;
		}
		if child {
			break;
		}
		current = dom[parent].parent;
	}
	false
}

/// A page with one frame whose worlds live in a [`FakeBrowser`].
pub struct Harness {
	pub browser: Arc<FakeBrowser>,
	pub page: Page,
	pub frame: Frame,
	generation: AtomicUsize,
}

impl Harness {
	pub fn new() -> Self {
		Self::with_settings(QuerySettings::default())
	}

	pub fn with_settings(settings: QuerySettings) -> Self {
		init_tracing();
		let browser = Arc::new(FakeBrowser::default());
		let page = Page::with_settings(PageId::from("page-1"), browser.clone(), settings);
		let frame = page.attach_frame("frame-1");
		let harness = Self {
			browser,
			page,
			frame,
			generation: AtomicUsize::new(1),
		};
		harness.create_worlds(1);
		harness
	}

	fn create_worlds(&self, generation: usize) {
		for kind in [WorldKind::Main, WorldKind::Isolated] {
			let id = world_name(kind, generation);
			self.browser.create_world(&id);
			self.frame.on_context_created(kind, WorldId::from(id.as_str()));
		}
	}

	/// Tears both worlds down and installs the next generation.
	pub fn navigate(&self) {
		self.browser.kill_worlds();
		self.frame.on_navigated();
		let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
		self.create_worlds(generation);
	}

	pub fn detach(&self) {
		self.browser.kill_worlds();
		self.frame.on_detached();
	}

	pub fn generation(&self) -> usize {
		self.generation.load(Ordering::SeqCst)
	}

	pub async fn main(&self) -> World {
		self.frame.main_world().await.expect("main world")
	}

	pub async fn isolated(&self) -> World {
		self.frame.isolated_world().await.expect("isolated world")
	}
}

pub fn world_name(kind: WorldKind, generation: usize) -> String {
	format!("{kind}-{generation}")
}

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}
