//! pwq: remote handles, execution worlds and pluggable selector engines
//!
//! This crate is the query layer of a browser-automation client. It owns the
//! lifecycle of handles to remote JavaScript values and resolves CSS, ARIA and
//! custom selectors against a remote document. The transport is abstracted
//! behind [`RealmConnection`](pwq_runtime::RealmConnection).
//!
//! # Examples
//!
//! ## Querying a frame
//!
//! ```ignore
//! use pwq::{Page, WaitForSelectorOptions, WorldKind};
//!
//! let page = Page::new("page-1".into(), connection);
//! let frame = page.attach_frame("main");
//! frame.on_context_created(WorldKind::Main, "ctx-1".into());
//! frame.on_context_created(WorldKind::Isolated, "ctx-2".into());
//!
//! let items = frame.query_selector_all("ul > li").await?;
//! let submit = frame.query_selector("form aria/Submit").await?;
//! let late = frame
//!     .wait_for_selector("#late", WaitForSelectorOptions::new().timeout(1_000.0))
//!     .await?;
//! ```
//!
//! ## Custom engines
//!
//! ```ignore
//! use pwq::{CustomQueryHandler, CustomQuerySource, register_custom_query_handler};
//!
//! register_custom_query_handler(
//!     "items",
//!     CustomQueryHandler::new(
//!         CustomQuerySource::new().query_all("(root, selector) => root.querySelectorAll(`[data-item=${selector}]`)"),
//!     )?,
//! )?;
//! let first = frame.query_selector("items/featured").await?;
//! ```
//!
//! # Handle ownership
//!
//! [`JsHandle`] and [`ElementHandle`] are not `Clone`. Dispose them explicitly
//! or move them on; a live handle that is dropped is released in the
//! background on the current tokio runtime.

mod element_handle;
mod frame;
mod handle;
mod handle_iterator;
pub mod js;
mod lazy_arg;
mod page;
pub mod query_handler;
pub mod selector;
pub mod settings;
pub mod wait_task;
mod world;

pub use element_handle::ElementHandle;
pub use frame::Frame;
pub use handle::JsHandle;
pub use js::PageFunction;
pub use lazy_arg::LazyArg;
pub use page::Page;
pub use pwq_protocol::{
	BackendNodeId, PageId, RemoteObjectId, RemoteType, RemoteValue, ScriptId, SerializedArgument,
	WaitForSelectorOptions, WorldId, WorldKind,
};
pub use pwq_runtime::{BoxFuture, Error, RawBindingFn, RealmConnection, Result};
pub use query_handler::{
	AriaQuery, AriaQueryHandler, CssQueryHandler, CustomQueryHandler, CustomQueryRegistry,
	CustomQuerySource, HandleStream, PQueryHandler, Primitive, QueryHandler, clear_custom_query_handlers,
	custom_query_handler_names, get_query_handler_and_selector, parse_aria_selector,
	register_custom_query_handler, unregister_custom_query_handler,
};
pub use selector::{SelectorStep, parse_selector};
pub use settings::QuerySettings;
pub use wait_task::WaitTarget;
pub use world::{BindingFn, BindingResult, Bindings, EvalArg, World, binding_fn};
