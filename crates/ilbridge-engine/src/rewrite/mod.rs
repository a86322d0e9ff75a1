//! Bytecode rewriting
//!
//! Removes the indirection forms a reflection-free native host cannot
//! resolve, and records what the native glue needs to know about them.
//!
//! # Architecture
//!
//! - Each rule implements [`RewriteRule`] and handles individual
//!   instructions, one hook per instruction category.
//! - The [`Rewriter`] walks every method body once and dispatches each
//!   instruction to all registered rules, in registration order.
//! - Rules receive their collaborators ([`TypeRewriteRegistry`],
//!   [`CallbackRegistry`], [`WorkerFactory`]) at construction, and hand their
//!   side tables back once the pass is over.
//!
//! # Example
//!
//! ```ignore
//! use ilbridge_engine::rewrite::*;
//!
//! let mut interfaces = InterfaceCallRewriter::new(registry);
//! let mut callbacks = CallbackHandleRewriter::new(CallbackTable::new());
//! let mut workers = WorkerTypeCollector::new(config.worker_factory.clone());
//!
//! Rewriter::new(config)
//!     .register(&mut interfaces)
//!     .register(&mut callbacks)
//!     .register(&mut workers)
//!     .run(&mut module)?;
//!
//! let table = callbacks.into_registry();
//! let worker_types = workers.into_types();
//! ```

pub mod config;
mod error;
pub mod registry;
pub mod rule;
pub mod rules;
mod runner;

pub use config::{RewriteConfig, WorkerFactory};
pub use error::RewriteError;
pub use registry::{CallbackEntry, CallbackRegistry, CallbackTable, StaticTypeRegistry, TypeRewriteRegistry};
pub use rule::{RewriteContext, RewriteRule};
pub use rules::{CallbackHandleRewriter, InterfaceCallRewriter, WorkerTypeCollector};
pub use runner::{PassReport, Rewriter};
