//! ilbridge Engine
//!
//! This crate provides the two build stages of the managed-to-native bridge:
//! - **Rewrite** (`rewrite` module): a single pass over a module's method
//!   bodies that resolves designated interfaces statically, turns
//!   native-callback delegates into integer handles, and collects worker
//!   types.
//! - **Glue** (`glue` module): generation of the C translation unit that
//!   links the AOT-compiled program with the native runtime.
//!
//! Settings for both live in [`BridgeConfig`].

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod glue;
pub mod rewrite;

pub use config::{BridgeConfig, ConfigError};
pub use glue::{GlueConfig, GlueError, GlueGenerator, GlueSummary};
pub use rewrite::{
    CallbackHandleRewriter, CallbackTable, InterfaceCallRewriter, PassReport, RewriteConfig, RewriteError,
    RewriteRule, Rewriter, StaticTypeRegistry, WorkerTypeCollector,
};
