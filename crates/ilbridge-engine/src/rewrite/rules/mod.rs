//! Rule registry: the rewrite rules shipped with the engine.

pub mod callback_handle;
pub mod interface_call;
pub mod worker_types;

pub use callback_handle::CallbackHandleRewriter;
pub use interface_call::InterfaceCallRewriter;
pub use worker_types::WorkerTypeCollector;
