//! todolist-lib: todo storage, domain events, and live fan-out to SSE subscribers

pub mod cancel;
pub mod db;
pub mod message;
pub mod registry;
pub mod session;
pub mod sink;

// re-exports for ergonomic imports:
pub use cancel::TerminalCause;
pub use db::{DbError, TodoStore};
pub use message::{ItemEvent, ListEvent, TodoItem, TodoList};
pub use registry::Registry;
pub use session::{Session, SessionError};
pub use sink::{CloseNotify, Sink};
