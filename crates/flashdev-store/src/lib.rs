pub mod context;
pub mod select;

pub use context::{BlockContext, IoStats};
pub use select::{open_backend, BackendKind};
