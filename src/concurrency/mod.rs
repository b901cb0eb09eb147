//! Cross-process coordination helpers.

pub mod path_lock;

pub use path_lock::{PathLock, PathLockGuard};
