//! Locking primitives shared by the engine and the CLI.

mod store_lock;

pub use store_lock::{STORE_LOCK_FILENAME, StoreLock, StoreLockGuard};
