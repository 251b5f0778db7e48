//! Key-value storage for keepsake.
//!
//! Session state is persisted through the `KeyValueStore` trait, with a
//! file-based backend for durable storage and an in-memory backend for
//! tests.

pub mod file;
pub mod memory;
pub mod traits;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use traits::KeyValueStore;
