//! keepsake - persistent client-side session state
//!
//! keepsake keeps an access token and an arbitrary JSON user record in a
//! durable key-value store, tracks an expiry deadline, and repairs partial
//! or expired state lazily when the session is checked.
//!
//! ```no_run
//! use keepsake::{MemoryStore, SessionStore};
//! use serde_json::json;
//!
//! let session = SessionStore::new(MemoryStore::new());
//! session.create("token", Some(json!({"name": "a"})), Some(30))?;
//! assert!(session.exists()?);
//! # Ok::<(), keepsake::KeepsakeError>(())
//! ```

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod reload;
pub mod session;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{KeepsakeError, Result};
pub use reload::{NoReload, Reload};
pub use session::{SessionKeys, SessionStore, EXPIRE_AT_KEY, SESSION_TIME_KEY};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
