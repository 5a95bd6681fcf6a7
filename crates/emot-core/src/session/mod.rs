//! Session state.
//!
//! ```text
//! SessionManager
//!   ├─► TieredStore (SQLite primary, JSON file fallback)
//!   ├─► SessionDirectory (<id>_metadata.json)
//!   └─► HistoryCache (optional, invalidated on append)
//! ```

mod cache;
mod directory;
mod manager;

pub use directory::SessionDirectory;
pub use manager::SessionManager;
