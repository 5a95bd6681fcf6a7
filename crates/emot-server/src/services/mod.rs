//! Service layer for emot-server
//!
//! Background work that runs alongside the HTTP listener.

pub mod sweeper;

pub use sweeper::Sweeper;
