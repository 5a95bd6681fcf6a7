//! Test doubles for the storage tiers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::MessageStore;
use crate::error::{Error, Result};
use crate::types::{Message, Role, StoreCounts};

/// A primary that is always down.
pub(crate) struct UnavailableStore {
    pub calls: AtomicUsize,
}

impl UnavailableStore {
    pub(crate) fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn fail<T>(&self) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::StorageUnavailable("connection refused".into()))
    }
}

#[async_trait]
impl MessageStore for UnavailableStore {
    fn name(&self) -> &'static str {
        "unavailable"
    }
    async fn append(&self, _: &str, _: Role, _: &str, _: Option<&str>) -> Result<Message> {
        self.fail()
    }
    async fn recent(&self, _: &str, _: usize) -> Result<Vec<Message>> {
        self.fail()
    }
    async fn delete_before(&self, _: DateTime<Utc>) -> Result<usize> {
        self.fail()
    }
    async fn delete_session(&self, _: &str) -> Result<usize> {
        self.fail()
    }
    async fn session_ids(&self) -> Result<Vec<String>> {
        self.fail()
    }
    async fn counts(&self) -> Result<StoreCounts> {
        self.fail()
    }
    async fn ping(&self) -> Result<()> {
        self.fail()
    }
}
