//! Versioned document store.
//!
//! Every document carries a [`VersionToken`]. A write is accepted only when the
//! caller presents the token it read; otherwise the store answers
//! [`StoreError::Conflict`] and the caller must re-read before trying again.
//! There is no multi-document commit.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::StoreError;

pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;

/// Content version of a stored document. `ABSENT` is the token of a key that
/// has never been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionToken(pub i64);

impl VersionToken {
    pub const ABSENT: VersionToken = VersionToken(0);

    pub fn next(self) -> Self {
        VersionToken(self.0 + 1)
    }

    pub fn is_absent(&self) -> bool {
        *self == Self::ABSENT
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A document body together with the version it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedDocument {
    pub body: Option<serde_json::Value>,
    pub version: VersionToken,
}

impl VersionedDocument {
    pub fn absent() -> Self {
        Self {
            body: None,
            version: VersionToken::ABSENT,
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Read a document. Missing keys come back as `VersionedDocument::absent()`.
    async fn read(&self, key: &str) -> Result<VersionedDocument, StoreError>;

    /// Compare-and-set write. Returns the new version on success.
    async fn write(
        &self,
        key: &str,
        body: serde_json::Value,
        expected: VersionToken,
    ) -> Result<VersionToken, StoreError>;

    /// Keys starting with `prefix`, sorted.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Store wrappers that inject failures into an inner store.

    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Fails every write whose key starts with `prefix` once `remaining`
    /// successful writes to such keys have gone through.
    pub struct FailingStore {
        inner: Arc<dyn DocumentStore>,
        prefix: String,
        remaining: AtomicUsize,
        failing: std::sync::atomic::AtomicBool,
    }

    impl FailingStore {
        pub fn new(inner: Arc<dyn DocumentStore>, prefix: &str, successful_writes: usize) -> Self {
            Self {
                inner,
                prefix: prefix.to_string(),
                remaining: AtomicUsize::new(successful_writes),
                failing: std::sync::atomic::AtomicBool::new(true),
            }
        }

        pub fn heal(&self) {
            self.failing.store(false, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl DocumentStore for FailingStore {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn read(&self, key: &str) -> Result<VersionedDocument, StoreError> {
            self.inner.read(key).await
        }

        async fn write(
            &self,
            key: &str,
            body: serde_json::Value,
            expected: VersionToken,
        ) -> Result<VersionToken, StoreError> {
            if self.failing.load(Ordering::SeqCst) && key.starts_with(&self.prefix) {
                let left = self.remaining.load(Ordering::SeqCst);
                if left == 0 {
                    return Err(StoreError::Backend("injected write failure".into()));
                }
                self.remaining.store(left - 1, Ordering::SeqCst);
            }
            self.inner.write(key, body, expected).await
        }

        async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            self.inner.keys_with_prefix(prefix).await
        }
    }

    /// Simulates a concurrent writer: before each of the first `conflicts`
    /// writes to `key`, applies `interfere` to the stored document so the
    /// caller's token goes stale.
    pub struct InterferingStore {
        inner: Arc<dyn DocumentStore>,
        key: String,
        conflicts: AtomicUsize,
        interfere: Mutex<Box<dyn FnMut(&mut serde_json::Value) + Send>>,
    }

    impl InterferingStore {
        pub fn new(
            inner: Arc<dyn DocumentStore>,
            key: &str,
            conflicts: usize,
            interfere: impl FnMut(&mut serde_json::Value) + Send + 'static,
        ) -> Self {
            Self {
                inner,
                key: key.to_string(),
                conflicts: AtomicUsize::new(conflicts),
                interfere: Mutex::new(Box::new(interfere)),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for InterferingStore {
        fn name(&self) -> &'static str {
            "interfering"
        }

        async fn read(&self, key: &str) -> Result<VersionedDocument, StoreError> {
            self.inner.read(key).await
        }

        async fn write(
            &self,
            key: &str,
            body: serde_json::Value,
            expected: VersionToken,
        ) -> Result<VersionToken, StoreError> {
            if key == self.key && self.conflicts.load(Ordering::SeqCst) > 0 {
                self.conflicts.fetch_sub(1, Ordering::SeqCst);
                let current = self.inner.read(key).await?;
                let mut doc = current.body.unwrap_or(serde_json::Value::Null);
                (self.interfere.lock())(&mut doc);
                self.inner.write(key, doc, current.version).await?;
            }
            self.inner.write(key, body, expected).await
        }

        async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            self.inner.keys_with_prefix(prefix).await
        }
    }
}
