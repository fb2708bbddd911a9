use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::{DocumentStore, VersionToken, VersionedDocument};
use crate::error::StoreError;

/// In-process versioned store. Clones share the same documents.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<RwLock<BTreeMap<String, (serde_json::Value, VersionToken)>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn read(&self, key: &str) -> Result<VersionedDocument, StoreError> {
        let documents = self.documents.read();
        Ok(match documents.get(key) {
            Some((body, version)) => VersionedDocument {
                body: Some(body.clone()),
                version: *version,
            },
            None => VersionedDocument::absent(),
        })
    }

    async fn write(
        &self,
        key: &str,
        body: serde_json::Value,
        expected: VersionToken,
    ) -> Result<VersionToken, StoreError> {
        let mut documents = self.documents.write();
        let actual = documents
            .get(key)
            .map(|(_, version)| *version)
            .unwrap_or(VersionToken::ABSENT);

        if actual != expected {
            debug!("⚠ CAS rejected on {}: expected {}, found {}", key, expected, actual);
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected,
                actual,
            });
        }

        let next = actual.next();
        documents.insert(key.to_string(), (body, next));
        Ok(next)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let documents = self.documents.read();
        Ok(documents
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_key_reads_absent() {
        let store = MemoryDocumentStore::new();
        let doc = store.read("nothing").await.unwrap();
        assert_eq!(doc, VersionedDocument::absent());
    }

    #[tokio::test]
    async fn test_cas_write_advances_version() {
        let store = MemoryDocumentStore::new();

        let v1 = store.write("k", json!({"a": 1}), VersionToken::ABSENT).await.unwrap();
        assert_eq!(v1, VersionToken(1));

        let v2 = store.write("k", json!({"a": 2}), v1).await.unwrap();
        assert_eq!(v2, VersionToken(2));

        let doc = store.read("k").await.unwrap();
        assert_eq!(doc.body, Some(json!({"a": 2})));
        assert_eq!(doc.version, v2);
    }

    #[tokio::test]
    async fn test_stale_token_conflicts() {
        let store = MemoryDocumentStore::new();
        let v1 = store.write("k", json!(1), VersionToken::ABSENT).await.unwrap();
        store.write("k", json!(2), v1).await.unwrap();

        let err = store.write("k", json!(3), v1).await.unwrap_err();
        match err {
            StoreError::Conflict { expected, actual, .. } => {
                assert_eq!(expected, VersionToken(1));
                assert_eq!(actual, VersionToken(2));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Creating an existing key is also a conflict
        assert!(store
            .write("k", json!(4), VersionToken::ABSENT)
            .await
            .unwrap_err()
            .is_conflict());
    }

    #[tokio::test]
    async fn test_keys_with_prefix() {
        let store = MemoryDocumentStore::new();
        for key in ["balances/ana", "balances/bo", "wagers", "outcomes"] {
            store.write(key, json!({}), VersionToken::ABSENT).await.unwrap();
        }

        let keys = store.keys_with_prefix("balances/").await.unwrap();
        assert_eq!(keys, vec!["balances/ana".to_string(), "balances/bo".to_string()]);
        assert_eq!(store.len(), 4);
    }
}
