//! In-memory registry of per-account heartbeat state.
//!
//! The terminal pushes snapshots, the UI polls them and selects one account
//! as "active". Everything lives behind a single lock: the registry map and
//! the active-selection cell must be mutated together so a reconciled read
//! never races a concurrent ingest or selection change.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use domain::{AccountSnapshot, ConnectionStatus, StatusReport};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;

/// Expected, recoverable outcomes. None of these are faults; handlers turn
/// them into structured error bodies.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("heartbeat did not include an account login")]
    MissingIdentifier,
    #[error("No account selected")]
    NoIdentifierProvided,
    #[error("account id must contain only digits, got {0:?}")]
    InvalidIdentifier(String),
    #[error("No data received yet for account {0}")]
    NotFound(String),
}

/// Names of the fields written by one ingestion, echoed back to the sender.
#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub account_id: String,
    pub fields_updated: Vec<String>,
}

#[async_trait]
pub trait AccountStateCache: Send + Sync {
    /// Upsert the snapshot for `account_id`. The new field set fully
    /// replaces the old one; `received_at` is refreshed. Does not touch
    /// the active selection.
    async fn ingest(
        &self,
        account_id: &str,
        fields: Map<String, Value>,
    ) -> Result<IngestReceipt, CacheError>;

    /// Stored snapshot, verbatim. `NotFound` means no heartbeat yet for
    /// this id. A missing identifier is an explicit failure; there is no
    /// "default account".
    async fn snapshot(&self, account_id: Option<&str>) -> Result<AccountSnapshot, CacheError>;

    /// Every account with a stored snapshot, sorted.
    async fn connected_accounts(&self) -> Vec<String>;

    async fn status(&self) -> StatusReport;

    /// Replace the active selection. The id must be all digits after
    /// trimming (the upstream terminal's login format); the account does
    /// not have to be connected yet. Returns the normalized id.
    async fn set_active(&self, account_id: &str) -> Result<String, CacheError>;

    /// Raw selection, no reconciliation.
    async fn active(&self) -> Option<String>;

    /// Selection checked against the registry under the same lock. A
    /// selection no longer backed by a connected account is cleared and
    /// reported as `None`.
    async fn active_reconciled(&self) -> Option<String>;

    /// Drop one account's snapshot. Returns whether it was present. The
    /// selection is left alone; the next reconciled read drops it.
    async fn remove(&self, account_id: &str) -> bool;

    /// Empty the registry and unset the selection.
    async fn clear_all(&self);
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, AccountSnapshot>,
    active: Option<String>,
}

/// Single-process implementation. One coarse `Mutex` over both cells is
/// deliberate: every operation is a short in-memory mutation and the
/// reconciled read must be atomic with respect to ingest and selection.
#[derive(Clone, Default)]
pub struct InMemoryAccountStateCache {
    inner: Arc<Mutex<Inner>>,
}

#[async_trait]
impl AccountStateCache for InMemoryAccountStateCache {
    async fn ingest(
        &self,
        account_id: &str,
        fields: Map<String, Value>,
    ) -> Result<IngestReceipt, CacheError> {
        let account_id = account_id.trim();
        if account_id.is_empty() {
            return Err(CacheError::MissingIdentifier);
        }

        let fields_updated: Vec<String> = fields.keys().cloned().collect();
        let snapshot = AccountSnapshot {
            account_id: account_id.to_string(),
            fields,
            received_at: Utc::now(),
        };

        let mut inner = self.inner.lock().await;
        inner.accounts.insert(account_id.to_string(), snapshot);

        Ok(IngestReceipt {
            account_id: account_id.to_string(),
            fields_updated,
        })
    }

    async fn snapshot(&self, account_id: Option<&str>) -> Result<AccountSnapshot, CacheError> {
        let account_id = account_id.map(str::trim).unwrap_or_default();
        if account_id.is_empty() {
            return Err(CacheError::NoIdentifierProvided);
        }

        let inner = self.inner.lock().await;
        inner
            .accounts
            .get(account_id)
            .cloned()
            .ok_or_else(|| CacheError::NotFound(account_id.to_string()))
    }

    async fn connected_accounts(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut ids: Vec<String> = inner.accounts.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn status(&self) -> StatusReport {
        let inner = self.inner.lock().await;
        let mut ids: Vec<String> = inner.accounts.keys().cloned().collect();
        ids.sort();
        let status = if ids.is_empty() {
            ConnectionStatus::Disconnected
        } else {
            ConnectionStatus::Connected
        };
        StatusReport {
            status,
            connected_accounts: ids,
        }
    }

    async fn set_active(&self, account_id: &str) -> Result<String, CacheError> {
        let account_id = account_id.trim();
        if account_id.is_empty() || !account_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CacheError::InvalidIdentifier(account_id.to_string()));
        }

        let mut inner = self.inner.lock().await;
        inner.active = Some(account_id.to_string());
        Ok(account_id.to_string())
    }

    async fn active(&self) -> Option<String> {
        self.inner.lock().await.active.clone()
    }

    async fn active_reconciled(&self) -> Option<String> {
        let mut inner = self.inner.lock().await;
        let stale = matches!(&inner.active, Some(id) if !inner.accounts.contains_key(id));
        if stale {
            // Selection outlived its account; self-heal on read.
            inner.active = None;
        }
        inner.active.clone()
    }

    async fn remove(&self, account_id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        inner.accounts.remove(account_id.trim()).is_some()
    }

    async fn clear_all(&self) {
        let mut inner = self.inner.lock().await;
        inner.accounts.clear();
        inner.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn ingest_then_snapshot_roundtrip() {
        let cache = InMemoryAccountStateCache::default();
        let receipt = cache
            .ingest("555", fields(&[("balance", json!(1000))]))
            .await
            .expect("ingest");
        assert_eq!(receipt.account_id, "555");
        assert_eq!(receipt.fields_updated, vec!["balance".to_string()]);

        let snapshot = cache.snapshot(Some("555")).await.expect("snapshot");
        assert_eq!(snapshot.account_id, "555");
        assert_eq!(snapshot.fields.get("balance"), Some(&json!(1000)));
    }

    #[tokio::test]
    async fn reads_are_idempotent() {
        let cache = InMemoryAccountStateCache::default();
        cache
            .ingest("1", fields(&[("equity", json!(42.5))]))
            .await
            .expect("ingest");

        let first = cache.snapshot(Some("1")).await.expect("first read");
        let second = cache.snapshot(Some("1")).await.expect("second read");
        assert_eq!(first.fields, second.fields);
        assert_eq!(first.received_at, second.received_at);
    }

    #[tokio::test]
    async fn ingest_overwrites_the_whole_field_set() {
        let cache = InMemoryAccountStateCache::default();
        cache
            .ingest("1", fields(&[("x", json!(1)), ("y", json!(2))]))
            .await
            .expect("first ingest");
        cache
            .ingest("1", fields(&[("x", json!(3))]))
            .await
            .expect("second ingest");

        let snapshot = cache.snapshot(Some("1")).await.expect("snapshot");
        assert_eq!(snapshot.fields.get("x"), Some(&json!(3)));
        assert!(snapshot.fields.get("y").is_none());
        assert_eq!(snapshot.fields.len(), 1);
    }

    #[tokio::test]
    async fn ingest_does_not_leak_across_accounts() {
        let cache = InMemoryAccountStateCache::default();
        cache
            .ingest("1", fields(&[("balance", json!(10))]))
            .await
            .expect("ingest 1");
        cache
            .ingest("2", fields(&[("balance", json!(20))]))
            .await
            .expect("ingest 2");
        cache
            .ingest("1", fields(&[("balance", json!(11))]))
            .await
            .expect("ingest 1 again");

        let other = cache.snapshot(Some("2")).await.expect("snapshot 2");
        assert_eq!(other.fields.get("balance"), Some(&json!(20)));
    }

    #[tokio::test]
    async fn ingest_rejects_blank_login() {
        let cache = InMemoryAccountStateCache::default();
        let err = cache.ingest("   ", Map::new()).await.unwrap_err();
        assert_eq!(err, CacheError::MissingIdentifier);
    }

    #[tokio::test]
    async fn snapshot_requires_an_identifier() {
        let cache = InMemoryAccountStateCache::default();
        assert_eq!(
            cache.snapshot(None).await.unwrap_err(),
            CacheError::NoIdentifierProvided
        );
        assert_eq!(
            cache.snapshot(Some("  ")).await.unwrap_err(),
            CacheError::NoIdentifierProvided
        );
    }

    #[tokio::test]
    async fn snapshot_miss_is_not_found() {
        let cache = InMemoryAccountStateCache::default();
        assert_eq!(
            cache.snapshot(Some("999")).await.unwrap_err(),
            CacheError::NotFound("999".to_string())
        );
    }

    #[tokio::test]
    async fn status_tracks_registry_emptiness() {
        let cache = InMemoryAccountStateCache::default();
        let report = cache.status().await;
        assert_eq!(report.status, ConnectionStatus::Disconnected);
        assert!(report.connected_accounts.is_empty());

        cache.ingest("7", Map::new()).await.expect("ingest");
        let report = cache.status().await;
        assert_eq!(report.status, ConnectionStatus::Connected);
        assert_eq!(report.connected_accounts, vec!["7".to_string()]);

        cache.clear_all().await;
        let report = cache.status().await;
        assert_eq!(report.status, ConnectionStatus::Disconnected);
        assert!(report.connected_accounts.is_empty());
    }

    #[tokio::test]
    async fn set_active_normalizes_and_validates() {
        let cache = InMemoryAccountStateCache::default();
        assert_eq!(cache.set_active("  42  ").await.expect("set"), "42");
        assert_eq!(cache.active().await.as_deref(), Some("42"));

        assert_eq!(
            cache.set_active("12a3").await.unwrap_err(),
            CacheError::InvalidIdentifier("12a3".to_string())
        );
        assert_eq!(
            cache.set_active("   ").await.unwrap_err(),
            CacheError::InvalidIdentifier(String::new())
        );
        // Failed validation leaves the previous selection in place.
        assert_eq!(cache.active().await.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn selection_may_precede_the_first_heartbeat() {
        let cache = InMemoryAccountStateCache::default();
        cache.set_active("123").await.expect("set");
        assert_eq!(cache.active().await.as_deref(), Some("123"));

        // Not connected yet, so the reconciled view reports inactive.
        assert_eq!(cache.active_reconciled().await, None);
        assert_eq!(cache.active().await, None);

        cache.set_active("123").await.expect("set again");
        cache.ingest("123", Map::new()).await.expect("ingest");
        assert_eq!(cache.active_reconciled().await.as_deref(), Some("123"));
    }

    #[tokio::test]
    async fn clear_all_drops_the_selection() {
        let cache = InMemoryAccountStateCache::default();
        cache
            .ingest("123", fields(&[("balance", json!(1))]))
            .await
            .expect("ingest");
        cache.set_active("123").await.expect("set");
        assert_eq!(cache.active_reconciled().await.as_deref(), Some("123"));

        cache.clear_all().await;
        assert_eq!(cache.active_reconciled().await, None);
        assert_eq!(cache.active().await, None);
    }

    #[tokio::test]
    async fn removed_account_loses_its_selection_lazily() {
        let cache = InMemoryAccountStateCache::default();
        cache.ingest("555", Map::new()).await.expect("ingest");
        cache.set_active("555").await.expect("set");

        assert!(cache.remove("555").await);
        assert!(!cache.remove("555").await);

        // Raw selection still set until a reconciled read drops it.
        assert_eq!(cache.active().await.as_deref(), Some("555"));
        assert_eq!(cache.active_reconciled().await, None);
        assert_eq!(cache.active().await, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_ingests_for_distinct_accounts_all_land() {
        let cache = InMemoryAccountStateCache::default();
        let n = 32;

        let mut handles = Vec::with_capacity(n);
        for i in 0..n {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .ingest(&format!("{i}"), fields(&[("seq", json!(i))]))
                    .await
                    .expect("ingest");
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }

        let ids = cache.connected_accounts().await;
        assert_eq!(ids.len(), n);
        let mut expected: Vec<String> = (0..n).map(|i| format!("{i}")).collect();
        expected.sort();
        assert_eq!(ids, expected);
    }
}
