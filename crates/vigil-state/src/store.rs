//! StateStore: redb-backed persistence for Vigil.
//!
//! Provides typed operations over endpoint configurations, runtime state and
//! the check-result log. All values are JSON-serialized into redb's `&[u8]`
//! value columns. The store supports both on-disk and in-memory backends
//! (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

/// Key range covering every check result of one endpoint.
///
/// `0` is the byte after `/`, so the range ends right past the prefix.
fn result_range(endpoint_id: &str) -> (String, String) {
    (format!("{endpoint_id}/"), format!("{endpoint_id}0"))
}

/// Timestamp part of a `{id}/{checked_at:020}-{seq:04}` result key.
fn result_key_time(key: &str) -> StateResult<u64> {
    key.rsplit_once('/')
        .and_then(|(_, suffix)| suffix.split_once('-'))
        .and_then(|(millis, _)| millis.parse().ok())
        .ok_or_else(|| StateError::InvalidKey(key.to_string()))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(ENDPOINTS).map_err(map_err!(Table))?;
        txn.open_table(RUNTIME).map_err(map_err!(Table))?;
        txn.open_table(CHECK_RESULTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Endpoints ──────────────────────────────────────────────────

    /// Insert or update an endpoint configuration.
    pub fn put_endpoint(&self, endpoint: &EndpointConfig) -> StateResult<()> {
        validate_id(&endpoint.id)?;
        let value = serde_json::to_vec(endpoint).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ENDPOINTS).map_err(map_err!(Table))?;
            table
                .insert(endpoint.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(endpoint_id = %endpoint.id, "endpoint stored");
        Ok(())
    }

    /// Get an endpoint by id. `None` if it was deleted.
    pub fn get_endpoint(&self, endpoint_id: &str) -> StateResult<Option<EndpointConfig>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENDPOINTS).map_err(map_err!(Table))?;
        match table.get(endpoint_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let endpoint: EndpointConfig =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(endpoint))
            }
            None => Ok(None),
        }
    }

    /// List all endpoints.
    pub fn list_endpoints(&self) -> StateResult<Vec<EndpointConfig>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENDPOINTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let endpoint: EndpointConfig =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(endpoint);
        }
        Ok(results)
    }

    /// List endpoints currently marked active.
    pub fn list_active_endpoints(&self) -> StateResult<Vec<EndpointConfig>> {
        Ok(self
            .list_endpoints()?
            .into_iter()
            .filter(|e| e.is_active)
            .collect())
    }

    /// Delete an endpoint and its runtime state. Returns true if it existed.
    ///
    /// Check results are left for the retention sweep.
    pub fn delete_endpoint(&self, endpoint_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(ENDPOINTS).map_err(map_err!(Table))?;
            existed = table.remove(endpoint_id).map_err(map_err!(Write))?.is_some();
            let mut runtime = txn.open_table(RUNTIME).map_err(map_err!(Table))?;
            runtime.remove(endpoint_id).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%endpoint_id, existed, "endpoint deleted");
        Ok(existed)
    }

    // ── Runtime state ──────────────────────────────────────────────

    /// Runtime state of an endpoint; default (never checked, up) if absent.
    pub fn get_runtime_state(&self, endpoint_id: &str) -> StateResult<EndpointRuntimeState> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RUNTIME).map_err(map_err!(Table))?;
        match table.get(endpoint_id).map_err(map_err!(Read))? {
            Some(guard) => {
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))
            }
            None => Ok(EndpointRuntimeState::default()),
        }
    }

    /// Overwrite the runtime state of an endpoint.
    ///
    /// Returns `false` without writing if the endpoint no longer exists, so a
    /// tick finishing after a delete cannot resurrect its runtime row.
    pub fn update_runtime_state(
        &self,
        endpoint_id: &str,
        last_checked: u64,
        last_success: bool,
        threshold_down: bool,
    ) -> StateResult<bool> {
        let state = EndpointRuntimeState {
            last_checked: Some(last_checked),
            last_success: Some(last_success),
            threshold_down,
        };
        let value = serde_json::to_vec(&state).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let exists;
        {
            let endpoints = txn.open_table(ENDPOINTS).map_err(map_err!(Table))?;
            exists = endpoints.get(endpoint_id).map_err(map_err!(Read))?.is_some();
            if exists {
                let mut table = txn.open_table(RUNTIME).map_err(map_err!(Table))?;
                table
                    .insert(endpoint_id, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(exists)
    }

    // ── Check results ──────────────────────────────────────────────

    /// Append a check result to the log.
    pub fn append_check_result(&self, result: &CheckResult) -> StateResult<()> {
        validate_id(&result.endpoint_id)?;
        let value = serde_json::to_vec(result).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(CHECK_RESULTS).map_err(map_err!(Table))?;
            // Results landing in the same millisecond get increasing suffixes.
            let mut seq = 0u16;
            let key = loop {
                let key = result.table_key(seq);
                if table.get(key.as_str()).map_err(map_err!(Read))?.is_none() {
                    break key;
                }
                seq = seq
                    .checked_add(1)
                    .ok_or_else(|| StateError::InvalidKey(key.clone()))?;
            };
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// The `limit` most recent results for an endpoint, newest first.
    pub fn query_recent_results(
        &self,
        endpoint_id: &str,
        limit: usize,
    ) -> StateResult<Vec<CheckResult>> {
        let (start, end) = result_range(endpoint_id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CHECK_RESULTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?
            .rev()
            .take(limit)
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let result: CheckResult =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(result);
        }
        Ok(results)
    }

    /// Delete every result strictly older than `cutoff_ms`. Returns number deleted.
    pub fn delete_results_older_than(&self, cutoff_ms: u64) -> StateResult<u32> {
        // Collect keys in a read transaction first.
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(CHECK_RESULTS).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, _) = entry.map_err(map_err!(Read))?;
                let key = key.value();
                if result_key_time(key)? < cutoff_ms {
                    keys.push(key.to_string());
                }
            }
            keys
        };
        if keys.is_empty() {
            return Ok(0);
        }
        // Delete in a write transaction.
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count = keys.len() as u32;
        {
            let mut table = txn.open_table(CHECK_RESULTS).map_err(map_err!(Table))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(count, cutoff_ms, "old check results deleted");
        Ok(count)
    }

    /// Aggregate uptime and latency over an endpoint's retained results.
    pub fn endpoint_stats(&self, endpoint_id: &str) -> StateResult<EndpointStats> {
        let (start, end) = result_range(endpoint_id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CHECK_RESULTS).map_err(map_err!(Table))?;
        let mut total = 0u64;
        let mut successful = 0u64;
        let mut latency_sum = 0u64;
        for entry in table
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let result: CheckResult =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            total += 1;
            latency_sum += result.response_time_ms;
            if result.success {
                successful += 1;
            }
        }
        if total == 0 {
            return Ok(EndpointStats::default());
        }
        Ok(EndpointStats {
            total_checks: total,
            successful_checks: successful,
            average_response_time: round2(latency_sum as f64 / total as f64),
            uptime_percentage: round2(successful as f64 / total as f64 * 100.0),
        })
    }
}
