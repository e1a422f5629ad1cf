//! Audit trail for routed requests
//!
//! One record per request, appended best-effort. Sinks never report
//! failures to the router.

use crate::error::RouterError;
use crate::models::{AgentKind, RequestContext, RouteStatus};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteAuditRecord {
    pub router: String,
    pub request_id: String,
    pub query: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub companies: Vec<String>,
    pub tickers: Vec<String>,
    pub agents: Vec<AgentKind>,
    pub status: RouteStatus,
    pub agents_completed: usize,
    pub context_hash: String,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &RouteAuditRecord);
}

/// Newline-delimited JSON file, opened in append mode per record
pub struct JsonlAuditLog {
    path: PathBuf,
    // serializes appends from concurrent requests
    write_lock: Mutex<()>,
}

impl JsonlAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, record: &RouteAuditRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| RouterError::Audit(format!("cannot serialize audit record: {}", e)))?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for JsonlAuditLog {
    async fn record(&self, record: &RouteAuditRecord) {
        if let Err(e) = self.append(record).await {
            warn!(
                path = %self.path.display(),
                request_id = %record.request_id,
                error = %e,
                "Audit write failed"
            );
        }
    }
}

/// In-process sink, used when no audit file is wanted and in tests
pub struct InMemoryAuditLog {
    records: Arc<RwLock<Vec<RouteAuditRecord>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn records(&self) -> Vec<RouteAuditRecord> {
        self.records.read().await.clone()
    }

    /// Records for one request, oldest first
    pub async fn for_request(&self, request_id: &str) -> Vec<RouteAuditRecord> {
        let records = self.records.read().await;

        let mut items: Vec<_> = records
            .iter()
            .filter(|record| record.request_id == request_id)
            .cloned()
            .collect();

        items.sort_by_key(|record| record.started_at);
        items
    }
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn record(&self, record: &RouteAuditRecord) {
        self.records.write().await.push(record.clone());
    }
}

/// SHA-256 of the serialized request context, hex encoded
pub fn compute_context_hash(context: &RequestContext) -> String {
    let mut hasher = Sha256::new();

    // Stream JSON directly into hasher (no intermediate String)
    if serde_json::to_writer(&mut HashWriter(&mut hasher), context).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
