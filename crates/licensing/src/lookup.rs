//! License lookup contract and the DashMap-backed store used by the server.
//!
//! The persistence layer owns license records; the resolver only reads them,
//! once per request, through [`LicenseLookup`].

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use entitlement_core::redact_key;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
}

/// A stored license as returned by the persistence layer. `tier` is the raw
/// stored string and may hold legacy or corrupted values.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRecord {
    pub id: Uuid,
    pub key: String,
    pub active: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub tier: String,
    pub customer: Customer,
}

impl std::fmt::Debug for LicenseRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseRecord")
            .field("id", &self.id)
            .field("key", &redact_key(&self.key))
            .field("active", &self.active)
            .field("expires_at", &self.expires_at)
            .field("tier", &self.tier)
            .field("customer", &self.customer)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Lookup contract
// ---------------------------------------------------------------------------

/// Storage-side failures. Distinct from a key simply not existing.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("license store unavailable: {0}")]
    Unavailable(String),
    #[error("license record is corrupt: {0}")]
    Corrupt(String),
}

/// Read-only access to license records by key.
///
/// `Ok(None)` means the key does not exist; `Err` means the store could not answer.
#[async_trait]
pub trait LicenseLookup: Send + Sync + 'static {
    async fn lookup(&self, key: &str) -> Result<Option<LicenseRecord>, LookupError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("cannot read seed file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid seed file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Concurrent in-process license store keyed by license key.
pub struct InMemoryLicenseStore {
    records: DashMap<String, LicenseRecord>,
    available: AtomicBool,
    lookups: AtomicU64,
}

impl std::fmt::Debug for InMemoryLicenseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLicenseStore")
            .field("records", &self.records.len())
            .field("available", &self.available)
            .field("lookups", &self.lookups)
            .finish()
    }
}

impl Default for InMemoryLicenseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLicenseStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            available: AtomicBool::new(true),
            lookups: AtomicU64::new(0),
        }
    }

    pub fn with_records(records: impl IntoIterator<Item = LicenseRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Parse a JSON array of license records.
    pub fn from_json(json: &str) -> Result<Self, SeedError> {
        let records: Vec<LicenseRecord> = serde_json::from_str(json)?;
        Ok(Self::with_records(records))
    }

    pub fn from_seed_file(path: &Path) -> Result<Self, SeedError> {
        let contents = std::fs::read_to_string(path)?;
        let store = Self::from_json(&contents)?;
        info!(path = %path.display(), licenses = store.len(), "License store seeded");
        Ok(store)
    }

    /// Insert or replace a record, returning the previous one for the same key.
    pub fn insert(&self, record: LicenseRecord) -> Option<LicenseRecord> {
        self.records.insert(record.key.clone(), record)
    }

    pub fn remove(&self, key: &str) -> Option<LicenseRecord> {
        self.records.remove(key).map(|(_, record)| record)
    }

    /// Flip the active flag of an existing record. Returns false if the key is unknown.
    pub fn set_active(&self, key: &str, active: bool) -> bool {
        match self.records.get_mut(key) {
            Some(mut record) => {
                record.active = active;
                true
            }
            None => false,
        }
    }

    /// Simulate a storage outage: while unavailable every lookup fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of lookups served (including failed ones).
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl LicenseLookup for InMemoryLicenseStore {
    async fn lookup(&self, key: &str) -> Result<Option<LicenseRecord>, LookupError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(LookupError::Unavailable("in-memory store disabled".to_string()));
        }
        Ok(self.records.get(key).map(|entry| entry.value().clone()))
    }
}
