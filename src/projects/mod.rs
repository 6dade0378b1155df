//! Project store: the user's API credentials, in insertion order.
//!
//! The whole collection is persisted as one JSON array under a fixed key
//! and rewritten on every mutation. It is read once at startup.

pub mod import;
pub mod kv;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use kv::{KvStore, StoreError};

/// Key the project list is stored under.
pub const PROJECTS_KEY: &str = "gemini-omni-view-projects";

/// Opaque, process-unique project identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named credential.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub name: String,
    pub api_key: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

impl ProjectRecord {
    /// `AIza...s3w` style display form of the credential.
    pub fn masked_credential(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() <= 8 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

impl fmt::Debug for ProjectRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("api_key", &self.masked_credential())
            .field("created_at", &self.created_at)
            .finish()
    }
}

pub struct ProjectStore {
    records: RwLock<Vec<ProjectRecord>>,
    kv: KvStore,
}

impl ProjectStore {
    /// Rehydrate the store from `kv`. A stored value that no longer
    /// decodes is kept aside under `<key>.unreadable` and the store
    /// starts empty.
    pub fn load(kv: KvStore) -> Result<Self, StoreError> {
        let records = match kv.get(PROJECTS_KEY)? {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str::<Vec<ProjectRecord>>(&raw) {
                Ok(records) => records,
                Err(e) => {
                    warn!(key = PROJECTS_KEY, "Stored project list is unreadable: {}", e);
                    kv.set(&format!("{}.unreadable", PROJECTS_KEY), &raw)?;
                    Vec::new()
                }
            },
        };

        info!(count = records.len(), "Projects loaded");
        Ok(Self {
            records: RwLock::new(records),
            kv,
        })
    }

    /// Create a project with a fresh identity and append it.
    pub fn add(&self, name: &str, credential: &str) -> Result<ProjectRecord, StoreError> {
        let record = ProjectRecord {
            id: ProjectId::generate(),
            name: name.trim().to_string(),
            api_key: credential.trim().to_string(),
            created_at: Utc::now().timestamp_millis(),
        };

        let mut records = self.records.write().unwrap();
        let mut next = records.clone();
        next.push(record.clone());
        self.commit(&mut records, next)?;

        info!(project_id = %record.id, name = %record.name, "Project added");
        Ok(record)
    }

    /// Delete a project. Returns `false` if there was nothing to delete.
    pub fn remove(&self, id: &ProjectId) -> Result<bool, StoreError> {
        let mut records = self.records.write().unwrap();
        let next: Vec<ProjectRecord> = records.iter().filter(|p| &p.id != id).cloned().collect();
        if next.len() == records.len() {
            return Ok(false);
        }
        self.commit(&mut records, next)?;

        info!(project_id = %id, "Project removed");
        Ok(true)
    }

    /// Parse `raw` and append every plausible record in one write.
    /// Returns how many were imported; junk lines are skipped silently.
    pub fn bulk_import(&self, raw: &str) -> Result<usize, StoreError> {
        let parsed = import::parse_records(raw);
        if parsed.is_empty() {
            warn!("Bulk import found no valid projects");
            return Ok(0);
        }

        let now = Utc::now().timestamp_millis();
        let mut records = self.records.write().unwrap();
        let mut next = records.clone();
        for rec in &parsed {
            let name = if rec.name.is_empty() {
                format!("Project {}", now)
            } else {
                rec.name.clone()
            };
            next.push(ProjectRecord {
                id: ProjectId::generate(),
                name,
                api_key: rec.credential.clone(),
                created_at: now,
            });
        }
        self.commit(&mut records, next)?;

        info!(count = parsed.len(), "Projects imported");
        Ok(parsed.len())
    }

    /// Import from raw file bytes. Bytes that aren't UTF-8 import nothing.
    pub fn bulk_import_bytes(&self, bytes: &[u8]) -> Result<usize, StoreError> {
        match std::str::from_utf8(bytes) {
            Ok(text) => self.bulk_import(text),
            Err(e) => {
                warn!("Bulk import input is not readable text: {}", e);
                Ok(0)
            }
        }
    }

    pub fn get(&self, id: &ProjectId) -> Option<ProjectRecord> {
        self.records.read().unwrap().iter().find(|p| &p.id == id).cloned()
    }

    pub fn list(&self) -> Vec<ProjectRecord> {
        self.records.read().unwrap().clone()
    }

    pub fn first(&self) -> Option<ProjectRecord> {
        self.records.read().unwrap().first().cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write `next` through to the backend, then make it the live list.
    /// On error the live list is left as it was.
    fn commit(
        &self,
        records: &mut Vec<ProjectRecord>,
        next: Vec<ProjectRecord>,
    ) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(&next)?;
        self.kv.set(PROJECTS_KEY, &encoded)?;
        *records = next;
        Ok(())
    }
}
