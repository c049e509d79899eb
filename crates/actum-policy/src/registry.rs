use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, RwLock};

use actum_core::PolicyVersion;

use crate::error::{PolicyError, PolicyResult};
use crate::types::{PackDocument, PolicyPack, PolicyTag};

/// Pack document compiled into the binary.
pub const BUILTIN_PACK_JSON: &str = include_str!("../packs/eu-ai-act-2025-01-01.json");

const MAX_PACK_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

/// One entry of `list_packs`.
#[derive(Debug, Clone)]
pub struct PackListing {
    pub pack: Arc<PolicyPack>,
    pub is_active: bool,
}

/// Catalog of published policy packs.
///
/// Packs are immutable once published. The only mutable state is which
/// version is active, and callers always receive an `Arc` snapshot of the
/// pack, so switching the active version never changes a decision that
/// is already in flight.
pub struct PolicyRegistry {
    packs: Vec<Arc<PolicyPack>>,
    active: RwLock<Option<PolicyVersion>>,
}

impl PolicyRegistry {
    /// Publish every pack in a document. Rejects duplicate versions and
    /// more than one active pack.
    pub fn from_document(document: PackDocument) -> PolicyResult<Self> {
        let active_versions: Vec<PolicyVersion> = document
            .packs
            .iter()
            .filter(|p| p.is_active)
            .map(|p| p.version.clone())
            .collect();
        if active_versions.len() > 1 {
            return Err(PolicyError::InvalidPack(format!(
                "at most one pack may be active, found {}",
                active_versions.len()
            )));
        }

        let mut seen = BTreeSet::new();
        let mut packs = Vec::with_capacity(document.packs.len());
        for def in document.packs {
            if !seen.insert(def.version.clone()) {
                return Err(PolicyError::InvalidPack(format!(
                    "pack version '{}' is published more than once",
                    def.version
                )));
            }
            packs.push(Arc::new(PolicyPack::publish(def)?));
        }

        let active = active_versions.into_iter().next();
        match &active {
            Some(v) => tracing::info!(version = %v, packs = packs.len(), "policy registry loaded"),
            None => {
                tracing::warn!(packs = packs.len(), "policy registry loaded with no active pack")
            }
        }

        Ok(Self {
            packs,
            active: RwLock::new(active),
        })
    }

    /// Parse and publish a JSON pack document.
    pub fn from_json(data: &[u8]) -> PolicyResult<Self> {
        if data.is_empty() {
            return Err(PolicyError::LoadError("pack document is empty".to_string()));
        }
        if data.len() > MAX_PACK_DOCUMENT_BYTES {
            return Err(PolicyError::LoadError(
                "pack document exceeds 10MB size limit".to_string(),
            ));
        }
        let document: PackDocument = serde_json::from_slice(data)
            .map_err(|e| PolicyError::DeserializationError(format!("JSON parse error: {}", e)))?;
        Self::from_document(document)
    }

    /// Load a JSON pack document from disk.
    pub fn load(path: &Path) -> PolicyResult<Self> {
        let data = std::fs::read(path).map_err(|e| {
            PolicyError::LoadError(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&data)
    }

    /// The EU AI Act baseline pack shipped with the engine.
    pub fn builtin() -> PolicyResult<Self> {
        Self::from_json(BUILTIN_PACK_JSON.as_bytes())
    }

    /// Snapshot of the active pack.
    pub fn get_active_pack(&self) -> PolicyResult<Arc<PolicyPack>> {
        let active = self
            .active
            .read()
            .map_err(|_| PolicyError::InternalError("registry lock poisoned".to_string()))?;
        let version = active.as_ref().ok_or(PolicyError::NoActivePack)?;
        self.find(version).ok_or(PolicyError::NoActivePack)
    }

    /// Any published pack by version, active or not.
    pub fn get_pack(&self, version: &PolicyVersion) -> PolicyResult<Arc<PolicyPack>> {
        self.find(version)
            .ok_or_else(|| PolicyError::UnknownPolicyVersion(version.to_string()))
    }

    /// Tags of the active pack, in definition order.
    pub fn list_tags(&self) -> PolicyResult<Vec<PolicyTag>> {
        Ok(self.get_active_pack()?.tags().to_vec())
    }

    pub fn list_packs(&self) -> PolicyResult<Vec<PackListing>> {
        let active = self
            .active
            .read()
            .map_err(|_| PolicyError::InternalError("registry lock poisoned".to_string()))?;
        Ok(self
            .packs
            .iter()
            .map(|p| PackListing {
                pack: Arc::clone(p),
                is_active: active.as_ref() == Some(&p.version),
            })
            .collect())
    }

    pub fn total_packs(&self) -> usize {
        self.packs.len()
    }

    /// Make a published pack the active one. Evaluations that already hold
    /// a snapshot finish against the pack they started with.
    pub fn activate(&self, version: &PolicyVersion) -> PolicyResult<()> {
        if self.find(version).is_none() {
            return Err(PolicyError::UnknownPolicyVersion(version.to_string()));
        }
        let mut active = self
            .active
            .write()
            .map_err(|_| PolicyError::InternalError("registry lock poisoned".to_string()))?;
        let previous = active.replace(version.clone());
        tracing::info!(
            version = %version,
            previous = ?previous.as_ref().map(PolicyVersion::as_str),
            "policy pack activated"
        );
        Ok(())
    }

    fn find(&self, version: &PolicyVersion) -> Option<Arc<PolicyPack>> {
        self.packs.iter().find(|p| &p.version == version).cloned()
    }
}

impl std::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field(
                "versions",
                &self.packs.iter().map(|p| p.version.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
