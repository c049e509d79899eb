//! Actum service library
//!
//! Wires the policy engine and the audit trail into one process: loads
//! configuration, publishes the policy packs, opens the audit store and
//! starts the chain writer. The HTTP API and the CLI both go through
//! [`AppState`], so a decision made either way is committed to the same
//! chain before it is returned.

pub mod config;
pub mod error;
pub mod http;
pub mod views;

pub use config::{AuditConfig, PolicyConfig, RootConfig, ServerConfig, StoreKind};
pub use error::{RootError, RootResult};

use std::sync::Arc;

use actum_audit::{
    AuditTrail, ChainSigner, InMemoryAuditStore, QueryLimits, SqliteAuditStore, TrailConfig,
};
use actum_core::{
    AuditStore, FacePresenceDetector, NullFaceDetector, NullRiskScorer, PolicyVersion, RiskScorer,
};
use actum_policy::{
    DecisionEngine, EvaluationRequest, InputLimits, PackListing, PolicyRegistry, SignalDetector,
};
use tracing::info;

use crate::views::{AdminStats, EvaluationResponse, PackView, PolicyStats, TagView};

/// Everything a request handler needs.
pub struct AppState {
    pub config: RootConfig,
    pub engine: DecisionEngine,
    pub trail: AuditTrail,
}

impl AppState {
    /// Evaluate and commit. The response is only produced once the audit
    /// event is durably chained; a failed commit fails the request.
    pub async fn evaluate(&self, request: EvaluationRequest) -> RootResult<EvaluationResponse> {
        self.evaluate_with_pack(request, None).await
    }

    /// Evaluate against `version` instead of the active pack, to reproduce
    /// a historical decision. The replay is committed like any other.
    pub async fn evaluate_with_pack(
        &self,
        request: EvaluationRequest,
        version: Option<&PolicyVersion>,
    ) -> RootResult<EvaluationResponse> {
        let evaluated = match version {
            Some(v) => self.engine.replay(&request, v)?,
            None => self.engine.evaluate(&request)?,
        };
        let event = self.trail.commit(evaluated.pending).await?;
        info!(
            event_id = %event.event_id,
            sequence = event.sequence,
            decision = %event.decision.decision,
            risk_level = %event.decision.risk_level,
            client_id = %event.client_id,
            policy_version = %event.decision.policy_version,
            replay = version.is_some(),
            "decision committed"
        );
        Ok(EvaluationResponse::new(evaluated.decision, event.event_id))
    }

    pub fn policy_tags(&self) -> RootResult<Vec<TagView>> {
        Ok(self
            .engine
            .registry()
            .list_tags()?
            .iter()
            .map(TagView::from)
            .collect())
    }

    pub fn policy_packs(&self) -> RootResult<Vec<PackView>> {
        Ok(self
            .engine
            .registry()
            .list_packs()?
            .iter()
            .map(PackView::from)
            .collect())
    }

    /// Switch the active pack. In-flight evaluations finish on the pack
    /// they started with.
    pub fn activate_pack(&self, version: &PolicyVersion) -> RootResult<PackView> {
        let registry = self.engine.registry();
        registry.activate(version)?;
        let pack = registry.get_pack(version)?;
        Ok(PackView::from(&PackListing {
            pack,
            is_active: true,
        }))
    }

    pub fn admin_stats(&self) -> RootResult<AdminStats> {
        let packs = self.engine.registry().list_packs()?;
        let policies = PolicyStats {
            active_packs: packs.iter().filter(|l| l.is_active).count(),
            total_packs: packs.len(),
            total_tags: packs.iter().map(|l| l.pack.tags().len()).sum(),
        };
        Ok(AdminStats {
            audit_events: self.trail.stats()?,
            policies,
        })
    }
}

/// Build the service with the null scorer and face detector.
pub fn initialize(config: RootConfig) -> RootResult<AppState> {
    initialize_with_models(config, Arc::new(NullRiskScorer), Arc::new(NullFaceDetector))
}

/// Build the service around the given models.
pub fn initialize_with_models(
    config: RootConfig,
    scorer: Arc<dyn RiskScorer>,
    faces: Arc<dyn FacePresenceDetector>,
) -> RootResult<AppState> {
    let from_env = std::env::var(crate::config::HMAC_SECRET_ENV).ok();
    assemble(config, from_env, scorer, faces)
}

fn assemble(
    config: RootConfig,
    secret_from_env: Option<String>,
    scorer: Arc<dyn RiskScorer>,
    faces: Arc<dyn FacePresenceDetector>,
) -> RootResult<AppState> {
    config.validate()?;

    let registry = match &config.policy.pack_file {
        Some(path) => PolicyRegistry::load(path)?,
        None => PolicyRegistry::builtin()?,
    };
    if let Some(version) = &config.policy.active_version {
        registry.activate(version)?;
    }
    let active = registry.get_active_pack().ok();
    info!(
        packs = registry.total_packs(),
        active = ?active.as_ref().map(|p| p.version.as_str()),
        source = ?config.policy.pack_file,
        "policy packs published"
    );

    let limits = InputLimits {
        max_input_bytes: config.policy.max_input_bytes,
        max_image_bytes: config.policy.max_image_bytes,
    };
    let engine = DecisionEngine::new(
        Arc::new(registry),
        SignalDetector::new(scorer, faces, limits),
    );

    let secret = config.resolve_secret(secret_from_env)?;
    let signer = ChainSigner::new(secret.as_bytes())?;
    let store = open_store(&config)?;
    let trail = AuditTrail::open(
        store,
        signer,
        TrailConfig {
            queue_depth: config.audit.writer_queue_depth,
            limits: QueryLimits {
                default_limit: config.audit.default_query_limit,
                max_limit: config.audit.max_query_limit,
            },
        },
    )?;

    Ok(AppState {
        config,
        engine,
        trail,
    })
}

fn open_store(config: &RootConfig) -> RootResult<Arc<dyn AuditStore>> {
    match config.audit.store {
        StoreKind::Memory => {
            info!("audit store: in-memory");
            Ok(Arc::new(InMemoryAuditStore::new()))
        }
        StoreKind::Sqlite => {
            let path = config.database_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            info!(path = %path.display(), "audit store: sqlite");
            Ok(Arc::new(SqliteAuditStore::open(&path)?))
        }
    }
}
