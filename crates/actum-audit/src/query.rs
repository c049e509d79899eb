use actum_core::{Action, AuditEvent, AuditFilter, DecisionCounts, EventId, RiskTier};

use crate::error::{AuditError, AuditResult};
use crate::trail::AuditTrail;

pub const DEFAULT_QUERY_LIMIT: usize = AuditFilter::DEFAULT_LIMIT;
pub const MAX_QUERY_LIMIT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_QUERY_LIMIT,
            max_limit: MAX_QUERY_LIMIT,
        }
    }
}

/// Caller-supplied query; unset limit falls back to the configured default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pub decision: Option<Action>,
    pub risk_level: Option<RiskTier>,
    pub user: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl QueryLimits {
    pub fn filter(&self, params: QueryParams) -> AuditResult<AuditFilter> {
        let limit = params.limit.unwrap_or(self.default_limit);
        if limit == 0 || limit > self.max_limit {
            return Err(AuditError::InvalidRequest(format!(
                "limit must be between 1 and {}, got {}",
                self.max_limit, limit
            )));
        }
        Ok(AuditFilter {
            decision: params.decision,
            risk_level: params.risk_level,
            user: params.user.filter(|u| !u.is_empty()),
            limit,
            offset: params.offset.unwrap_or(0),
        })
    }
}

impl AuditTrail {
    /// Committed events matching every given filter, most recent first.
    pub fn query_events(&self, params: QueryParams) -> AuditResult<Vec<AuditEvent>> {
        let filter = self.limits.filter(params)?;
        Ok(self.store.query(&filter)?)
    }

    pub fn get_event(&self, event_id: &EventId) -> AuditResult<AuditEvent> {
        self.store
            .get(event_id)?
            .ok_or_else(|| AuditError::NotFound(format!("audit event {}", event_id)))
    }

    pub fn stats(&self) -> AuditResult<DecisionCounts> {
        Ok(self.store.counts()?)
    }
}
