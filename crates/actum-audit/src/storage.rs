use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};

use actum_core::{
    ActumError, ActumResult, AuditEvent, AuditFilter, AuditOverride, AuditStore, ChainSignature,
    ChainTail, Decision, DecisionCounts, EventId, OverrideId, PolicyVersion, Timestamp,
};

/// SQLite-backed audit store.
///
/// Rows are only ever inserted. Each append is a single INSERT, so a reader
/// sees either the whole event or nothing.
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS audit_events (
    sequence            INTEGER PRIMARY KEY NOT NULL,
    event_id            TEXT NOT NULL UNIQUE,
    ts_seconds          INTEGER NOT NULL,
    ts_nanos            INTEGER NOT NULL,
    user                TEXT NOT NULL,
    client_id           TEXT NOT NULL,
    input_type          TEXT NOT NULL,
    input_hash          TEXT NOT NULL,
    decision            TEXT NOT NULL,
    risk_level          TEXT NOT NULL,
    confidence_score    INTEGER NOT NULL,
    explanation         TEXT NOT NULL,
    triggered_tags      TEXT NOT NULL,
    policy_version      TEXT NOT NULL,
    signature           TEXT NOT NULL,
    previous_signature  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_events_user ON audit_events (user);
CREATE INDEX IF NOT EXISTS idx_audit_events_decision ON audit_events (decision);

CREATE TABLE IF NOT EXISTS audit_overrides (
    override_id         TEXT PRIMARY KEY NOT NULL,
    original_event_id   TEXT NOT NULL REFERENCES audit_events (event_id),
    ts_seconds          INTEGER NOT NULL,
    ts_nanos            INTEGER NOT NULL,
    operator            TEXT NOT NULL,
    reason              TEXT NOT NULL,
    new_decision        TEXT NOT NULL,
    duration_minutes    INTEGER,
    signature           TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_overrides_event ON audit_overrides (original_event_id);
";

const EVENT_COLUMNS: &str = "sequence, event_id, ts_seconds, ts_nanos, user, client_id, \
     input_type, input_hash, decision, risk_level, confidence_score, explanation, \
     triggered_tags, policy_version, signature, previous_signature";

const OVERRIDE_COLUMNS: &str = "override_id, original_event_id, ts_seconds, ts_nanos, \
     operator, reason, new_decision, duration_minutes, signature";

/// A row as stored; enum and JSON columns are still text.
struct EventRow {
    sequence: i64,
    event_id: String,
    ts_seconds: i64,
    ts_nanos: i64,
    user: String,
    client_id: String,
    input_type: String,
    input_hash: String,
    decision: String,
    risk_level: String,
    confidence_score: i64,
    explanation: String,
    triggered_tags: String,
    policy_version: String,
    signature: String,
    previous_signature: String,
}

impl EventRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            sequence: row.get(0)?,
            event_id: row.get(1)?,
            ts_seconds: row.get(2)?,
            ts_nanos: row.get(3)?,
            user: row.get(4)?,
            client_id: row.get(5)?,
            input_type: row.get(6)?,
            input_hash: row.get(7)?,
            decision: row.get(8)?,
            risk_level: row.get(9)?,
            confidence_score: row.get(10)?,
            explanation: row.get(11)?,
            triggered_tags: row.get(12)?,
            policy_version: row.get(13)?,
            signature: row.get(14)?,
            previous_signature: row.get(15)?,
        })
    }

    fn into_event(self) -> ActumResult<AuditEvent> {
        let corrupt = |what: &str, detail: String| {
            ActumError::Serialization(format!(
                "row {} has invalid {}: {}",
                self.sequence, what, detail
            ))
        };
        let triggered_tags: Vec<String> = serde_json::from_str(&self.triggered_tags)
            .map_err(|e| corrupt("triggered_tags", e.to_string()))?;
        let decision = Decision {
            decision: self.decision.parse().map_err(|e| corrupt("decision", e))?,
            risk_level: self.risk_level.parse().map_err(|e| corrupt("risk_level", e))?,
            confidence_score: u8::try_from(self.confidence_score)
                .map_err(|e| corrupt("confidence_score", e.to_string()))?,
            explanation: self.explanation.clone(),
            triggered_tags,
            policy_version: PolicyVersion::new(self.policy_version.clone()),
        };
        Ok(AuditEvent {
            event_id: EventId::new(self.event_id.clone()),
            sequence: u64::try_from(self.sequence)
                .map_err(|e| corrupt("sequence", e.to_string()))?,
            timestamp: Timestamp {
                seconds_since_epoch: u64::try_from(self.ts_seconds)
                    .map_err(|e| corrupt("timestamp", e.to_string()))?,
                nanoseconds: u32::try_from(self.ts_nanos)
                    .map_err(|e| corrupt("timestamp", e.to_string()))?,
            },
            user: self.user.clone(),
            client_id: self.client_id.clone(),
            input_type: self.input_type.parse().map_err(|e| corrupt("input_type", e))?,
            input_hash: self.input_hash.clone(),
            decision,
            signature: ChainSignature::new(self.signature.clone()),
            previous_signature: ChainSignature::new(self.previous_signature.clone()),
        })
    }
}

struct OverrideRow {
    override_id: String,
    original_event_id: String,
    ts_seconds: i64,
    ts_nanos: i64,
    operator: String,
    reason: String,
    new_decision: String,
    duration_minutes: Option<i64>,
    signature: String,
}

impl OverrideRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            override_id: row.get(0)?,
            original_event_id: row.get(1)?,
            ts_seconds: row.get(2)?,
            ts_nanos: row.get(3)?,
            operator: row.get(4)?,
            reason: row.get(5)?,
            new_decision: row.get(6)?,
            duration_minutes: row.get(7)?,
            signature: row.get(8)?,
        })
    }

    fn into_override(self) -> ActumResult<AuditOverride> {
        let corrupt = |what: &str, detail: String| {
            ActumError::Serialization(format!(
                "override {} has invalid {}: {}",
                self.override_id, what, detail
            ))
        };
        Ok(AuditOverride {
            override_id: OverrideId::new(self.override_id.clone()),
            original_event_id: EventId::new(self.original_event_id.clone()),
            timestamp: Timestamp {
                seconds_since_epoch: u64::try_from(self.ts_seconds)
                    .map_err(|e| corrupt("timestamp", e.to_string()))?,
                nanoseconds: u32::try_from(self.ts_nanos)
                    .map_err(|e| corrupt("timestamp", e.to_string()))?,
            },
            operator: self.operator.clone(),
            reason: self.reason.clone(),
            new_decision: self
                .new_decision
                .parse()
                .map_err(|e| corrupt("new_decision", e))?,
            duration_minutes: self
                .duration_minutes
                .map(u32::try_from)
                .transpose()
                .map_err(|e| corrupt("duration_minutes", e.to_string()))?,
            signature: ChainSignature::new(self.signature.clone()),
        })
    }
}

fn storage_err(context: &str, e: rusqlite::Error) -> ActumError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation => {
            ActumError::Conflict(format!("{}: {}", context, e))
        }
        _ => ActumError::Storage(format!("{}: {}", context, e)),
    }
}

fn to_i64(value: u64, what: &str) -> ActumResult<i64> {
    i64::try_from(value).map_err(|_| ActumError::Storage(format!("{} out of range", what)))
}

impl SqliteAuditStore {
    /// Open or create an audit database at the given path.
    pub fn open(path: &Path) -> ActumResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ActumError::Storage(format!("failed to open database: {}", e)))?;
        Self::init(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> ActumResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ActumError::Storage(format!("failed to open database: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> ActumResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| storage_err("failed to set pragmas", e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| storage_err("failed to create tables", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> ActumResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ActumError::Storage(format!("lock poisoned: {}", e)))
    }

    fn select_events(&self, sql: &str, values: Vec<Value>) -> ActumResult<Vec<AuditEvent>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| storage_err("prepare failed", e))?;
        let rows = stmt
            .query_map(params_from_iter(values), EventRow::read)
            .map_err(|e| storage_err("query failed", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| storage_err("row read failed", e))?;
        rows.into_iter().map(EventRow::into_event).collect()
    }
}

impl AuditStore for SqliteAuditStore {
    fn append(&self, event: &AuditEvent) -> ActumResult<()> {
        let tags = serde_json::to_string(&event.decision.triggered_tags)
            .map_err(|e| ActumError::Serialization(e.to_string()))?;
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO audit_events ({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                EVENT_COLUMNS
            ),
            params![
                to_i64(event.sequence, "sequence")?,
                event.event_id.as_str(),
                to_i64(event.timestamp.seconds_since_epoch, "timestamp")?,
                event.timestamp.nanoseconds,
                event.user,
                event.client_id,
                event.input_type.as_str(),
                event.input_hash,
                event.decision.decision.as_str(),
                event.decision.risk_level.as_str(),
                event.decision.confidence_score,
                event.decision.explanation,
                tags,
                event.decision.policy_version.as_str(),
                event.signature.as_str(),
                event.previous_signature.as_str(),
            ],
        )
        .map_err(|e| storage_err("insert failed", e))?;
        Ok(())
    }

    fn tail(&self) -> ActumResult<Option<ChainTail>> {
        let conn = self.lock()?;
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT sequence, signature FROM audit_events ORDER BY sequence DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| storage_err("tail query failed", e))?;
        row.map(|(sequence, signature)| {
            Ok(ChainTail {
                sequence: u64::try_from(sequence)
                    .map_err(|_| ActumError::Serialization("negative sequence".into()))?,
                signature: ChainSignature::new(signature),
            })
        })
        .transpose()
    }

    fn get(&self, event_id: &EventId) -> ActumResult<Option<AuditEvent>> {
        let sql = format!(
            "SELECT {} FROM audit_events WHERE event_id = ?1",
            EVENT_COLUMNS
        );
        Ok(self
            .select_events(&sql, vec![Value::Text(event_id.to_string())])?
            .into_iter()
            .next())
    }

    fn get_by_sequence(&self, sequence: u64) -> ActumResult<Option<AuditEvent>> {
        let sql = format!(
            "SELECT {} FROM audit_events WHERE sequence = ?1",
            EVENT_COLUMNS
        );
        Ok(self
            .select_events(&sql, vec![Value::Integer(to_i64(sequence, "sequence")?)])?
            .into_iter()
            .next())
    }

    fn scan(&self, start: u64, max: usize) -> ActumResult<Vec<AuditEvent>> {
        let sql = format!(
            "SELECT {} FROM audit_events WHERE sequence >= ?1 ORDER BY sequence ASC LIMIT ?2",
            EVENT_COLUMNS
        );
        self.select_events(
            &sql,
            vec![
                Value::Integer(to_i64(start, "sequence")?),
                Value::Integer(to_i64(max as u64, "limit")?),
            ],
        )
    }

    fn query(&self, filter: &AuditFilter) -> ActumResult<Vec<AuditEvent>> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(d) = filter.decision {
            values.push(Value::Text(d.as_str().to_string()));
            clauses.push(format!("decision = ?{}", values.len()));
        }
        if let Some(r) = filter.risk_level {
            values.push(Value::Text(r.as_str().to_string()));
            clauses.push(format!("risk_level = ?{}", values.len()));
        }
        if let Some(u) = &filter.user {
            values.push(Value::Text(u.clone()));
            clauses.push(format!("user = ?{}", values.len()));
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        values.push(Value::Integer(to_i64(filter.limit as u64, "limit")?));
        let limit_idx = values.len();
        values.push(Value::Integer(to_i64(filter.offset as u64, "offset")?));
        let offset_idx = values.len();

        let sql = format!(
            "SELECT {} FROM audit_events {} ORDER BY sequence DESC LIMIT ?{} OFFSET ?{}",
            EVENT_COLUMNS, where_clause, limit_idx, offset_idx
        );
        self.select_events(&sql, values)
    }

    fn counts(&self) -> ActumResult<DecisionCounts> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT decision, COUNT(*) FROM audit_events GROUP BY decision")
            .map_err(|e| storage_err("prepare failed", e))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|e| storage_err("count query failed", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| storage_err("row read failed", e))?;

        let mut counts = DecisionCounts::default();
        for (decision, n) in rows {
            let n = u64::try_from(n).map_err(|_| {
                ActumError::Storage(format!("negative count {} for '{}'", n, decision))
            })?;
            counts.total += n;
            match decision.as_str() {
                "block" => counts.blocked += n,
                "flag" => counts.flagged += n,
                "allow" => counts.allowed += n,
                other => tracing::warn!(decision = other, "unknown decision value in audit store"),
            }
        }
        Ok(counts)
    }

    fn append_override(&self, record: &AuditOverride) -> ActumResult<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO audit_overrides ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                OVERRIDE_COLUMNS
            ),
            params![
                record.override_id.as_str(),
                record.original_event_id.as_str(),
                to_i64(record.timestamp.seconds_since_epoch, "timestamp")?,
                record.timestamp.nanoseconds,
                record.operator,
                record.reason,
                record.new_decision.as_str(),
                record.duration_minutes,
                record.signature.as_str(),
            ],
        )
        .map_err(|e| storage_err("override insert failed", e))?;
        Ok(())
    }

    fn overrides_for(&self, event_id: &EventId) -> ActumResult<Vec<AuditOverride>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM audit_overrides WHERE original_event_id = ?1 \
                 ORDER BY ts_seconds, ts_nanos, override_id",
                OVERRIDE_COLUMNS
            ))
            .map_err(|e| storage_err("prepare failed", e))?;
        let rows = stmt
            .query_map(params![event_id.as_str()], OverrideRow::read)
            .map_err(|e| storage_err("override query failed", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| storage_err("row read failed", e))?;
        rows.into_iter().map(OverrideRow::into_override).collect()
    }
}
