//! Tamper evidence: "What can someone with write access to the database do
//! without being noticed?"
//!
//! Each test commits a real chain to a SQLite file, then edits the file
//! directly through a second connection, the way an operator with shell
//! access would, and checks that verification and export notice.
#![cfg(feature = "sqlite")]

use std::path::Path;
use std::sync::Arc;

use actum_audit::{
    verify_bundle, AuditError, AuditTrail, ChainSigner, SqliteAuditStore, TrailConfig,
};
use actum_core::{
    input_digest, Action, AuditEvent, Decision, EventId, InputType, PendingEvent, PolicyVersion,
    RiskTier, Timestamp,
};
use rusqlite::{params, Connection};

const SECRET: &[u8] = b"integration-secret-0123456789";

fn pending(user: &str, action: Action, risk_level: RiskTier) -> PendingEvent {
    let timestamp = Timestamp::now();
    PendingEvent {
        event_id: EventId::generate(&timestamp),
        timestamp,
        user: user.to_string(),
        client_id: "integration".to_string(),
        input_type: InputType::Text,
        input_hash: input_digest(user),
        decision: Decision {
            decision: action,
            risk_level,
            confidence_score: 65,
            explanation: format!("{} for {}", action, user),
            triggered_tags: vec!["ProhibitedBiometric".to_string()],
            policy_version: PolicyVersion::new("pack-2025-01-01-v1"),
        },
    }
}

fn open_trail(path: &Path) -> AuditTrail {
    let store = Arc::new(SqliteAuditStore::open(path).unwrap());
    AuditTrail::open(
        store,
        ChainSigner::new(SECRET).unwrap(),
        TrailConfig::default(),
    )
    .unwrap()
}

async fn seed(path: &Path, n: usize) -> Vec<AuditEvent> {
    let trail = open_trail(path);
    let mut events = Vec::new();
    for i in 0..n {
        events.push(
            trail
                .commit(pending(
                    &format!("user-{}", i),
                    Action::Block,
                    RiskTier::Unacceptable,
                ))
                .await
                .unwrap(),
        );
    }
    events
}

fn sql(path: &Path, statement: &str, sequence: u64) {
    let conn = Connection::open(path).unwrap();
    conn.execute(statement, params![sequence as i64]).unwrap();
}

#[tokio::test]
async fn untouched_database_verifies_and_exports() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.db");
    let events = seed(&path, 5).await;

    let trail = open_trail(&path);
    let report = trail.verify_chain().unwrap();
    assert!(report.valid);
    assert_eq!(report.events_checked, 5);

    for e in &events {
        let bundle = trail.export_bundle(&e.event_id).unwrap();
        assert_eq!(
            bundle.predecessor.as_ref().map(|p| p.sequence),
            e.sequence.checked_sub(1)
        );
        verify_bundle(&bundle, trail.signer()).unwrap();
    }
}

#[tokio::test]
async fn downgrading_a_block_is_detected_downstream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.db");
    let events = seed(&path, 6).await;

    sql(
        &path,
        "UPDATE audit_events SET decision = 'allow', risk_level = 'minimal' WHERE sequence = ?1",
        3,
    );

    let trail = open_trail(&path);
    for (n, e) in events.iter().enumerate() {
        let result = trail.export_bundle(&e.event_id);
        if n < 3 {
            assert!(result.is_ok(), "event {} precedes the edit", n);
        } else {
            assert!(
                matches!(result, Err(AuditError::TamperDetected { sequence: 3, .. })),
                "event {} follows the edit",
                n
            );
        }
    }
    assert_eq!(trail.verify_chain().unwrap().first_invalid, Some(3));
}

#[tokio::test]
async fn deleting_a_row_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.db");
    let events = seed(&path, 4).await;

    sql(&path, "DELETE FROM audit_events WHERE sequence = ?1", 1);

    let trail = open_trail(&path);
    let report = trail.verify_chain().unwrap();
    assert!(!report.valid);
    assert_eq!(report.first_invalid, Some(2));
    assert!(trail.export_bundle(&events[0].event_id).is_ok());
    assert!(trail.export_bundle(&events[3].event_id).is_err());
}

#[tokio::test]
async fn copying_fields_between_rows_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.db");
    seed(&path, 3).await;

    // Give row 2 the user recorded on row 1.
    sql(
        &path,
        "UPDATE audit_events SET user = (SELECT user FROM audit_events WHERE sequence = 1) \
         WHERE sequence = ?1",
        2,
    );

    let report = open_trail(&path).verify_chain().unwrap();
    assert_eq!(report.first_invalid, Some(2));
}

#[tokio::test]
async fn writer_resumes_chain_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.db");
    let first = seed(&path, 2).await;

    let trail = open_trail(&path);
    let next = trail
        .commit(pending("late", Action::Flag, RiskTier::High))
        .await
        .unwrap();
    assert_eq!(next.sequence, 2);
    assert_eq!(next.previous_signature, first[1].signature);
    assert!(trail.verify_chain().unwrap().valid);
}
