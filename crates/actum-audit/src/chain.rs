use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use zeroize::Zeroizing;

use actum_core::{
    Action, AuditEvent, AuditOverride, ChainSignature, Decision, EventId, InputType,
    OverrideId, PendingEvent, Timestamp,
};

use crate::error::{AuditError, AuditResult};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_PREFIX: &str = "hmac-sha256:";
const EVENT_DOMAIN: &[u8] = b"actum-audit-event-v1\n";
const OVERRIDE_DOMAIN: &[u8] = b"actum-audit-override-v1\n";
pub const MIN_SECRET_BYTES: usize = 16;

/// Fields of an event covered by its signature, in a fixed order.
#[derive(Serialize)]
struct SignedEvent<'a> {
    event_id: &'a EventId,
    timestamp: &'a Timestamp,
    user: &'a str,
    client_id: &'a str,
    input_type: InputType,
    input_hash: &'a str,
    decision: &'a Decision,
}

impl<'a> SignedEvent<'a> {
    fn of_pending(p: &'a PendingEvent) -> Self {
        Self {
            event_id: &p.event_id,
            timestamp: &p.timestamp,
            user: &p.user,
            client_id: &p.client_id,
            input_type: p.input_type,
            input_hash: &p.input_hash,
            decision: &p.decision,
        }
    }

    fn of_event(e: &'a AuditEvent) -> Self {
        Self {
            event_id: &e.event_id,
            timestamp: &e.timestamp,
            user: &e.user,
            client_id: &e.client_id,
            input_type: e.input_type,
            input_hash: &e.input_hash,
            decision: &e.decision,
        }
    }
}

#[derive(Serialize)]
struct SignedOverride<'a> {
    override_id: &'a OverrideId,
    original_event_id: &'a EventId,
    timestamp: &'a Timestamp,
    operator: &'a str,
    reason: &'a str,
    new_decision: Action,
    duration_minutes: Option<u32>,
}

impl<'a> SignedOverride<'a> {
    fn of(o: &'a AuditOverride) -> Self {
        Self {
            override_id: &o.override_id,
            original_event_id: &o.original_event_id,
            timestamp: &o.timestamp,
            operator: &o.operator,
            reason: &o.reason,
            new_decision: o.new_decision,
            duration_minutes: o.duration_minutes,
        }
    }
}

/// Keyed signer for the audit chain.
///
/// `signature(n) = HMAC-SHA256(secret, sequence(n) ‖ previous_signature(n) ‖
/// canonical(record(n)))`. Changing any covered field of any event, or
/// reordering events, breaks every later link.
pub struct ChainSigner {
    secret: Zeroizing<Vec<u8>>,
}

impl ChainSigner {
    pub fn new(secret: &[u8]) -> AuditResult<Self> {
        if secret.len() < MIN_SECRET_BYTES {
            return Err(AuditError::InvalidSecret(format!(
                "secret must be at least {} bytes",
                MIN_SECRET_BYTES
            )));
        }
        Ok(Self {
            secret: Zeroizing::new(secret.to_vec()),
        })
    }

    fn keyed(&self) -> AuditResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AuditError::InvalidSecret(e.to_string()))
    }

    fn event_mac(
        &self,
        sequence: u64,
        previous: &ChainSignature,
        record: &SignedEvent<'_>,
    ) -> AuditResult<HmacSha256> {
        let mut mac = self.keyed()?;
        mac.update(EVENT_DOMAIN);
        mac.update(&sequence.to_be_bytes());
        mac.update(previous.as_str().as_bytes());
        mac.update(&serde_json::to_vec(record)?);
        Ok(mac)
    }

    fn override_mac(
        &self,
        record: &AuditOverride,
        anchor: &ChainSignature,
    ) -> AuditResult<HmacSha256> {
        let mut mac = self.keyed()?;
        mac.update(OVERRIDE_DOMAIN);
        mac.update(anchor.as_str().as_bytes());
        mac.update(&serde_json::to_vec(&SignedOverride::of(record))?);
        Ok(mac)
    }

    /// Sign a pending event at `sequence` on top of `previous`.
    pub fn sign_event(
        &self,
        sequence: u64,
        previous: &ChainSignature,
        pending: &PendingEvent,
    ) -> AuditResult<ChainSignature> {
        let mac = self.event_mac(sequence, previous, &SignedEvent::of_pending(pending))?;
        Ok(render(mac))
    }

    /// Recompute an event's signature from its own fields.
    pub fn verify_event(&self, event: &AuditEvent) -> AuditResult<bool> {
        let Some(bytes) = parse(&event.signature) else {
            return Ok(false);
        };
        let mac = self.event_mac(
            event.sequence,
            &event.previous_signature,
            &SignedEvent::of_event(event),
        )?;
        Ok(mac.verify_slice(&bytes).is_ok())
    }

    /// Sign an override, anchored to the signature of the event it annotates.
    /// The record's own `signature` field is not covered.
    pub fn sign_override(
        &self,
        record: &AuditOverride,
        anchor: &ChainSignature,
    ) -> AuditResult<ChainSignature> {
        Ok(render(self.override_mac(record, anchor)?))
    }

    pub fn verify_override(
        &self,
        record: &AuditOverride,
        anchor: &ChainSignature,
    ) -> AuditResult<bool> {
        let Some(bytes) = parse(&record.signature) else {
            return Ok(false);
        };
        Ok(self
            .override_mac(record, anchor)?
            .verify_slice(&bytes)
            .is_ok())
    }

    /// Check one link of the chain. `previous` is None for the first event.
    ///
    /// Returns `TamperDetected` naming `event.sequence` when the link is broken.
    pub fn check_link(
        &self,
        previous: Option<&AuditEvent>,
        event: &AuditEvent,
    ) -> AuditResult<()> {
        let tamper = |reason: String| AuditError::TamperDetected {
            sequence: event.sequence,
            reason,
        };

        let (expected_sequence, expected_previous) = match previous {
            Some(p) => (p.sequence + 1, p.signature.clone()),
            None => (0, ChainSignature::genesis()),
        };
        if event.sequence != expected_sequence {
            return Err(tamper(format!(
                "expected sequence {}, found {}",
                expected_sequence, event.sequence
            )));
        }
        if event.previous_signature != expected_previous {
            return Err(tamper(
                "previous_signature does not match the preceding event".to_string(),
            ));
        }
        if !self.verify_event(event)? {
            return Err(tamper("signature does not match event contents".to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChainSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainSigner").finish_non_exhaustive()
    }
}

fn render(mac: HmacSha256) -> ChainSignature {
    ChainSignature::new(format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

fn parse(signature: &ChainSignature) -> Option<Vec<u8>> {
    let hex_part = signature.as_str().strip_prefix(SIGNATURE_PREFIX)?;
    hex::decode(hex_part).ok()
}
