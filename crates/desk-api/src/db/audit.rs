//! Audit event persistence: an append-only hash chain.
//!
//! Every persisted mutation appends an event whose SHA-256 hash covers the
//! previous event's hash, forming a tamper-evident log.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Hash preceding the first event.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Serializes appends so two writers never chain onto the same predecessor.
const APPEND_LOCK_KEY: i64 = 0x6465_736b_6175_6474;

/// An audit event to be persisted.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub event_type: String,
    /// User id of the caller, when the token carried one.
    pub actor: Option<String>,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub action: String,
    pub metadata: serde_json::Value,
}

/// `SHA-256(previous_hash || event_type || resource_type || resource_id || action)`.
pub fn chain_hash(previous_hash: &str, event: &AuditEvent) -> String {
    sha256_hex(&format!(
        "{}{}{}{}{}",
        previous_hash, event.event_type, event.resource_type, event.resource_id, event.action,
    ))
}

/// Append an audit event to the log, returning its id.
pub async fn append(pool: &PgPool, event: AuditEvent) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(APPEND_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    let previous_hash: Option<String> =
        sqlx::query_scalar("SELECT event_hash FROM audit_events ORDER BY seq DESC LIMIT 1")
            .fetch_optional(&mut *tx)
            .await?;
    let prev = previous_hash.as_deref().unwrap_or(GENESIS_HASH);
    let event_hash = chain_hash(prev, &event);

    sqlx::query(
        "INSERT INTO audit_events (id, event_type, actor, resource_type, resource_id,
         action, metadata, previous_hash, event_hash, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())",
    )
    .bind(id)
    .bind(&event.event_type)
    .bind(&event.actor)
    .bind(&event.resource_type)
    .bind(event.resource_id)
    .bind(&event.action)
    .bind(&event.metadata)
    .bind(prev)
    .bind(&event_hash)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(id)
}

/// Verify the first `limit` events of the chain.
pub async fn verify_chain_integrity(
    pool: &PgPool,
    limit: i64,
) -> Result<ChainIntegrityResult, sqlx::Error> {
    let events = sqlx::query_as::<_, AuditEventRow>(
        "SELECT id, event_type, actor, resource_type, resource_id,
         action, metadata, previous_hash, event_hash, created_at
         FROM audit_events ORDER BY seq ASC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(check_links(&events))
}

/// Count events whose `previous_hash` or recomputed hash does not match.
pub fn check_links(events: &[AuditEventRow]) -> ChainIntegrityResult {
    let mut broken_links = 0;
    let mut last_hash = GENESIS_HASH.to_string();

    for row in events {
        let prev = row.previous_hash.as_deref().unwrap_or(GENESIS_HASH);
        let recomputed = chain_hash(prev, &row.as_event());
        if prev != last_hash || recomputed != row.event_hash {
            broken_links += 1;
        }
        last_hash = row.event_hash.clone();
    }

    ChainIntegrityResult {
        total_events: events.len(),
        broken_links,
        chain_valid: broken_links == 0,
    }
}

/// Result of chain integrity verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainIntegrityResult {
    pub total_events: usize,
    pub broken_links: usize,
    pub chain_valid: bool,
}

/// Database row for audit events.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditEventRow {
    pub id: Uuid,
    pub event_type: String,
    pub actor: Option<String>,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub action: String,
    pub metadata: serde_json::Value,
    pub previous_hash: Option<String>,
    pub event_hash: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEventRow {
    fn as_event(&self) -> AuditEvent {
        AuditEvent {
            event_type: self.event_type.clone(),
            actor: self.actor.clone(),
            resource_type: self.resource_type.clone(),
            resource_id: self.resource_id,
            action: self.action.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    result.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(action: &str) -> AuditEvent {
        AuditEvent {
            event_type: format!("incidents.{action}"),
            actor: None,
            resource_type: "incidents".into(),
            resource_id: Uuid::nil(),
            action: action.into(),
            metadata: serde_json::Value::Null,
        }
    }

    fn chain(actions: &[&str]) -> Vec<AuditEventRow> {
        let mut prev = GENESIS_HASH.to_string();
        actions
            .iter()
            .map(|a| {
                let e = event(a);
                let hash = chain_hash(&prev, &e);
                let row = AuditEventRow {
                    id: Uuid::new_v4(),
                    event_type: e.event_type,
                    actor: e.actor,
                    resource_type: e.resource_type,
                    resource_id: e.resource_id,
                    action: e.action,
                    metadata: e.metadata,
                    previous_hash: Some(prev.clone()),
                    event_hash: hash.clone(),
                    created_at: Utc::now(),
                };
                prev = hash;
                row
            })
            .collect()
    }

    #[test]
    fn chain_hash_is_hex_sha256_and_depends_on_predecessor() {
        let a = chain_hash(GENESIS_HASH, &event("create"));
        let b = chain_hash(&a, &event("create"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn intact_chain_verifies() {
        let rows = chain(&["create", "transition", "assign"]);
        let result = check_links(&rows);
        assert!(result.chain_valid);
        assert_eq!(result.total_events, 3);
    }

    #[test]
    fn edited_event_breaks_chain() {
        let mut rows = chain(&["create", "transition", "assign"]);
        rows[1].action = "delete".into();
        let result = check_links(&rows);
        assert!(!result.chain_valid);
        assert_eq!(result.broken_links, 1);
    }

    #[test]
    fn removed_event_breaks_chain() {
        let mut rows = chain(&["create", "transition", "assign"]);
        rows.remove(1);
        assert!(!check_links(&rows).chain_valid);
    }
}
