// Audit Logger
//
// Records every rule decision and the final outcome of an evaluation.
// Failures are logged and swallowed so auditing never blocks a discount.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::discounts::rules::RuleDecision;

/// Audit Logger
///
/// Writes to `discount_audit_log` when a pool is configured, otherwise only
/// to the tracing output.
#[derive(Clone)]
pub struct AuditLogger {
    pool: Option<PgPool>,
}

impl AuditLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Some(pool) }
    }

    /// Logger that only emits tracing events
    pub fn tracing_only() -> Self {
        Self { pool: None }
    }

    /// Record whether one rule applied
    pub async fn log_rule_decision(&self, evaluation_id: Uuid, sale_id: &str, decision: &RuleDecision) {
        let effect = match (&decision.reason, decision.amount) {
            (_, Some(amount)) => format!("applicable, deducts {}", amount),
            (Some(reason), None) => format!("not applicable: {}", reason),
            (None, None) => "not applicable".to_string(),
        };
        let rule_data = serde_json::to_value(decision).unwrap_or(JsonValue::Null);

        self.record(evaluation_id, sale_id, decision.kind.as_str(), rule_data, &effect)
            .await;
    }

    /// Record the discount finally applied, or the reason the evaluation failed
    pub async fn log_outcome(
        &self,
        evaluation_id: Uuid,
        sale_id: &str,
        kind: &str,
        rule_data: JsonValue,
        effect: &str,
    ) {
        self.record(evaluation_id, sale_id, kind, rule_data, effect).await;
    }

    async fn record(
        &self,
        evaluation_id: Uuid,
        sale_id: &str,
        rule_kind: &str,
        rule_data: JsonValue,
        effect: &str,
    ) {
        tracing::debug!(
            "audit evaluation={} sale={} rule={} effect={}",
            evaluation_id,
            sale_id,
            rule_kind,
            effect
        );

        let Some(pool) = &self.pool else {
            return;
        };

        if let Err(e) = insert_audit_record(pool, evaluation_id, sale_id, rule_kind, rule_data, effect).await
        {
            tracing::error!("Failed to write discount audit record: {}", e);
        }
    }

    /// Audit records for a sale, oldest first
    pub async fn get_audit_records(&self, sale_id: &str) -> Result<Vec<AuditRecord>, sqlx::Error> {
        let Some(pool) = &self.pool else {
            return Ok(Vec::new());
        };

        sqlx::query_as::<_, AuditRecord>(
            r#"
            SELECT audit_id, evaluation_id, sale_id, rule_kind, rule_data, effect, created_at
            FROM discount_audit_log
            WHERE sale_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(sale_id)
        .fetch_all(pool)
        .await
    }
}

async fn insert_audit_record(
    pool: &PgPool,
    evaluation_id: Uuid,
    sale_id: &str,
    rule_kind: &str,
    rule_data: JsonValue,
    effect: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO discount_audit_log (evaluation_id, sale_id, rule_kind, rule_data, effect)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(evaluation_id)
    .bind(sale_id)
    .bind(rule_kind)
    .bind(rule_data)
    .bind(effect)
    .execute(pool)
    .await?;

    Ok(())
}

/// Audit record from the database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditRecord {
    pub audit_id: Uuid,
    pub evaluation_id: Uuid,
    pub sale_id: String,
    pub rule_kind: String,
    pub rule_data: JsonValue,
    pub effect: String,
    pub created_at: DateTime<Utc>,
}
