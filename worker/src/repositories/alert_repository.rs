use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Alert, AlertOwner, AlertState, ComparisonOp, IndicatorKind};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Persistence boundary for alert definitions and their mutable state.
///
/// Every write is a field-scoped update keyed by `(alert_id, user_id)`; a
/// mismatched owner affects zero rows instead of erroring, so this core can
/// never clobber another user's data or a concurrent user edit.
#[async_trait]
pub trait AlertRepository: Send + Sync {
    /// Users holding at least one active alert. An existence query; never
    /// loads alert rows.
    async fn list_owners_with_active_alerts(&self) -> Result<Vec<AlertOwner>>;
    async fn list_alerts_for_user(&self, user_id: Uuid) -> Result<Vec<Alert>>;
    /// Stamp the time of a check attempt, successful or not.
    async fn mark_checked(&self, alert_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> Result<()>;
    /// The one-way `active -> triggered` transition. Returns whether a row
    /// was actually moved; the `state = 'active'` guard makes a second
    /// attempt (or a concurrent pause) a no-op.
    async fn mark_triggered(&self, alert_id: Uuid, user_id: Uuid, at: DateTime<Utc>)
        -> Result<bool>;
    async fn count_triggered(&self, user_id: Uuid) -> Result<i64>;
}

#[derive(Clone)]
pub struct PostgresAlertRepository {
    pool: PgPool,
}

impl PostgresAlertRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertRepository for PostgresAlertRepository {
    async fn list_owners_with_active_alerts(&self) -> Result<Vec<AlertOwner>> {
        let rows = sqlx::query(
            "SELECT u.id, u.email, u.display_name FROM users u
             WHERE EXISTS (
                 SELECT 1 FROM alerts a
                 WHERE a.user_id = u.id AND a.state = 'active'
             )",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(AlertOwner {
                    user_id: row.try_get("id").context("invalid id column")?,
                    email: row.try_get("email")?,
                    display_name: row.try_get("display_name")?,
                })
            })
            .collect()
    }

    async fn list_alerts_for_user(&self, user_id: Uuid) -> Result<Vec<Alert>> {
        let rows = sqlx::query(
            "SELECT id, user_id, kind, currency_house, display_name, op, target_value,
                    state, last_checked_at, triggered_at, notification_sent, custom_message
             FROM alerts
             WHERE user_id = $1
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let kind: String = row.try_get("kind")?;
                let op: String = row.try_get("op")?;
                let state: String = row.try_get("state")?;
                Ok(Alert {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    kind: IndicatorKind::parse(&kind)
                        .with_context(|| format!("unknown indicator kind `{kind}`"))?,
                    currency_house: row.try_get("currency_house")?,
                    display_name: row.try_get("display_name")?,
                    op: ComparisonOp::parse(&op)
                        .with_context(|| format!("unknown comparison op `{op}`"))?,
                    target_value: row.try_get::<f64, _>("target_value")?,
                    state: AlertState::parse(&state),
                    last_checked_at: row.try_get("last_checked_at")?,
                    triggered_at: row.try_get("triggered_at")?,
                    notification_sent: row.try_get("notification_sent")?,
                    custom_message: row.try_get("custom_message")?,
                })
            })
            .collect()
    }

    async fn mark_checked(&self, alert_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE alerts SET last_checked_at = $3 WHERE id = $1 AND user_id = $2")
            .bind(alert_id)
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_triggered(
        &self,
        alert_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE alerts
             SET state = 'triggered', triggered_at = $3, notification_sent = TRUE
             WHERE id = $1 AND user_id = $2 AND state = 'active'",
        )
        .bind(alert_id)
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn count_triggered(&self, user_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM alerts WHERE user_id = $1 AND state = 'triggered'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
