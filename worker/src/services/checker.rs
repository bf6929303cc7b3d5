use std::sync::Arc;

use chrono::Utc;
use domain::{Alert, AlertOwner};
use metrics::counter;
use notifier::{AlertNotifier, DispatchOutcome};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::repositories::AlertRepository;
use crate::services::IndicatorResolver;

/// Aggregate result of one run, for operational logging only.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub users_checked: usize,
    pub alerts_checked: usize,
    pub alerts_triggered: usize,
}

/// What happened to one alert during a check. Never carries an error: every
/// failure mode is logged and absorbed at this boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Condition met, transition committed, dispatch attempted.
    Triggered,
    /// Condition met but the store reported the alert was no longer active;
    /// no dispatch.
    AlreadyHandled,
    ConditionNotMet,
    ResolutionFailed,
    /// The trigger transition could not be written; no dispatch.
    StoreFailed,
    NotActive,
}

pub struct AlertChecker<R, V, N>
where
    R: AlertRepository + 'static,
    V: IndicatorResolver + 'static,
    N: AlertNotifier + 'static,
{
    alert_repo: Arc<R>,
    resolver: Arc<V>,
    notifier: Arc<N>,
    max_concurrency: usize,
}

impl<R, V, N> AlertChecker<R, V, N>
where
    R: AlertRepository + 'static,
    V: IndicatorResolver + 'static,
    N: AlertNotifier + 'static,
{
    pub fn new(
        alert_repo: Arc<R>,
        resolver: Arc<V>,
        notifier: Arc<N>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            alert_repo,
            resolver,
            notifier,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Check every active alert of every user holding one. Users are walked
    /// sequentially, a user's alerts concurrently under the configured
    /// bound. Always returns a summary; a run where everything failed is a
    /// run of zeros, not an error.
    pub async fn run_all_checks(self: Arc<Self>) -> RunSummary {
        let mut summary = RunSummary::default();

        let owners = match self.alert_repo.list_owners_with_active_alerts().await {
            Ok(owners) => owners,
            Err(err) => {
                error!(error = %err, "could not enumerate users with active alerts");
                return summary;
            }
        };
        info!(user_count = owners.len(), "starting alert check run");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        for owner in owners {
            summary.users_checked += 1;

            let alerts = match self.alert_repo.list_alerts_for_user(owner.user_id).await {
                Ok(alerts) => alerts,
                Err(err) => {
                    warn!(user_id = %owner.user_id, error = %err, "could not load alerts for user");
                    continue;
                }
            };
            let active: Vec<Alert> = alerts.into_iter().filter(Alert::is_active).collect();
            if active.is_empty() {
                continue;
            }

            let before = self.count_triggered_or_zero(owner.user_id).await;

            let mut handles = Vec::with_capacity(active.len());
            for alert in active {
                summary.alerts_checked += 1;
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    // The semaphore is never closed while the run lives.
                    break;
                };
                let checker = self.clone();
                let owner = owner.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = permit;
                    checker.check_alert(&alert, &owner).await
                }));
            }
            for handle in handles {
                if let Err(join_err) = handle.await {
                    warn!(user_id = %owner.user_id, error = %join_err, "alert check task panicked");
                }
            }

            let after = self.count_triggered_or_zero(owner.user_id).await;
            summary.alerts_triggered += after.saturating_sub(before) as usize;
        }

        counter!("alert_checks_total").increment(summary.alerts_checked as u64);
        counter!("alerts_triggered_total").increment(summary.alerts_triggered as u64);
        info!(
            users_checked = summary.users_checked,
            alerts_checked = summary.alerts_checked,
            alerts_triggered = summary.alerts_triggered,
            "alert check run finished"
        );
        summary
    }

    /// Check one alert. Never propagates an error: the caller is iterating
    /// many alerts and one broken provider, store write, or transport must
    /// not take the others down.
    pub async fn check_alert(&self, alert: &Alert, owner: &AlertOwner) -> CheckOutcome {
        if !alert.is_active() {
            return CheckOutcome::NotActive;
        }

        let current = match self.resolver.resolve(alert).await {
            Ok(value) => value,
            Err(err) => {
                warn!(alert_id = %alert.id, kind = alert.kind.as_str(), error = %err, "indicator resolution failed");
                // A failed resolution still counts as having looked, so a
                // structurally broken alert does not look perpetually unchecked.
                self.stamp_checked(alert).await;
                counter!("alert_resolution_failures_total").increment(1);
                return CheckOutcome::ResolutionFailed;
            }
        };
        self.stamp_checked(alert).await;

        if !alert.op.matches(current, alert.target_value) {
            return CheckOutcome::ConditionNotMet;
        }

        // Commit the transition before attempting the send: the defining
        // event is the condition becoming true, not the email arriving. A
        // lost notification is accepted; a duplicate trigger is not.
        let committed = match self
            .alert_repo
            .mark_triggered(alert.id, alert.user_id, Utc::now())
            .await
        {
            Ok(committed) => committed,
            Err(err) => {
                warn!(alert_id = %alert.id, error = %err, "trigger transition failed");
                return CheckOutcome::StoreFailed;
            }
        };
        if !committed {
            debug!(alert_id = %alert.id, "alert no longer active, skipping notification");
            return CheckOutcome::AlreadyHandled;
        }

        info!(
            alert_id = %alert.id,
            user_id = %alert.user_id,
            kind = alert.kind.as_str(),
            current,
            target = alert.target_value,
            "alert triggered"
        );

        match self.notifier.notify(owner, alert, current).await {
            Ok(DispatchOutcome::Sent { id }) => {
                debug!(alert_id = %alert.id, email_id = ?id, "alert notification sent");
            }
            Ok(DispatchOutcome::Skipped) => {}
            Err(err) => {
                // No retry and no rollback; the trigger stands.
                warn!(alert_id = %alert.id, error = %err, "alert notification failed");
            }
        }
        CheckOutcome::Triggered
    }

    async fn stamp_checked(&self, alert: &Alert) {
        if let Err(err) = self
            .alert_repo
            .mark_checked(alert.id, alert.user_id, Utc::now())
            .await
        {
            warn!(alert_id = %alert.id, error = %err, "failed to record check time");
        }
    }

    async fn count_triggered_or_zero(&self, user_id: uuid::Uuid) -> i64 {
        match self.alert_repo.count_triggered(user_id).await {
            Ok(count) => count,
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "could not count triggered alerts");
                0
            }
        }
    }
}
