use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Alert, AlertOwner, AlertState, ComparisonOp, IndicatorKind};
use notifier::{AlertNotifier, DispatchOutcome};
use uuid::Uuid;
use worker::repositories::AlertRepository;
use worker::services::{AlertChecker, CheckOutcome, IndicatorResolver, ResolveError};

struct InMemoryAlertRepository {
    owners: Vec<AlertOwner>,
    alerts: Mutex<Vec<Alert>>,
}

impl InMemoryAlertRepository {
    fn new(owners: Vec<AlertOwner>, alerts: Vec<Alert>) -> Self {
        Self {
            owners,
            alerts: Mutex::new(alerts),
        }
    }

    fn get(&self, alert_id: Uuid) -> Alert {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == alert_id)
            .cloned()
            .expect("alert exists")
    }
}

#[async_trait]
impl AlertRepository for InMemoryAlertRepository {
    async fn list_owners_with_active_alerts(&self) -> Result<Vec<AlertOwner>> {
        Ok(self.owners.clone())
    }

    async fn list_alerts_for_user(&self, user_id: Uuid) -> Result<Vec<Alert>> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_checked(&self, alert_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut alerts = self.alerts.lock().unwrap();
        if let Some(alert) = alerts
            .iter_mut()
            .find(|a| a.id == alert_id && a.user_id == user_id)
        {
            alert.last_checked_at = Some(at);
        }
        Ok(())
    }

    async fn mark_triggered(
        &self,
        alert_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut alerts = self.alerts.lock().unwrap();
        match alerts.iter_mut().find(|a| {
            a.id == alert_id && a.user_id == user_id && a.state == AlertState::Active
        }) {
            Some(alert) => {
                alert.state = AlertState::Triggered;
                alert.triggered_at = Some(at);
                alert.notification_sent = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_triggered(&self, user_id: Uuid) -> Result<i64> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.user_id == user_id && a.state == AlertState::Triggered)
            .count() as i64)
    }
}

/// Resolver scripted per indicator kind; kinds in `failing` resolve with an
/// error, everything else returns the scripted value.
struct ScriptedResolver {
    values: Vec<(IndicatorKind, f64)>,
    failing: HashSet<IndicatorKind>,
}

impl ScriptedResolver {
    fn value(kind: IndicatorKind, value: f64) -> Self {
        Self {
            values: vec![(kind, value)],
            failing: HashSet::new(),
        }
    }

    fn with_value(mut self, kind: IndicatorKind, value: f64) -> Self {
        self.values.push((kind, value));
        self
    }

    fn with_failure(mut self, kind: IndicatorKind) -> Self {
        self.failing.insert(kind);
        self
    }
}

#[async_trait]
impl IndicatorResolver for ScriptedResolver {
    async fn resolve(&self, alert: &Alert) -> Result<f64, ResolveError> {
        if self.failing.contains(&alert.kind) {
            return Err(ResolveError::EmptySeries);
        }
        self.values
            .iter()
            .find(|(kind, _)| *kind == alert.kind)
            .map(|(_, value)| *value)
            .ok_or(ResolveError::EmptySeries)
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Uuid>>,
    fail: bool,
}

impl RecordingNotifier {
    fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    fn sent_ids(&self) -> Vec<Uuid> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertNotifier for RecordingNotifier {
    async fn notify(
        &self,
        _owner: &AlertOwner,
        alert: &Alert,
        _current_value: f64,
    ) -> Result<DispatchOutcome> {
        self.sent.lock().unwrap().push(alert.id);
        if self.fail {
            return Err(anyhow!("transport unavailable"));
        }
        Ok(DispatchOutcome::Sent { id: None })
    }
}

fn owner(user_id: Uuid) -> AlertOwner {
    AlertOwner {
        user_id,
        email: format!("{user_id}@example.com"),
        display_name: None,
    }
}

fn alert(user_id: Uuid, kind: IndicatorKind, op: ComparisonOp, target: f64) -> Alert {
    Alert {
        id: Uuid::new_v4(),
        user_id,
        kind,
        currency_house: match kind {
            IndicatorKind::Currency => Some("blue".to_string()),
            _ => None,
        },
        display_name: format!("{} watch", kind.as_str()),
        op,
        target_value: target,
        state: AlertState::Active,
        last_checked_at: None,
        triggered_at: None,
        notification_sent: false,
        custom_message: None,
    }
}

fn checker(
    repo: Arc<InMemoryAlertRepository>,
    resolver: ScriptedResolver,
    notifier: Arc<RecordingNotifier>,
) -> Arc<AlertChecker<InMemoryAlertRepository, ScriptedResolver, RecordingNotifier>> {
    Arc::new(AlertChecker::new(repo, Arc::new(resolver), notifier, 4))
}

#[tokio::test]
async fn paused_alert_is_never_touched() {
    let user = Uuid::new_v4();
    let mut paused = alert(user, IndicatorKind::Currency, ComparisonOp::Above, 1000.0);
    paused.state = AlertState::Paused;
    let id = paused.id;

    let repo = Arc::new(InMemoryAlertRepository::new(
        vec![owner(user)],
        vec![paused.clone()],
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let checker = checker(
        repo.clone(),
        ScriptedResolver::value(IndicatorKind::Currency, 1050.0),
        notifier.clone(),
    );

    let outcome = checker.check_alert(&paused, &owner(user)).await;

    assert_eq!(outcome, CheckOutcome::NotActive);
    let stored = repo.get(id);
    assert_eq!(stored.state, AlertState::Paused);
    assert!(stored.last_checked_at.is_none());
    assert!(stored.triggered_at.is_none());
    assert!(notifier.sent_ids().is_empty());
}

#[tokio::test]
async fn false_condition_only_advances_check_time() {
    let user = Uuid::new_v4();
    // Strict less-than: 5.0 against a target of 5.0 must not fire.
    let watched = alert(user, IndicatorKind::Inflation, ComparisonOp::Below, 5.0);
    let id = watched.id;

    let repo = Arc::new(InMemoryAlertRepository::new(
        vec![owner(user)],
        vec![watched.clone()],
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let checker = checker(
        repo.clone(),
        ScriptedResolver::value(IndicatorKind::Inflation, 5.0),
        notifier.clone(),
    );

    let outcome = checker.check_alert(&watched, &owner(user)).await;

    assert_eq!(outcome, CheckOutcome::ConditionNotMet);
    let stored = repo.get(id);
    assert_eq!(stored.state, AlertState::Active);
    assert!(stored.last_checked_at.is_some());
    assert!(stored.triggered_at.is_none());
    assert!(!stored.notification_sent);
    assert!(notifier.sent_ids().is_empty());
}

#[tokio::test]
async fn trigger_commits_state_and_notifies_once() {
    let user = Uuid::new_v4();
    let watched = alert(user, IndicatorKind::Currency, ComparisonOp::Above, 1000.0);
    let id = watched.id;

    let repo = Arc::new(InMemoryAlertRepository::new(
        vec![owner(user)],
        vec![watched.clone()],
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let checker = checker(
        repo.clone(),
        ScriptedResolver::value(IndicatorKind::Currency, 1050.0),
        notifier.clone(),
    );

    let outcome = checker.check_alert(&watched, &owner(user)).await;

    assert_eq!(outcome, CheckOutcome::Triggered);
    let stored = repo.get(id);
    assert_eq!(stored.state, AlertState::Triggered);
    assert!(stored.triggered_at.is_some());
    assert!(stored.notification_sent);
    assert!(stored.last_checked_at.is_some());
    assert_eq!(notifier.sent_ids(), vec![id]);
}

#[tokio::test]
async fn stale_active_copy_does_not_notify_twice() {
    let user = Uuid::new_v4();
    // The store already moved the alert on, but the checker still holds a
    // copy marked active (e.g. a concurrent run won the transition).
    let mut stored = alert(user, IndicatorKind::Uva, ComparisonOp::Above, 900.0);
    stored.state = AlertState::Triggered;
    stored.triggered_at = Some(Utc::now());
    stored.notification_sent = true;
    let mut stale = stored.clone();
    stale.state = AlertState::Active;
    stale.triggered_at = None;

    let repo = Arc::new(InMemoryAlertRepository::new(
        vec![owner(user)],
        vec![stored],
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let checker = checker(
        repo.clone(),
        ScriptedResolver::value(IndicatorKind::Uva, 950.0),
        notifier.clone(),
    );

    let outcome = checker.check_alert(&stale, &owner(user)).await;

    assert_eq!(outcome, CheckOutcome::AlreadyHandled);
    assert!(notifier.sent_ids().is_empty());
}

#[tokio::test]
async fn dispatch_failure_leaves_alert_triggered() {
    let user = Uuid::new_v4();
    let watched = alert(user, IndicatorKind::CountryRisk, ComparisonOp::Below, 800.0);
    let id = watched.id;

    let repo = Arc::new(InMemoryAlertRepository::new(
        vec![owner(user)],
        vec![watched.clone()],
    ));
    let notifier = Arc::new(RecordingNotifier::failing());
    let checker = checker(
        repo.clone(),
        ScriptedResolver::value(IndicatorKind::CountryRisk, 650.0),
        notifier.clone(),
    );

    let outcome = checker.check_alert(&watched, &owner(user)).await;

    // No rollback: the transition stands even though the send failed.
    assert_eq!(outcome, CheckOutcome::Triggered);
    let stored = repo.get(id);
    assert_eq!(stored.state, AlertState::Triggered);
    assert_eq!(notifier.sent_ids(), vec![id]);
}

#[tokio::test]
async fn resolution_failure_does_not_block_sibling_alert() {
    let user = Uuid::new_v4();
    let broken = alert(user, IndicatorKind::Inflation, ComparisonOp::Above, 3.0);
    let healthy = alert(user, IndicatorKind::Currency, ComparisonOp::Above, 1000.0);
    let broken_id = broken.id;
    let healthy_id = healthy.id;

    let repo = Arc::new(InMemoryAlertRepository::new(
        vec![owner(user)],
        vec![broken, healthy],
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let checker = checker(
        repo.clone(),
        ScriptedResolver::value(IndicatorKind::Currency, 1050.0)
            .with_failure(IndicatorKind::Inflation),
        notifier.clone(),
    );

    let summary = checker.run_all_checks().await;

    assert_eq!(summary.users_checked, 1);
    assert_eq!(summary.alerts_checked, 2);
    assert_eq!(summary.alerts_triggered, 1);

    let broken_stored = repo.get(broken_id);
    assert_eq!(broken_stored.state, AlertState::Active);
    // A failed resolution still counts as having looked.
    assert!(broken_stored.last_checked_at.is_some());

    assert_eq!(repo.get(healthy_id).state, AlertState::Triggered);
    assert_eq!(notifier.sent_ids(), vec![healthy_id]);
}

#[tokio::test]
async fn one_failing_user_does_not_abort_the_run() {
    let (user_a, user_b, user_c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let alerts = vec![
        alert(user_a, IndicatorKind::Currency, ComparisonOp::Above, 1000.0),
        // user_b's only indicator is scripted to fail.
        alert(user_b, IndicatorKind::FixedTermRate, ComparisonOp::Above, 30.0),
        alert(user_c, IndicatorKind::Uva, ComparisonOp::Below, 1000.0),
    ];

    let repo = Arc::new(InMemoryAlertRepository::new(
        vec![owner(user_a), owner(user_b), owner(user_c)],
        alerts,
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let checker = checker(
        repo.clone(),
        ScriptedResolver::value(IndicatorKind::Currency, 1050.0)
            .with_value(IndicatorKind::Uva, 950.0)
            .with_failure(IndicatorKind::FixedTermRate),
        notifier.clone(),
    );

    let summary = checker.run_all_checks().await;

    assert_eq!(summary.users_checked, 3);
    assert_eq!(summary.alerts_checked, 3);
    assert_eq!(summary.alerts_triggered, 2);
    assert_eq!(notifier.sent_ids().len(), 2);
}

#[tokio::test]
async fn run_skips_users_whose_alerts_are_all_inactive() {
    let user = Uuid::new_v4();
    let mut triggered = alert(user, IndicatorKind::Currency, ComparisonOp::Above, 1000.0);
    triggered.state = AlertState::Triggered;
    triggered.triggered_at = Some(Utc::now());
    triggered.notification_sent = true;
    let before = triggered.clone();

    let repo = Arc::new(InMemoryAlertRepository::new(
        vec![owner(user)],
        vec![triggered.clone()],
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let checker = checker(
        repo.clone(),
        ScriptedResolver::value(IndicatorKind::Currency, 1050.0),
        notifier.clone(),
    );

    let summary = checker.run_all_checks().await;

    assert_eq!(summary.users_checked, 1);
    assert_eq!(summary.alerts_checked, 0);
    assert_eq!(summary.alerts_triggered, 0);
    // The already-triggered alert is untouched, field by field.
    let after = repo.get(before.id);
    assert_eq!(after.last_checked_at, before.last_checked_at);
    assert_eq!(after.triggered_at, before.triggered_at);
    assert!(notifier.sent_ids().is_empty());
}
