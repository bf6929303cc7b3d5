use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tolerance used by [`ComparisonOp::Near`]. The boundary itself does not
/// match: a difference of exactly this value evaluates to false.
pub const APPROX_TOLERANCE: f64 = 0.01;

/// The economic series an alert watches.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    /// A currency quotation; requires a quotation house (`oficial`, `blue`, ...).
    Currency,
    /// Monthly inflation index.
    Inflation,
    /// Country risk index, in basis points.
    CountryRisk,
    /// Inflation-linked unit value (UVA).
    Uva,
    /// Bank fixed-term deposit rate, annual nominal percent.
    FixedTermRate,
}

impl IndicatorKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "currency" => Some(IndicatorKind::Currency),
            "inflation" => Some(IndicatorKind::Inflation),
            "country_risk" => Some(IndicatorKind::CountryRisk),
            "uva" => Some(IndicatorKind::Uva),
            "fixed_term_rate" => Some(IndicatorKind::FixedTermRate),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IndicatorKind::Currency => "currency",
            IndicatorKind::Inflation => "inflation",
            IndicatorKind::CountryRisk => "country_risk",
            IndicatorKind::Uva => "uva",
            IndicatorKind::FixedTermRate => "fixed_term_rate",
        }
    }
}

/// How the current indicator value is compared against the alert target.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Above,
    Below,
    Near,
}

impl ComparisonOp {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "above" => Some(ComparisonOp::Above),
            "below" => Some(ComparisonOp::Below),
            "near" => Some(ComparisonOp::Near),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonOp::Above => "above",
            ComparisonOp::Below => "below",
            ComparisonOp::Near => "near",
        }
    }

    /// Whether an alert with this operator fires for `current` against `target`.
    /// `Above` and `Below` are strict.
    pub fn matches(self, current: f64, target: f64) -> bool {
        match self {
            ComparisonOp::Above => current > target,
            ComparisonOp::Below => current < target,
            ComparisonOp::Near => (current - target).abs() < APPROX_TOLERANCE,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Active,
    Triggered,
    Paused,
}

impl AlertState {
    /// Unknown strings map to `Paused`: an unrecognized state is never
    /// eligible for checking and never mutated.
    pub fn parse(value: &str) -> Self {
        match value {
            "active" => AlertState::Active,
            "triggered" => AlertState::Triggered,
            _ => AlertState::Paused,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertState::Active => "active",
            AlertState::Triggered => "triggered",
            AlertState::Paused => "paused",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Alert {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: IndicatorKind,
    /// Quotation house, present iff `kind == Currency`.
    pub currency_house: Option<String>,
    pub display_name: String,
    pub op: ComparisonOp,
    pub target_value: f64,
    pub state: AlertState,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub notification_sent: bool,
    pub custom_message: Option<String>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.state == AlertState::Active
    }
}

/// A user holding at least one active alert, as returned by the record store.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AlertOwner {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
}
