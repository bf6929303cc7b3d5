pub mod checker;
pub mod indicators;

pub use checker::{AlertChecker, CheckOutcome, RunSummary};
pub use indicators::{HttpIndicatorResolver, IndicatorResolver, ResolveError};
