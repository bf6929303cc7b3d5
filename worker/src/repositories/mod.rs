pub mod alert_repository;

pub use alert_repository::{AlertRepository, PostgresAlertRepository};
