use std::time::Duration;

use async_trait::async_trait;
use domain::{Alert, IndicatorKind};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;

/// Why a current value could not be obtained for an alert. All variants are
/// recoverable and scoped to the one alert being checked.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned status {0}")]
    Status(StatusCode),
    #[error("provider payload is missing numeric field `{0}`")]
    MissingField(&'static str),
    #[error("provider returned an empty series")]
    EmptySeries,
    #[error("provider returned a non-finite value")]
    NonFinite,
    #[error("quotation house does not match the alert kind")]
    HouseMismatch,
}

#[async_trait]
pub trait IndicatorResolver: Send + Sync {
    /// Retrieve the single current value to compare against the alert target.
    async fn resolve(&self, alert: &Alert) -> Result<f64, ResolveError>;
}

/// Resolver backed by the two public indicator providers: the quotation API
/// for currency alerts and the series API for everything else.
pub struct HttpIndicatorResolver {
    client: Client,
    quote_api_base: String,
    series_api_base: String,
}

impl HttpIndicatorResolver {
    pub fn new(
        quote_api_base: String,
        series_api_base: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            quote_api_base: quote_api_base.trim_end_matches('/').to_string(),
            series_api_base: series_api_base.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_json(&self, url: String) -> Result<Value, ResolveError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ResolveError::Status(status));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl IndicatorResolver for HttpIndicatorResolver {
    async fn resolve(&self, alert: &Alert) -> Result<f64, ResolveError> {
        let current = match (alert.kind, alert.currency_house.as_deref()) {
            (IndicatorKind::Currency, Some(house)) if !house.is_empty() => {
                let url = format!("{}/v1/dolares/{house}", self.quote_api_base);
                sale_price(&self.fetch_json(url).await?)?
            }
            // A currency alert without a house, or a house on any other kind,
            // is a data-integrity fault: reject rather than guess.
            (IndicatorKind::Currency, _) | (_, Some(_)) => {
                return Err(ResolveError::HouseMismatch)
            }
            (IndicatorKind::Inflation, None) => {
                let url = format!("{}/v1/finanzas/indices/inflacion", self.series_api_base);
                latest_series_value(&self.fetch_json(url).await?)?
            }
            (IndicatorKind::CountryRisk, None) => {
                let url = format!(
                    "{}/v1/finanzas/indices/riesgo-pais/ultimo",
                    self.series_api_base
                );
                point_value(&self.fetch_json(url).await?)?
            }
            (IndicatorKind::Uva, None) => {
                let url = format!("{}/v1/finanzas/indices/uva", self.series_api_base);
                latest_series_value(&self.fetch_json(url).await?)?
            }
            (IndicatorKind::FixedTermRate, None) => {
                let url = format!("{}/v1/finanzas/tasas/plazoFijo", self.series_api_base);
                best_client_rate(&self.fetch_json(url).await?)?
            }
        };
        if !current.is_finite() {
            return Err(ResolveError::NonFinite);
        }
        Ok(current)
    }
}

/// Sale side of a currency quotation payload.
fn sale_price(payload: &Value) -> Result<f64, ResolveError> {
    payload
        .get("venta")
        .and_then(Value::as_f64)
        .ok_or(ResolveError::MissingField("venta"))
}

/// Newest `valor` of a chronologically ordered series payload.
fn latest_series_value(payload: &Value) -> Result<f64, ResolveError> {
    let rows = payload
        .as_array()
        .ok_or(ResolveError::MissingField("valor"))?;
    let last = rows.last().ok_or(ResolveError::EmptySeries)?;
    last.get("valor")
        .and_then(Value::as_f64)
        .ok_or(ResolveError::MissingField("valor"))
}

/// `valor` of a single-point payload.
fn point_value(payload: &Value) -> Result<f64, ResolveError> {
    payload
        .get("valor")
        .and_then(Value::as_f64)
        .ok_or(ResolveError::MissingField("valor"))
}

/// First bank in the fixed-term listing that publishes a client rate. The
/// provider reports the TNA as a fraction; alerts compare in percent.
fn best_client_rate(payload: &Value) -> Result<f64, ResolveError> {
    let rows = payload
        .as_array()
        .ok_or(ResolveError::MissingField("tnaClientes"))?;
    if rows.is_empty() {
        return Err(ResolveError::EmptySeries);
    }
    rows.iter()
        .find_map(|row| row.get("tnaClientes").and_then(Value::as_f64))
        .map(|tna| tna * 100.0)
        .ok_or(ResolveError::MissingField("tnaClientes"))
}
