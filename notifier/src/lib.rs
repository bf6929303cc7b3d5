use anyhow::Context;
use async_trait::async_trait;
use domain::{Alert, AlertOwner, ComparisonOp, IndicatorKind};

/// Result of one dispatch attempt. Transport errors surface as `Err` from
/// [`AlertNotifier::notify`]; `Skipped` means the transport is not configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent { id: Option<String> },
    Skipped,
}

#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(
        &self,
        owner: &AlertOwner,
        alert: &Alert,
        current_value: f64,
    ) -> anyhow::Result<DispatchOutcome>;
}

/// The outbound email transport. Missing credentials is a capability gate,
/// not an error: `Disabled` logs and reports `Skipped`.
pub enum Sender {
    Disabled,
    Resend(ResendMailer),
}

impl Sender {
    pub fn resend(api_key: &str, from_address: String, http_client: reqwest::Client) -> Sender {
        Sender::Resend(ResendMailer {
            client: resend_rs::Resend::with_client(api_key, http_client),
            from_address,
        })
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Sender::Resend(_))
    }
}

#[async_trait]
impl AlertNotifier for Sender {
    async fn notify(
        &self,
        owner: &AlertOwner,
        alert: &Alert,
        current_value: f64,
    ) -> anyhow::Result<DispatchOutcome> {
        match self {
            Sender::Disabled => {
                tracing::warn!(
                    to = %owner.email,
                    alert_id = %alert.id,
                    "skipping alert email (transport not configured)"
                );
                Ok(DispatchOutcome::Skipped)
            }
            Sender::Resend(mailer) => mailer.send(owner, alert, current_value).await,
        }
    }
}

pub struct ResendMailer {
    client: resend_rs::Resend,
    from_address: String,
}

impl ResendMailer {
    /// One send attempt, no retry. A lost email is recovered by the owner
    /// re-arming the alert, never by a duplicate trigger.
    async fn send(
        &self,
        owner: &AlertOwner,
        alert: &Alert,
        current_value: f64,
    ) -> anyhow::Result<DispatchOutcome> {
        let request = resend_rs::types::CreateEmailBaseOptions::new(
            self.from_address.as_str(),
            [owner.email.as_str()],
            subject(alert),
        )
        .with_text(&body(owner, alert, current_value));

        let response = self
            .client
            .emails
            .send(request)
            .await
            .context("calling resend API")?;

        let id = response.id.to_string();
        tracing::debug!(to = %owner.email, alert_id = %alert.id, email_id = %id, "alert email sent");
        Ok(DispatchOutcome::Sent { id: Some(id) })
    }
}

pub fn subject(alert: &Alert) -> String {
    format!("Alert triggered: {}", alert.display_name)
}

pub fn body(owner: &AlertOwner, alert: &Alert, current_value: f64) -> String {
    let greeting = match owner.display_name.as_deref() {
        Some(name) => format!("Hi {name},"),
        None => "Hi,".to_string(),
    };
    let indicator = indicator_label(alert);
    let mut text = format!(
        "{greeting}\n\n\
         Your alert \"{}\" just fired: the {indicator} is now {:.2}, {} your target of {:.2}.\n",
        alert.display_name,
        current_value,
        comparison_phrase(alert.op),
        alert.target_value,
    );
    if let Some(message) = alert.custom_message.as_deref() {
        text.push('\n');
        text.push_str(message);
        text.push('\n');
    }
    text.push_str("\nThis alert will not fire again unless you re-arm it.\n");
    text
}

fn indicator_label(alert: &Alert) -> String {
    match alert.kind {
        IndicatorKind::Currency => match alert.currency_house.as_deref() {
            Some(house) => format!("{house} dollar quotation"),
            None => "dollar quotation".to_string(),
        },
        IndicatorKind::Inflation => "monthly inflation index".to_string(),
        IndicatorKind::CountryRisk => "country risk index".to_string(),
        IndicatorKind::Uva => "UVA value".to_string(),
        IndicatorKind::FixedTermRate => "fixed-term deposit rate".to_string(),
    }
}

fn comparison_phrase(op: ComparisonOp) -> &'static str {
    match op {
        ComparisonOp::Above => "above",
        ComparisonOp::Below => "below",
        ComparisonOp::Near => "near",
    }
}
