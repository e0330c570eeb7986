use chrono::Utc;
use dashmap::DashMap;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use metrics::counter;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::{AlertConfig, SmtpConfig, WebhookConfig};
use crate::store::Store;
use crate::types::{AlertRow, Severity};

/// Throttled dispatch of alert notifications to email and Slack-compatible
/// webhook channels. Keyed by `(api_id, alert_type)`, mirroring the
/// original's `f"{api_id}:{alert_type}"` cache key, so repeated triggers of
/// the same alert type on the same API don't spam either channel more than
/// once per throttle window.
pub struct AlertService {
    store: Store,
    http: reqwest::Client,
    smtp: SmtpConfig,
    webhook: WebhookConfig,
    throttle_seconds: i64,
    throttle_cache: DashMap<(i64, String), Instant>,
}

impl AlertService {
    pub fn new(store: Store, config: &AlertConfig, smtp: SmtpConfig, webhook: WebhookConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(webhook.timeout_seconds.max(1)))
            .build()
            .expect("failed to build http client for webhook dispatch");

        Self {
            store,
            http,
            smtp,
            webhook,
            throttle_seconds: config.throttle_seconds,
            throttle_cache: DashMap::new(),
        }
    }

    fn is_throttled(&self, api_id: i64, alert_type: &str) -> bool {
        let key = (api_id, alert_type.to_string());
        if let Some(last) = self.throttle_cache.get(&key) {
            if last.elapsed() < Duration::from_secs(self.throttle_seconds.max(0) as u64) {
                return true;
            }
        }
        self.throttle_cache.insert(key, Instant::now());
        false
    }

    /// Fires the email and webhook channels concurrently, each as its own
    /// detached task, so a slow SMTP server never holds up the ingest path
    /// or the webhook dispatch.
    pub async fn dispatch(self: &Arc<Self>, alert: &AlertRow) {
        if self.is_throttled(alert.api_id, &alert.alert_type) {
            info!(
                api_id = alert.api_id,
                alert_type = %alert.alert_type,
                "alert throttled, skipping dispatch"
            );
            return;
        }

        if self.smtp.enabled && self.smtp.user.is_some() {
            let this = self.clone();
            let alert = alert.clone();
            tokio::spawn(async move {
                this.send_email(&alert).await;
            });
        }

        if self.webhook.slack_webhook_url.is_some() {
            let this = self.clone();
            let alert = alert.clone();
            tokio::spawn(async move {
                this.send_webhook(&alert).await;
            });
        }
    }

    async fn send_email(&self, alert: &AlertRow) {
        let result = self.try_send_email(alert).await;
        let status = if result.is_ok() { "sent" } else { "failed" };
        let sent_at = result.is_ok().then(Utc::now);

        if result.is_ok() {
            counter!("alert_notifications_email_sent_total", 1);
        } else {
            counter!("alert_notifications_email_failed_total", 1);
        }

        if let Err(e) = &result {
            error!(error = %e, "failed to send alert email");
        }

        if let Err(e) = self
            .store
            .log_alert_notification(alert.id, "email", status, sent_at)
            .await
        {
            warn!(error = %e, "failed to log email notification");
        }
    }

    async fn try_send_email(&self, alert: &AlertRow) -> anyhow::Result<()> {
        let host = self
            .smtp
            .host
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("smtp host not configured"))?;
        let user = self
            .smtp
            .user
            .clone()
            .ok_or_else(|| anyhow::anyhow!("smtp user not configured"))?;
        let password = self.smtp.password.clone().unwrap_or_default();
        let from = self
            .smtp
            .from_address
            .clone()
            .unwrap_or_else(|| user.clone());

        let color = if matches!(alert.severity.as_str(), "critical") {
            "#dc3545"
        } else {
            "#ffc107"
        };

        let body = format!(
            "<html><body><h2 style=\"color:{color}\">{}</h2><p>{}</p></body></html>",
            alert.title, alert.description
        );

        let mut builder = Message::builder()
            .from(from.parse()?)
            .subject(alert.title.clone())
            .header(ContentType::TEXT_HTML);

        for to in &self.smtp.to_addresses {
            builder = builder.to(to.parse()?);
        }

        let email = builder.body(body)?;

        let creds = Credentials::new(user, password);
        let transport = if self.smtp.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
                .credentials(creds)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .credentials(creds)
                .build()
        };

        transport.send(email).await?;
        Ok(())
    }

    async fn send_webhook(&self, alert: &AlertRow) {
        let result = self.try_send_webhook(alert).await;
        let status = if result.is_ok() { "sent" } else { "failed" };
        let sent_at = result.is_ok().then(Utc::now);

        if result.is_ok() {
            counter!("alert_notifications_webhook_sent_total", 1);
        } else {
            counter!("alert_notifications_webhook_failed_total", 1);
        }

        if let Err(e) = &result {
            error!(error = %e, "failed to send alert webhook");
        }

        if let Err(e) = self
            .store
            .log_alert_notification(alert.id, "webhook", status, sent_at)
            .await
        {
            warn!(error = %e, "failed to log webhook notification");
        }
    }

    async fn try_send_webhook(&self, alert: &AlertRow) -> anyhow::Result<()> {
        let url = self
            .webhook
            .slack_webhook_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("webhook url not configured"))?;

        let color = if matches!(alert.severity.as_str(), "critical") {
            "danger"
        } else {
            "warning"
        };

        let payload = json!({
            "attachments": [{
                "color": color,
                "title": alert.title,
                "text": alert.description,
                "fields": [
                    { "title": "Severity", "value": alert.severity, "short": true },
                    { "title": "Score", "value": format!("{:.1}", alert.risk_score), "short": true },
                    { "title": "Alert ID", "value": alert.id.to_string(), "short": true },
                    { "title": "API", "value": alert.api_id.to_string(), "short": true },
                ],
                "footer": "Boing Security Platform",
                "ts": alert.created_at.timestamp(),
            }]
        });

        let response = self.http.post(url).json(&payload).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("webhook returned status {}", response.status());
        }
        Ok(())
    }
}

pub fn severity_from_str(s: &str) -> Severity {
    match s {
        "critical" => Severity::Critical,
        "high" => Severity::High,
        "medium" => Severity::Medium,
        _ => Severity::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parsing() {
        assert!(matches!(severity_from_str("critical"), Severity::Critical));
        assert!(matches!(severity_from_str("medium"), Severity::Medium));
        assert!(matches!(severity_from_str("unknown"), Severity::Low));
    }
}
