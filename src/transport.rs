//! Outbound SMS delivery

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SmsConfig;
use crate::error::{FunnelError, Result};

/// What the provider told us about an accepted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Provider-side message id
    pub provider_id: String,
}

/// Hands a reply to the SMS network
#[async_trait]
pub trait SmsTransport: Send + Sync {
    /// Send `body` to the E.164 number `to`
    async fn send(&self, to: &str, body: &str) -> Result<SendReceipt>;
}

/// Twilio Programmable Messaging
#[derive(Debug, Clone)]
pub struct TwilioTransport {
    client: reqwest::Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: String,
}

impl TwilioTransport {
    /// Build a transport from the `sms` configuration section
    pub fn from_config(config: &SmsConfig) -> Result<Self> {
        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| FunnelError::InvalidConfig(format!("sms.{name} is not set")))
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| FunnelError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            account_sid: required(&config.account_sid, "account_sid")?,
            auth_token: required(&config.auth_token, "auth_token")?,
            from_number: required(&config.from_number, "from_number")?,
        })
    }
}

#[async_trait]
impl SmsTransport for TwilioTransport {
    async fn send(&self, to: &str, body: &str) -> Result<SendReceipt> {
        let url = format!("{}/Accounts/{}/Messages.json", self.base_url, self.account_sid);

        let response = self
            .client
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| FunnelError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(FunnelError::Transport(format!("Twilio returned {status}: {detail}")));
        }

        let message: TwilioMessage = response
            .json()
            .await
            .map_err(|e| FunnelError::Transport(e.to_string()))?;

        tracing::info!(to, sid = %message.sid, "SMS sent");
        Ok(SendReceipt {
            provider_id: message.sid,
        })
    }
}

/// Dry-run transport: logs instead of sending
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

#[async_trait]
impl SmsTransport for LogTransport {
    async fn send(&self, to: &str, body: &str) -> Result<SendReceipt> {
        tracing::info!(to, body, "SMS (dry run)");
        Ok(SendReceipt {
            provider_id: format!("dry-run-{}", uuid::Uuid::new_v4()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twilio_requires_credentials() {
        let config = crate::config::AppConfig::default().sms;
        assert!(matches!(
            TwilioTransport::from_config(&config),
            Err(FunnelError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_log_transport_always_accepts() {
        let receipt = LogTransport.send("+15551234567", "hello").await.unwrap();
        assert!(receipt.provider_id.starts_with("dry-run-"));
    }
}
