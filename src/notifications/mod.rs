//! Withdrawal notifications delivered through the Telegram Bot API.
//!
//! Each request results in at most one `sendMessage` call. Failures are
//! reported to the caller and never retried.

use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::config::TelegramConfig;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Telegram notifications are not configured")]
    Unconfigured,

    #[error("Failed to deliver notification: {0}")]
    DeliveryFailed(String),
}

/// A withdrawal the user asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalPayload {
    pub amount: String,
    pub address: String,
}

impl WithdrawalPayload {
    pub fn new(amount: &str, address: &str) -> Result<Self, NotifyError> {
        if amount.is_empty() {
            return Err(NotifyError::MissingField("amount"));
        }
        if address.is_empty() {
            return Err(NotifyError::MissingField("address"));
        }
        Ok(Self {
            amount: amount.to_string(),
            address: address.to_string(),
        })
    }

    /// Plain-text message body. Values are included literally.
    pub fn message(&self) -> String {
        format!(
            "New withdrawal request\n\nAmount: {}\nAddress: {}",
            self.amount, self.address
        )
    }
}

/// Forwards notifications to a single Telegram chat
pub struct NotificationService {
    config: TelegramConfig,
    http_client: reqwest::Client,
}

impl NotificationService {
    pub fn new(config: TelegramConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self {
            config,
            http_client,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        let token = self.config.bot_token.as_deref().filter(|t| !t.is_empty())?;
        let chat_id = self.config.chat_id.as_deref().filter(|c| !c.is_empty())?;
        Some((token, chat_id))
    }

    /// Validate, format and send a withdrawal notification.
    pub async fn notify_withdrawal(&self, amount: &str, address: &str) -> Result<(), NotifyError> {
        let payload = WithdrawalPayload::new(amount, address)?;
        self.send(&payload).await
    }

    pub async fn send(&self, payload: &WithdrawalPayload) -> Result<(), NotifyError> {
        let Some((token, chat_id)) = self.credentials() else {
            tracing::error!("Withdrawal notification requested but Telegram is not configured");
            return Err(NotifyError::Unconfigured);
        };

        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            token
        );
        let body = json!({
            "chat_id": chat_id,
            "text": payload.message(),
        });

        self.http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| {
                // reqwest errors embed the URL, which contains the bot token
                let reason = e.without_url().to_string();
                tracing::error!(error = %reason, "Failed to send Telegram notification");
                NotifyError::DeliveryFailed(reason)
            })?;

        tracing::info!(amount = %payload.amount, "Withdrawal notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured {
        calls: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    }

    /// Start a throwaway server standing in for the Bot API.
    async fn fake_telegram(status: StatusCode) -> (String, Captured) {
        let captured = Captured::default();
        let app = Router::new()
            .route(
                "/:bot/sendMessage",
                post(
                    move |State(c): State<Captured>,
                          axum::extract::Path(bot): axum::extract::Path<String>,
                          Json(body): Json<serde_json::Value>| async move {
                        c.calls.lock().unwrap().push((bot, body));
                        (status, Json(json!({"ok": status.is_success()})))
                    },
                ),
            )
            .with_state(captured.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), captured)
    }

    fn config(api_base: &str, token: Option<&str>, chat_id: Option<&str>) -> TelegramConfig {
        TelegramConfig {
            bot_token: token.map(String::from),
            chat_id: chat_id.map(String::from),
            api_base: api_base.to_string(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_message_includes_values_verbatim() {
        let payload = WithdrawalPayload::new("100", "<b>abc</b> & co").unwrap();
        let message = payload.message();
        assert!(message.contains("Amount: 100"));
        assert!(message.contains("Address: <b>abc</b> & co"));
    }

    #[test]
    fn test_missing_fields() {
        assert!(matches!(
            WithdrawalPayload::new("", "abc"),
            Err(NotifyError::MissingField("amount"))
        ));
        assert!(matches!(
            WithdrawalPayload::new("100", ""),
            Err(NotifyError::MissingField("address"))
        ));
    }

    #[tokio::test]
    async fn test_sends_exactly_one_call() {
        let (base, captured) = fake_telegram(StatusCode::OK).await;
        let service = NotificationService::new(config(&base, Some("123:abc"), Some("-42")));

        service.notify_withdrawal("100", "abc").await.unwrap();

        let calls = captured.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (bot, body) = &calls[0];
        assert_eq!(bot, "bot123:abc");
        assert_eq!(body["chat_id"], "-42");
        let text = body["text"].as_str().unwrap();
        assert!(text.contains("100"));
        assert!(text.contains("abc"));
    }

    #[tokio::test]
    async fn test_unconfigured_makes_no_call() {
        let (base, captured) = fake_telegram(StatusCode::OK).await;

        for service in [
            NotificationService::new(config(&base, None, Some("-42"))),
            NotificationService::new(config(&base, Some("123:abc"), None)),
            NotificationService::new(config(&base, Some(""), Some(""))),
        ] {
            assert!(!service.is_configured());
            assert!(matches!(
                service.notify_withdrawal("100", "abc").await,
                Err(NotifyError::Unconfigured)
            ));
        }

        assert!(captured.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_field_checked_before_config() {
        let service = NotificationService::new(config("http://127.0.0.1:9", None, None));
        assert!(matches!(
            service.notify_withdrawal("", "abc").await,
            Err(NotifyError::MissingField("amount"))
        ));
    }

    #[tokio::test]
    async fn test_error_status_is_delivery_failure() {
        let (base, captured) = fake_telegram(StatusCode::BAD_REQUEST).await;
        let service = NotificationService::new(config(&base, Some("123:abc"), Some("-42")));

        let err = service.notify_withdrawal("100", "abc").await.unwrap_err();
        assert!(matches!(err, NotifyError::DeliveryFailed(_)));
        assert!(!err.to_string().contains("123:abc"));
        assert_eq!(captured.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_delivery_failure() {
        // Bind then drop to get a port with nothing listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let service = NotificationService::new(config(
            &format!("http://{}", addr),
            Some("123:abc"),
            Some("-42"),
        ));

        assert!(matches!(
            service.notify_withdrawal("100", "abc").await,
            Err(NotifyError::DeliveryFailed(_))
        ));
    }
}
