//! Webhook notifications
//!
//! Notifications are delivered as an HTTP GET with every field in the query
//! string. Delivery is fire-and-forget: [`spawn_notification`] detaches the
//! request and only logs its outcome.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::units::sun_to_trx_string;

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook returned status {0}")]
    Status(u16),

    #[error("Delivery channel closed")]
    Closed,
}

/// Event sent to a lease's notify URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    DepositDetected {
        address: String,
        amount_sun: u64,
        extra: Option<String>,
    },
    CollectionSuccess {
        txid: String,
        amount_sun: u64,
        from: String,
        to: String,
        extra: Option<String>,
    },
}

impl Notification {
    pub fn msg(&self) -> &'static str {
        match self {
            Notification::DepositDetected { .. } => "DEPOSIT_DETECTED",
            Notification::CollectionSuccess { .. } => "SUCCESS",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::DepositDetected { .. } => "DEPOSIT",
            Notification::CollectionSuccess { .. } => "COLLECTION",
        }
    }

    pub fn amount_sun(&self) -> u64 {
        match self {
            Notification::DepositDetected { amount_sun, .. }
            | Notification::CollectionSuccess { amount_sun, .. } => *amount_sun,
        }
    }

    /// Query string fields, amounts rendered in TRX
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("code", "0".to_string()),
            ("msg", self.msg().to_string()),
            ("type", self.kind().to_string()),
        ];

        match self {
            Notification::DepositDetected {
                address,
                amount_sun,
                extra,
            } => {
                pairs.push(("amount", sun_to_trx_string(*amount_sun)));
                pairs.push(("address", address.clone()));
                pairs.push(("extra", extra.clone().unwrap_or_default()));
            }
            Notification::CollectionSuccess {
                txid,
                amount_sun,
                from,
                to,
                extra,
            } => {
                pairs.push(("txid", txid.clone()));
                pairs.push(("amount", sun_to_trx_string(*amount_sun)));
                pairs.push(("from", from.clone()));
                pairs.push(("to", to.clone()));
                pairs.push(("extra", extra.clone().unwrap_or_default()));
            }
        }

        pairs
    }
}

/// Delivers notifications to a webhook URL
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, url: &str, notification: &Notification) -> Result<(), NotifyError>;
}

/// reqwest-backed notifier
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: Client,
}

impl HttpNotifier {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }

    /// Build the GET request for a notification without sending it
    pub fn build_request(
        &self,
        url: &str,
        notification: &Notification,
    ) -> Result<reqwest::Request, NotifyError> {
        Ok(self
            .client
            .get(url)
            .query(&notification.query_pairs())
            .build()?)
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn deliver(&self, url: &str, notification: &Notification) -> Result<(), NotifyError> {
        let request = self.build_request(url, notification)?;
        debug!(url = %request.url(), "Sending webhook");

        let resp = self.client.execute(request).await?;
        if !resp.status().is_success() {
            return Err(NotifyError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

/// Notifier that forwards every delivery into a channel
///
/// Used where deliveries should be observed instead of sent.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<(String, Notification)>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, Notification)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn deliver(&self, url: &str, notification: &Notification) -> Result<(), NotifyError> {
        self.tx
            .send((url.to_string(), notification.clone()))
            .map_err(|_| NotifyError::Closed)
    }
}

/// Deliver in a detached task. A missing or empty URL sends nothing.
pub fn spawn_notification(
    notifier: Arc<dyn Notifier>,
    url: Option<String>,
    notification: Notification,
) {
    let url = match url {
        Some(url) if !url.is_empty() => url,
        _ => return,
    };

    tokio::spawn(async move {
        if let Err(e) = notifier.deliver(&url, &notification).await {
            warn!(
                url = %url,
                msg = notification.msg(),
                error = %e,
                "Webhook delivery failed"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposit() -> Notification {
        Notification::DepositDetected {
            address: "TDeposit".to_string(),
            amount_sun: 1_000,
            extra: Some("order-42".to_string()),
        }
    }

    #[test]
    fn test_deposit_query_pairs() {
        let pairs = deposit().query_pairs();
        assert_eq!(
            pairs,
            vec![
                ("code", "0".to_string()),
                ("msg", "DEPOSIT_DETECTED".to_string()),
                ("type", "DEPOSIT".to_string()),
                ("amount", "0.001".to_string()),
                ("address", "TDeposit".to_string()),
                ("extra", "order-42".to_string()),
            ]
        );
    }

    #[test]
    fn test_collection_request_url() {
        let notification = Notification::CollectionSuccess {
            txid: "abc123".to_string(),
            amount_sun: 990,
            from: "TFrom".to_string(),
            to: "TTo".to_string(),
            extra: None,
        };
        let notifier = HttpNotifier::new(Duration::from_secs(10));
        let request = notifier
            .build_request("https://merchant.example/hook", &notification)
            .unwrap();

        assert_eq!(request.method(), reqwest::Method::GET);
        assert_eq!(
            request.url().as_str(),
            "https://merchant.example/hook?code=0&msg=SUCCESS&type=COLLECTION&txid=abc123&amount=0.00099&from=TFrom&to=TTo&extra="
        );
    }

    #[tokio::test]
    async fn test_spawn_skips_missing_url() {
        let (notifier, mut rx) = ChannelNotifier::new();
        let notifier: Arc<dyn Notifier> = Arc::new(notifier);

        spawn_notification(notifier.clone(), None, deposit());
        spawn_notification(notifier.clone(), Some(String::new()), deposit());
        spawn_notification(notifier, Some("https://hook".to_string()), deposit());

        let (url, notification) = rx.recv().await.unwrap();
        assert_eq!(url, "https://hook");
        assert_eq!(notification, deposit());
        assert!(rx.try_recv().is_err());
    }
}
