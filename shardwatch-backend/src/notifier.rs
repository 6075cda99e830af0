//! Outbound notices, routed by audience to every configured recipient.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use poise::serenity_prelude::{ChannelId, Http};
use serde::Serialize;
use shardwatch_db::Tier;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

const PUSHOVER_URL: &str = "https://api.pushover.net/1/messages.json";

/// Who a notice is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Audience {
    /// Operators of this monitor.
    Admin,
    /// Players of one notified tier.
    Players(Tier),
}

impl Audience {
    pub const ALL: [Audience; 6] = [
        Audience::Admin,
        Audience::Players(Tier::InternalTest),
        Audience::Players(Tier::Alpha),
        Audience::Players(Tier::Beta1),
        Audience::Players(Tier::Beta2),
        Audience::Players(Tier::Beta3),
    ];

    /// Name used in configuration keys, e.g. `NOTIFY_BETA1_WEBHOOK`.
    pub fn env_key(self) -> &'static str {
        match self {
            Audience::Admin => "ADMIN",
            Audience::Players(Tier::InternalTest) => "IT",
            Audience::Players(Tier::Alpha) => "ALPHA",
            Audience::Players(Tier::Beta1) => "BETA1",
            Audience::Players(Tier::Beta2) => "BETA2",
            Audience::Players(Tier::Beta3) => "BETA3",
            Audience::Players(_) => "UNROUTED",
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Audience::Admin => f.write_str("admin"),
            Audience::Players(tier) => write!(f, "{tier}"),
        }
    }
}

/// Delivery sink for notices. Delivery is best effort; failures are only logged.
pub trait Notifier: Send + Sync {
    fn notify(&self, audience: Audience, message: &str) -> impl Future<Output = ()> + Send;
}

/// One place a notice can be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Message posted to a Discord channel.
    Discord(ChannelId),
    /// Pushover user or group key.
    Pushover(String),
    /// JSON POST to an SMS, e-mail or voice bridge.
    Webhook(String),
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Discord(channel) => write!(f, "discord:{channel}"),
            Recipient::Pushover(user) => {
                let shown: String = user.chars().take(4).collect();
                write!(f, "pushover:{shown}…")
            }
            Recipient::Webhook(url) => {
                // bridge URLs often carry credentials in the path or query
                let host = reqwest::Url::parse(url)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_else(|| "invalid-url".to_string());
                write!(f, "webhook:{host}/…")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("http delivery failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("discord delivery failed: {0}")]
    Discord(#[from] poise::serenity_prelude::Error),

    #[error("{0} channel is not configured")]
    NotConfigured(&'static str),

    #[error("no answer within {0:?}")]
    TimedOut(Duration),
}

/// Shared clients for every channel kind.
struct Channels {
    http: reqwest::Client,
    discord: Option<Arc<Http>>,
    pushover_token: Option<String>,
    title: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    title: &'a str,
    message: &'a str,
}

impl Channels {
    async fn deliver(&self, recipient: &Recipient, message: &str) -> Result<(), DeliveryError> {
        tokio::time::timeout(self.timeout, self.send(recipient, message))
            .await
            .map_err(|_| DeliveryError::TimedOut(self.timeout))?
    }

    async fn send(&self, recipient: &Recipient, message: &str) -> Result<(), DeliveryError> {
        match recipient {
            Recipient::Discord(channel) => {
                let http = self
                    .discord
                    .as_ref()
                    .ok_or(DeliveryError::NotConfigured("discord"))?;
                channel.say(http, message).await?;
            }
            Recipient::Pushover(user) => {
                let token = self
                    .pushover_token
                    .as_deref()
                    .ok_or(DeliveryError::NotConfigured("pushover"))?;
                self.http
                    .post(PUSHOVER_URL)
                    .form(&[
                        ("token", token),
                        ("user", user.as_str()),
                        ("title", self.title.as_str()),
                        ("message", message),
                    ])
                    .send()
                    .await?
                    .error_for_status()?;
            }
            Recipient::Webhook(url) => {
                self.http
                    .post(url)
                    .json(&WebhookPayload {
                        title: &self.title,
                        message,
                    })
                    .send()
                    .await?
                    .error_for_status()?;
            }
        }
        Ok(())
    }
}

/// Notifier that fans each notice out to the recipients routed to its audience.
///
/// Every delivery is bounded by the dispatcher's timeout, whatever the channel.
pub struct Dispatcher {
    routes: HashMap<Audience, Vec<Recipient>>,
    channels: Arc<Channels>,
}

impl Dispatcher {
    pub fn new(
        routes: HashMap<Audience, Vec<Recipient>>,
        http: reqwest::Client,
        discord: Option<Arc<Http>>,
        pushover_token: Option<String>,
        title: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            routes,
            channels: Arc::new(Channels {
                http,
                discord,
                pushover_token,
                title: title.into(),
                timeout,
            }),
        }
    }

    pub fn recipients(&self, audience: Audience) -> &[Recipient] {
        self.routes.get(&audience).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Notifier for Dispatcher {
    async fn notify(&self, audience: Audience, message: &str) {
        let recipients = self.recipients(audience);
        if recipients.is_empty() {
            debug!(%audience, message, "no recipients for notice");
            return;
        }

        // each recipient gets its own task so one slow or failing channel holds up nobody
        let mut deliveries = JoinSet::new();
        for recipient in recipients {
            let channels = Arc::clone(&self.channels);
            let recipient = recipient.clone();
            let message = message.to_string();
            deliveries.spawn(async move {
                let result = channels.deliver(&recipient, &message).await;
                (recipient, result)
            });
        }

        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((recipient, Ok(()))) => debug!(%audience, %recipient, "notice delivered"),
                Ok((recipient, Err(err))) => {
                    warn!(%audience, %recipient, %err, "notice delivery failed")
                }
                Err(err) => error!(%audience, %err, "notice delivery task failed"),
            }
        }
    }
}
