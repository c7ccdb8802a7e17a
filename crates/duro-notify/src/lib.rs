//! Outbound alerting (spec §4.M, §6): one HTTP webhook per severity class,
//! with duplicate suppression over a 10-minute window for identical calls.

pub mod error;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use duro_core::traits::{Notifier, NotifyClass};
use serde::Serialize;
use tokio::sync::Mutex;

pub use error::NotifyError;

/// Identical `(title, text, class)` calls within this window are dropped
/// rather than delivered twice (spec §6).
const SUPPRESSION_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Webhook endpoint per severity class plus a fallback (spec §6:
/// "URL and per-class channels").
#[derive(Debug, Clone, Default)]
pub struct NotifierConfig {
    pub default_url: String,
    pub success_url: Option<String>,
    pub failure_url: Option<String>,
    pub log_url: Option<String>,
}

impl NotifierConfig {
    fn url_for(&self, class: NotifyClass) -> &str {
        let override_url = match class {
            NotifyClass::Success => self.success_url.as_deref(),
            NotifyClass::Failure => self.failure_url.as_deref(),
            NotifyClass::Log => self.log_url.as_deref(),
        };
        override_url.unwrap_or(&self.default_url)
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    title: &'a str,
    text: &'a str,
    class: &'static str,
}

fn class_label(class: NotifyClass) -> &'static str {
    match class {
        NotifyClass::Success => "success",
        NotifyClass::Failure => "failure",
        NotifyClass::Log => "log",
    }
}

pub struct WebhookNotifier {
    config: NotifierConfig,
    client: reqwest::Client,
    recent: Mutex<HashMap<(String, String, &'static str), Instant>>,
}

impl WebhookNotifier {
    pub fn new(config: NotifierConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("duro-notify/0.2.0")
            .build()
            .expect("failed to build notifier HTTP client");
        Self {
            config,
            client,
            recent: Mutex::new(HashMap::new()),
        }
    }

    async fn already_sent_recently(&self, title: &str, text: &str, class: &'static str) -> bool {
        let key = (title.to_string(), text.to_string(), class);
        let now = Instant::now();
        let mut recent = self.recent.lock().await;
        recent.retain(|_, sent_at| now.duration_since(*sent_at) < SUPPRESSION_WINDOW);

        if recent.contains_key(&key) {
            return true;
        }
        recent.insert(key, now);
        false
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    type Error = NotifyError;

    async fn notify(&self, title: &str, text: &str, class: NotifyClass) -> Result<(), Self::Error> {
        let label = class_label(class);
        if self.already_sent_recently(title, text, label).await {
            tracing::debug!(title, class = label, "notifier: suppressed duplicate");
            return Ok(());
        }

        let url = self.config.url_for(class);
        let response = self
            .client
            .post(url)
            .json(&WebhookPayload { title, text, class: label })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::NonSuccessStatus(response.status()));
        }
        Ok(())
    }
}
