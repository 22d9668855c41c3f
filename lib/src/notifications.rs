//! Transient user notifications with explorer links.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy_primitives::B256;
use tracing::info;

/// Notifications become eligible for removal this long after creation.
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(12);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub id: String,
    pub message: String,
    pub href: Option<String>,
    pub link_text: Option<String>,
    /// Creation time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl Notification {
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp_ms) >= NOTIFICATION_TTL.as_millis() as u64
    }
}

#[derive(Clone, Debug, Default)]
pub struct NotificationCenter {
    items: Vec<Notification>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: impl Into<String>, message: impl Into<String>, link: Option<(String, String)>) {
        self.push_at(id, message, link, now_millis());
    }

    /// `link` is `(href, link_text)`.
    pub fn push_at(
        &mut self,
        id: impl Into<String>,
        message: impl Into<String>,
        link: Option<(String, String)>,
        timestamp_ms: u64,
    ) {
        let (href, link_text) = match link {
            Some((href, text)) => (Some(href), Some(text)),
            None => (None, None),
        };
        let notification = Notification {
            id: id.into(),
            message: message.into(),
            href,
            link_text,
            timestamp_ms,
        };
        info!(id = %notification.id, "{}", notification.message);
        self.items.push(notification);
    }

    /// Explicit dismissal. Returns whether anything was removed.
    pub fn dismiss(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|n| n.id != id);
        before != self.items.len()
    }

    pub fn all(&self) -> &[Notification] {
        &self.items
    }

    pub fn active_at(&self, now_ms: u64) -> Vec<&Notification> {
        self.items.iter().filter(|n| !n.is_expired_at(now_ms)).collect()
    }

    pub fn active(&self) -> Vec<&Notification> {
        self.active_at(now_millis())
    }

    /// Drop expired notifications.
    pub fn prune_at(&mut self, now_ms: u64) {
        self.items.retain(|n| !n.is_expired_at(now_ms));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|n| n.id == id)
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

pub fn explorer_tx_url(explorer: &str, tx_hash: B256) -> String {
    format!("{}/tx/{tx_hash}", explorer.trim_end_matches('/'))
}

pub fn explorer_token_url(explorer: &str, contract: impl std::fmt::Display, token_id: impl std::fmt::Display) -> String {
    format!("{}/token/{contract}?a={token_id}", explorer.trim_end_matches('/'))
}

/// `0x1234...abcd` style shortening for link text.
pub fn abbreviate(hex: &str) -> String {
    if hex.len() <= 12 {
        return hex.to_string();
    }
    format!("{}...{}", &hex[..6], &hex[hex.len() - 4..])
}
