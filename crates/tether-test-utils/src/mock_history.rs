// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock history source serving canned pages.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use tether_core::{
    AdapterType, ConversationId, HealthStatus, HistoryPage, HistorySource, InboundMessage,
    MessageId, PluginAdapter, TetherError,
};

/// Serves pages keyed by cursor (`None` for the first page) and records requests.
#[derive(Debug, Default)]
pub struct MockHistory {
    pages: HashMap<Option<String>, HistoryPage>,
    requests: Mutex<Vec<(ConversationId, Option<String>, usize)>>,
}

impl MockHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `messages` for `cursor`, pointing at `next_cursor`.
    pub fn with_page(
        mut self,
        cursor: Option<&str>,
        messages: Vec<InboundMessage>,
        next_cursor: Option<&str>,
    ) -> Self {
        self.pages.insert(
            cursor.map(str::to_string),
            HistoryPage {
                messages,
                next_cursor: next_cursor.map(str::to_string),
            },
        );
        self
    }

    /// Every `fetch_page` call so far.
    pub async fn requests(&self) -> Vec<(ConversationId, Option<String>, usize)> {
        self.requests.lock().await.clone()
    }

    /// A history message with the given id and timestamp.
    pub fn message(id: &str, content: &str, created_at: DateTime<Utc>) -> InboundMessage {
        InboundMessage {
            id: MessageId::from(id),
            role: "assistant".to_string(),
            content: content.to_string(),
            created_at,
        }
    }
}

#[async_trait]
impl PluginAdapter for MockHistory {
    fn name(&self) -> &str {
        "mock-history"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::History
    }

    async fn health_check(&self) -> Result<HealthStatus, TetherError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TetherError> {
        Ok(())
    }
}

#[async_trait]
impl HistorySource for MockHistory {
    async fn fetch_page(
        &self,
        conversation: &ConversationId,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<HistoryPage, TetherError> {
        self.requests
            .lock()
            .await
            .push((conversation.clone(), cursor.map(str::to_string), limit));
        self.pages
            .get(&cursor.map(str::to_string))
            .cloned()
            .ok_or_else(|| TetherError::connection(format!("no page for cursor {cursor:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_pages_by_cursor() {
        let history = MockHistory::new()
            .with_page(None, vec![MockHistory::message("m2", "b", Utc::now())], Some("c1"))
            .with_page(Some("c1"), vec![MockHistory::message("m1", "a", Utc::now())], None);
        let conv = ConversationId("conv-1".into());

        let first = history.fetch_page(&conv, None, 10).await.unwrap();
        assert_eq!(first.next_cursor.as_deref(), Some("c1"));
        let second = history.fetch_page(&conv, Some("c1"), 10).await.unwrap();
        assert!(second.next_cursor.is_none());
        assert!(history.fetch_page(&conv, Some("nope"), 10).await.is_err());
        assert_eq!(history.requests().await.len(), 3);
    }
}
