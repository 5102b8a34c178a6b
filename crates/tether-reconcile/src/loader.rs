// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cursor-based paging over a [`HistorySource`].

use std::sync::Arc;

use tracing::{debug, warn};

use tether_config::HistoryConfig;
use tether_core::{ConversationId, HistoryPage, HistorySource, TetherError};

/// Fetches history pages until the source runs out or `max_pages` is reached.
#[derive(Clone)]
pub struct HistoryLoader {
    source: Arc<dyn HistorySource>,
    page_size: usize,
    max_pages: usize,
}

impl HistoryLoader {
    pub fn new(source: Arc<dyn HistorySource>, page_size: usize, max_pages: usize) -> Self {
        Self {
            source,
            page_size,
            max_pages,
        }
    }

    /// Builds a loader with the `[history]` paging limits.
    pub fn from_config(source: Arc<dyn HistorySource>, config: &HistoryConfig) -> Self {
        Self::new(source, config.page_size, config.max_pages)
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Loads a conversation's history, oldest page request first.
    ///
    /// Stops early if the source hands back a cursor it already returned.
    pub async fn load(&self, conversation: &ConversationId) -> Result<Vec<HistoryPage>, TetherError> {
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors = Vec::new();

        while pages.len() < self.max_pages {
            let page = self
                .source
                .fetch_page(conversation, cursor.as_deref(), self.page_size)
                .await?;
            debug!(
                conversation = %conversation,
                page = pages.len() + 1,
                messages = page.messages.len(),
                "history page fetched"
            );
            let next = page.next_cursor.clone();
            pages.push(page);

            match next {
                None => break,
                Some(next) if seen_cursors.contains(&next) => {
                    warn!(conversation = %conversation, cursor = %next, "history cursor repeated; stopping");
                    break;
                }
                Some(next) => {
                    seen_cursors.push(next.clone());
                    cursor = Some(next);
                }
            }
        }

        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use tether_core::{AdapterType, HealthStatus, InboundMessage, MessageId, PluginAdapter};

    /// Serves canned pages keyed by cursor and records the requests.
    struct CannedHistory {
        pages: Vec<(Option<&'static str>, HistoryPage)>,
        requests: Mutex<Vec<(Option<String>, usize)>>,
    }

    impl CannedHistory {
        fn new(pages: Vec<(Option<&'static str>, HistoryPage)>) -> Self {
            Self {
                pages,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PluginAdapter for CannedHistory {
        fn name(&self) -> &str {
            "canned"
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
    impl HistorySource for CannedHistory {
        async fn fetch_page(
            &self,
            _conversation: &ConversationId,
            cursor: Option<&str>,
            limit: usize,
        ) -> Result<HistoryPage, TetherError> {
            self.requests
                .lock()
                .unwrap()
                .push((cursor.map(str::to_string), limit));
            self.pages
                .iter()
                .find(|(c, _)| *c == cursor)
                .map(|(_, page)| page.clone())
                .ok_or_else(|| TetherError::connection("no such page"))
        }
    }

    fn page(id: &str, next: Option<&str>) -> HistoryPage {
        HistoryPage {
            messages: vec![InboundMessage {
                id: MessageId::from(id),
                role: "user".into(),
                content: String::new(),
                created_at: Utc::now(),
            }],
            next_cursor: next.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn follows_cursors_until_exhausted() {
        let source = Arc::new(CannedHistory::new(vec![
            (None, page("m3", Some("c1"))),
            (Some("c1"), page("m2", Some("c2"))),
            (Some("c2"), page("m1", None)),
        ]));
        let loader = HistoryLoader::new(source.clone(), 10, 20);
        let pages = loader.load(&ConversationId("conv".into())).await.unwrap();

        assert_eq!(pages.len(), 3);
        let requests = source.requests.lock().unwrap().clone();
        assert_eq!(
            requests,
            vec![(None, 10), (Some("c1".into()), 10), (Some("c2".into()), 10)]
        );
    }

    #[tokio::test]
    async fn stops_at_max_pages() {
        let source = Arc::new(CannedHistory::new(vec![
            (None, page("m3", Some("c1"))),
            (Some("c1"), page("m2", Some("c2"))),
            (Some("c2"), page("m1", None)),
        ]));
        let loader = HistoryLoader::new(source, 10, 2);
        let pages = loader.load(&ConversationId("conv".into())).await.unwrap();
        assert_eq!(pages.len(), 2);
    }

    #[tokio::test]
    async fn repeated_cursor_stops_paging() {
        let source = Arc::new(CannedHistory::new(vec![
            (None, page("m2", Some("c1"))),
            (Some("c1"), page("m1", Some("c1"))),
        ]));
        let loader = HistoryLoader::new(source, 5, 20);
        let pages = loader.load(&ConversationId("conv".into())).await.unwrap();
        assert_eq!(pages.len(), 2);
    }

    #[tokio::test]
    async fn propagates_source_errors() {
        let source = Arc::new(CannedHistory::new(vec![(None, page("m1", Some("missing")))]));
        let loader = HistoryLoader::new(source, 5, 20);
        let err = loader.load(&ConversationId("conv".into())).await.unwrap_err();
        assert!(matches!(err, TetherError::Connection { .. }));
    }
}
