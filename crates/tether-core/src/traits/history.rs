// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! History adapter trait for paginated conversation fetches.

use async_trait::async_trait;

use crate::error::TetherError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ConversationId, HistoryPage};

/// Source of historical messages, fetched one page at a time.
///
/// Pages may come back in chronological or reverse-chronological order; the
/// reconciler re-sorts regardless.
#[async_trait]
pub trait HistorySource: PluginAdapter {
    /// Fetches the page starting at `cursor` (`None` for the first page).
    async fn fetch_page(
        &self,
        conversation: &ConversationId,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<HistoryPage, TetherError>;
}
