// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Timeline holder: both sources plus their merged view.

use tether_core::{HistoryPage, InboundMessage};

use crate::merge::{MergedTimeline, merge};

/// Keeps the live buffer and fetched history pages of one session and
/// rebuilds the merged view in full whenever either changes.
#[derive(Debug, Default)]
pub struct Timeline {
    live: Vec<InboundMessage>,
    pages: Vec<HistoryPage>,
    merged: MergedTimeline,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message from the live stream.
    pub fn push_live(&mut self, message: InboundMessage) -> &MergedTimeline {
        self.live.push(message);
        self.rebuild()
    }

    /// Appends one fetched history page.
    pub fn add_page(&mut self, page: HistoryPage) -> &MergedTimeline {
        self.pages.push(page);
        self.rebuild()
    }

    /// Replaces all history, e.g. after reloading a conversation.
    pub fn replace_history(&mut self, pages: Vec<HistoryPage>) -> &MergedTimeline {
        self.pages = pages;
        self.rebuild()
    }

    pub fn merged(&self) -> &MergedTimeline {
        &self.merged
    }

    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn clear(&mut self) {
        self.live.clear();
        self.pages.clear();
        self.merged = MergedTimeline::default();
    }

    fn rebuild(&mut self) -> &MergedTimeline {
        self.merged = merge(&self.live, &self.pages);
        &self.merged
    }
}
