// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pure merge of live and historical messages.

use std::collections::HashMap;

use serde::Serialize;

use tether_core::{HistoryPage, InboundMessage, MessageId};

/// Ordered, duplicate-free view of a conversation.
///
/// Sorted by `(created_at, id)`; every id appears once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MergedTimeline {
    messages: Vec<InboundMessage>,
}

impl MergedTimeline {
    pub fn messages(&self) -> &[InboundMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<InboundMessage> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &MessageId) -> Option<&InboundMessage> {
        self.messages.iter().find(|m| &m.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InboundMessage> {
        self.messages.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    History,
    Live,
}

/// Merges `live` with the flattened `pages`.
///
/// One copy per id survives: the one with the later `created_at`; on equal
/// timestamps the live copy; within one source the copy observed last.
/// Pure and idempotent: merging a merged timeline again changes nothing.
pub fn merge(live: &[InboundMessage], pages: &[HistoryPage]) -> MergedTimeline {
    let history = pages.iter().flat_map(|page| page.messages.iter());
    let candidates = history
        .map(|m| (m, Origin::History))
        .chain(live.iter().map(|m| (m, Origin::Live)));

    let mut chosen: HashMap<&MessageId, (&InboundMessage, Origin)> = HashMap::new();
    for (message, origin) in candidates {
        let keep_current = chosen
            .get(&message.id)
            .is_some_and(|(current, current_origin)| {
                !supersedes(message, origin, current, *current_origin)
            });
        if !keep_current {
            chosen.insert(&message.id, (message, origin));
        }
    }

    let mut messages: Vec<InboundMessage> = chosen.into_values().map(|(m, _)| m.clone()).collect();
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    MergedTimeline { messages }
}

fn supersedes(
    candidate: &InboundMessage,
    candidate_origin: Origin,
    current: &InboundMessage,
    current_origin: Origin,
) -> bool {
    if candidate.created_at != current.created_at {
        return candidate.created_at > current.created_at;
    }
    candidate_origin == current_origin || candidate_origin == Origin::Live
}
