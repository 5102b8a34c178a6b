// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tether history` command implementation.
//!
//! Fetches every page of a conversation through the configured history
//! endpoint and prints the reconciled timeline.

use std::sync::Arc;

use clap::Args;
use tracing::info;

use tether_config::TetherConfig;
use tether_core::{ConversationId, TetherError};
use tether_reconcile::{HistoryLoader, MergedTimeline, merge};
use tether_ws::HttpHistory;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Conversation to fetch.
    pub conversation: String,

    /// Override `history.base_url`.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Print the timeline as JSON.
    #[arg(long)]
    pub json: bool,
}

pub async fn run_history(config: &TetherConfig, args: HistoryArgs) -> Result<(), TetherError> {
    let mut config = config.clone();
    if let Some(base_url) = args.base_url {
        config.history.base_url = Some(base_url);
    }
    let source = HttpHistory::from_config(&config)?
        .ok_or_else(|| TetherError::Config("history.base_url is not set".to_string()))?;

    let conversation = ConversationId(args.conversation);
    let loader = HistoryLoader::from_config(Arc::new(source), &config.history);
    let pages = loader.load(&conversation).await?;
    let timeline = merge(&[], &pages);
    info!(
        conversation = %conversation,
        pages = pages.len(),
        messages = timeline.len(),
        "history loaded"
    );

    if args.json {
        let json = serde_json::to_string_pretty(&timeline)
            .map_err(|e| TetherError::Internal(format!("failed to serialise timeline: {e}")))?;
        println!("{json}");
    } else {
        print!("{}", format_timeline(&timeline));
    }
    Ok(())
}

/// One line per message: timestamp, role and content.
pub fn format_timeline(timeline: &MergedTimeline) -> String {
    timeline
        .iter()
        .map(|m| {
            format!(
                "{} {:>9}: {}\n",
                m.created_at.format("%Y-%m-%d %H:%M:%S"),
                m.role,
                m.content
            )
        })
        .collect()
}
