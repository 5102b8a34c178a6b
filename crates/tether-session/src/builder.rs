// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session construction.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use tether_config::{HistoryConfig, TetherConfig};
use tether_core::{ConnectionState, HistorySource, SessionId, Transport};
use tether_reconcile::HistoryLoader;

use crate::actor::SessionActor;
use crate::handle::SessionHandle;
use crate::settings::SessionSettings;

/// Mailbox capacity of a session actor.
const COMMAND_BUFFER: usize = 64;

/// Builder for a [`SessionActor`] and its [`SessionHandle`].
pub struct SessionBuilder {
    transport: Arc<dyn Transport>,
    settings: SessionSettings,
    history: Option<Arc<dyn HistorySource>>,
    history_limits: HistoryConfig,
    session_id: Option<SessionId>,
}

impl SessionBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            settings: SessionSettings::default(),
            history: None,
            history_limits: HistoryConfig::default(),
            session_id: None,
        }
    }

    /// Takes session settings and history paging limits from `config`.
    pub fn with_config(mut self, config: &TetherConfig) -> Self {
        self.settings = SessionSettings::from_config(config);
        self.history_limits = config.history.clone();
        self
    }

    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_history(mut self, source: Arc<dyn HistorySource>) -> Self {
        self.history = Some(source);
        self
    }

    pub fn with_history_limits(mut self, page_size: usize, max_pages: usize) -> Self {
        self.history_limits.page_size = page_size;
        self.history_limits.max_pages = max_pages;
        self
    }

    pub fn with_session_id(mut self, id: SessionId) -> Self {
        self.session_id = Some(id);
        self
    }

    /// Builds the actor without starting it.
    pub fn build(self) -> (SessionHandle, SessionActor) {
        let id = self.session_id.unwrap_or_else(SessionId::generate);
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Initial);
        let loader = self
            .history
            .map(|source| HistoryLoader::from_config(source, &self.history_limits));

        let actor = SessionActor::new(
            id.clone(),
            self.settings,
            self.transport,
            commands_rx,
            state_tx,
        );
        (SessionHandle::new(id, commands_tx, state_rx, loader), actor)
    }

    /// Builds the actor and spawns it on the current tokio runtime.
    pub fn spawn(self) -> SessionHandle {
        let (handle, actor) = self.build();
        tokio::spawn(actor.run());
        handle
    }
}
