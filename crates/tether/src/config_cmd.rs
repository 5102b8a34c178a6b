// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tether config` command implementation.

use clap::Subcommand;
use tether_config::TetherConfig;
use tether_core::TetherError;

const REDACTED: &str = "[redacted]";

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML, with the auth token redacted.
    Show,
    /// Validate the configuration and exit.
    Validate,
}

pub fn run_config(config: &TetherConfig, action: ConfigAction) -> Result<(), TetherError> {
    match action {
        ConfigAction::Show => {
            print!("{}", render_config(config)?);
            Ok(())
        }
        // Loading already validated; reaching here means it passed.
        ConfigAction::Validate => {
            println!("configuration is valid");
            Ok(())
        }
    }
}

/// The effective configuration as TOML, safe to print.
fn render_config(config: &TetherConfig) -> Result<String, TetherError> {
    let mut shown = config.clone();
    if shown.connection.auth_token.is_some() {
        shown.connection.auth_token = Some(REDACTED.to_string());
    }
    toml::to_string_pretty(&shown)
        .map_err(|e| TetherError::Internal(format!("failed to render configuration: {e}")))
}
