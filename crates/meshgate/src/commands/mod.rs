//! Command dispatch: bridges CLI args -> session calls -> output formatting.

pub mod app_keys;
pub mod beacons;
pub mod config_cmd;
pub mod gateways;
pub mod health;
pub mod model;
pub mod network;
pub mod nodes;
pub mod shell;
pub mod subnets;
pub mod subscriptions;
pub mod util;

use meshgate_core::Session;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a gateway-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Beacons => beacons::handle(session, global).await,
        Command::Subnets(args) => subnets::handle(session, args, global).await,
        Command::AppKeys(args) => app_keys::handle(session, args, global).await,
        Command::Nodes(args) => nodes::handle(session, args, global).await,
        Command::Subscriptions(args) => subscriptions::handle(session, args, global).await,
        Command::Health(args) => health::handle(session, args, global).await,
        Command::Model(args) => model::handle(session, args, global).await,
        Command::Network(args) => network::handle(session, args, global).await,
        Command::Shell => shell::run(session, global).await,
        // Handled before a session is opened
        Command::Gateways | Command::Config(_) | Command::Completions(_) => {
            Err(CliError::Internal("command does not use a gateway session".into()))
        }
    }
}
