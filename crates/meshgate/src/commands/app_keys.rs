//! Application key command handlers.

use tabled::Tabled;

use meshgate_core::{AppKey, Session};

use crate::cli::{AppKeysArgs, AppKeysCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct AppKeyRow {
    #[tabled(rename = "App Index")]
    app_index: String,
    #[tabled(rename = "Net Index")]
    net_index: String,
}

impl From<&AppKey> for AppKeyRow {
    fn from(k: &AppKey) -> Self {
        Self {
            app_index: output::hex16(k.app_index),
            net_index: output::hex16(k.net_index),
        }
    }
}

pub fn print(keys: &[AppKey], global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_list(&global.output, keys, |k| AppKeyRow::from(k), |k| {
        output::hex16(k.app_index)
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn delete(session: &Session, index: u16, global: &GlobalOpts) -> Result<(), CliError> {
    let prompt = format!("Delete application key {}?", output::hex16(index));
    if !util::confirm("app-keys delete", &prompt, global.yes)? {
        return Ok(());
    }
    print(&session.delete_app_key(index).await?, global)
}

pub async fn handle(
    session: &Session,
    args: AppKeysArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        AppKeysCommand::List => print(&session.app_keys().await?, global),
        AppKeysCommand::Add {
            app_key,
            index,
            subnet,
        } => print(&session.add_app_key(app_key, index, subnet).await?, global),
        AppKeysCommand::Generate { index, subnet } => {
            print(&session.generate_app_key(index, subnet).await?, global)
        }
        AppKeysCommand::Delete { index } => delete(session, index, global).await,
    }
}
