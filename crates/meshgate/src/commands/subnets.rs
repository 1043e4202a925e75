//! Subnet command handlers.

use tabled::Tabled;

use meshgate_core::{Session, Subnet};

use crate::cli::{GlobalOpts, SubnetsArgs, SubnetsCommand};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct SubnetRow {
    #[tabled(rename = "Net Index")]
    index: String,
    #[tabled(rename = "Net Key")]
    key: String,
    #[tabled(rename = "Primary")]
    primary: String,
}

impl From<&Subnet> for SubnetRow {
    fn from(s: &Subnet) -> Self {
        Self {
            index: output::hex16(s.net_index),
            key: s.net_key.clone().unwrap_or_else(|| "-".into()),
            primary: if s.is_primary() { "yes".into() } else { String::new() },
        }
    }
}

pub fn print(subnets: &[Subnet], global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_list(&global.output, subnets, |s| SubnetRow::from(s), |s| {
        output::hex16(s.net_index)
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Delete after confirmation. The primary subnet is refused by the
/// session before anything is published, so it is not worth a prompt.
pub async fn delete(session: &Session, index: u16, global: &GlobalOpts) -> Result<(), CliError> {
    if index != 0 {
        let prompt = format!("Delete subnet {}?", output::hex16(index));
        if !util::confirm("subnets delete", &prompt, global.yes)? {
            return Ok(());
        }
    }
    let subnets = session.delete_subnet(index).await?;
    print(&subnets, global)
}

pub async fn handle(
    session: &Session,
    args: SubnetsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        SubnetsCommand::List => print(&session.subnets().await?, global),
        SubnetsCommand::Add { net_key, index } => {
            print(&session.add_subnet(net_key, index).await?, global)
        }
        SubnetsCommand::Generate { index } => {
            print(&session.generate_subnet(index).await?, global)
        }
        SubnetsCommand::Delete { index } => delete(session, index, global).await,
    }
}
