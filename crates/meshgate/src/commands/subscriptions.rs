//! Cloud subscription handlers: which mesh addresses the gateway
//! forwards to the cloud.

use tabled::Tabled;

use meshgate_core::{Session, Subscription};

use crate::cli::{GlobalOpts, SubscriptionsArgs, SubscriptionsCommand};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct SubscriptionRow {
    #[tabled(rename = "Address")]
    address: String,
}

pub fn print(subscriptions: &[Subscription], global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_list(
        &global.output,
        subscriptions,
        |s| SubscriptionRow {
            address: output::hex16(s.address),
        },
        |s| output::hex16(s.address),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn remove(
    session: &Session,
    addresses: &[u16],
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let prompt = format!("Unsubscribe from {}?", output::hex16_list(addresses));
    if !util::confirm("subscriptions remove", &prompt, global.yes)? {
        return Ok(());
    }
    print(&session.unsubscribe(addresses).await?, global)
}

pub async fn handle(
    session: &Session,
    args: SubscriptionsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        SubscriptionsCommand::List => print(&session.subscriptions().await?, global),
        SubscriptionsCommand::Add { addresses } => {
            print(&session.subscribe(&addresses).await?, global)
        }
        SubscriptionsCommand::Remove { addresses } => remove(session, &addresses, global).await,
    }
}
