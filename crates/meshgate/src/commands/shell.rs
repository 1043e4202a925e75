//! Interactive menu over one session.
//!
//! Every list the operator picks from is fetched fresh from the gateway
//! through the session's `select_*` calls; the menu itself only prompts
//! and forwards to the same handlers the subcommands use.

use std::io::IsTerminal;

use dialoguer::{Input, Select};

use meshgate_core::{Choice, Chooser, NodeConfiguration, Session};

use crate::cli::{self, GlobalOpts, HealthTarget, MessageKeys, Toggle};
use crate::error::CliError;

use super::{app_keys, beacons, health, model, network, nodes, subnets, subscriptions, util};

// ── Chooser ─────────────────────────────────────────────────────────

/// Arrow-key selection with trailing "Back" and "Exit" entries.
/// Esc also goes back.
pub struct DialoguerChooser;

impl Chooser for DialoguerChooser {
    fn choose(&self, prompt: &str, options: &[String]) -> Choice {
        let mut items: Vec<&str> = options.iter().map(String::as_str).collect();
        items.extend(["Back", "Exit"]);

        let picked = Select::new()
            .with_prompt(prompt)
            .items(&items)
            .default(0)
            .interact_opt();
        match picked {
            Ok(Some(i)) if i < options.len() => Choice::Selected(i),
            Ok(Some(i)) if i == options.len() => Choice::Back,
            Ok(None) => Choice::Back,
            Ok(Some(_)) => Choice::Exit,
            Err(e) => {
                tracing::warn!(error = %e, "prompt failed, ending session");
                Choice::Exit
            }
        }
    }
}

// ── Prompts ─────────────────────────────────────────────────────────

/// One of `items`, `None` for back. Exit ends the shell.
fn pick(prompt: &str, items: &[&str]) -> Result<Option<usize>, CliError> {
    let options: Vec<String> = items.iter().map(|s| (*s).to_owned()).collect();
    match DialoguerChooser.choose(prompt, &options) {
        Choice::Selected(i) => Ok(Some(i)),
        Choice::Back => Ok(None),
        Choice::Exit => Err(CliError::Cancelled),
    }
}

fn prompt_number<T>(
    prompt: &str,
    default: Option<&str>,
    parse: fn(&str) -> Result<T, String>,
) -> Result<T, CliError> {
    let mut input = Input::<String>::new().with_prompt(prompt);
    if let Some(default) = default {
        input = input.default(default.to_owned());
    }
    let raw = input
        .validate_with(move |s: &String| parse(s).map(|_| ()))
        .interact_text()
        .map_err(util::prompt_err)?;
    parse(&raw).map_err(|reason| CliError::Validation {
        field: prompt.into(),
        reason,
    })
}

fn prompt_text(prompt: &str) -> Result<String, CliError> {
    Input::<String>::new()
        .with_prompt(prompt)
        .interact_text()
        .map_err(util::prompt_err)
}

fn prompt_toggle(prompt: &str) -> Result<Option<Toggle>, CliError> {
    Ok(pick(prompt, &["On", "Off"])?.map(|i| if i == 0 { Toggle::On } else { Toggle::Off }))
}

// ── Menus ───────────────────────────────────────────────────────────

const MAIN_MENU: &[&str] = &[
    "View unprovisioned device beacons",
    "Provision a device",
    "Subnets",
    "Application keys",
    "View network nodes",
    "Discover a node",
    "Configure a node",
    "Cloud subscriptions",
    "Health",
    "Switch a Generic OnOff server",
    "Refresh the whole network",
];

pub async fn run(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    if !std::io::stdin().is_terminal() {
        return Err(CliError::Validation {
            field: "shell".into(),
            reason: "the interactive menu needs a terminal".into(),
        });
    }

    loop {
        let choice = match pick("meshgate", MAIN_MENU) {
            Ok(Some(choice)) => choice,
            Ok(None) => continue,
            Err(CliError::Cancelled) => return Ok(()),
            Err(e) => return Err(e),
        };
        match action(session, choice, global).await {
            Ok(()) => {}
            Err(CliError::Cancelled) => return Ok(()),
            // A failed operation is reported and the menu comes back.
            Err(e) => eprintln!("{:?}", miette::Report::new(e)),
        }
        if session.is_cancelled() {
            return Ok(());
        }
    }
}

async fn action(session: &Session, choice: usize, global: &GlobalOpts) -> Result<(), CliError> {
    match choice {
        0 => beacons::handle(session, global).await,
        1 => provision(session, global).await,
        2 => subnet_menu(session, global).await,
        3 => app_key_menu(session, global).await,
        4 => nodes::print_list(&session.nodes().await?, global),
        5 => match session.select_node(&DialoguerChooser).await? {
            Some(node) => nodes::discover(session, node.address, global).await,
            None => Ok(()),
        },
        6 => configure(session, global).await,
        7 => subscription_menu(session, global).await,
        8 => health_menu(session, global).await,
        9 => on_off(session, global).await,
        _ => network::refresh(session, global).await,
    }
}

async fn provision(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let Some(beacon) = session.select_beacon(&DialoguerChooser).await? else {
        return Ok(());
    };
    let Some(subnet) = session.select_subnet(&DialoguerChooser).await? else {
        return Ok(());
    };
    let address = prompt_number("Unicast address", None, cli::parse_u16)?;
    let attention = prompt_number("Attention timer (s)", Some("0"), cli::parse_u8)?;
    nodes::provision(session, beacon.uuid, subnet.net_index, address, attention, global).await
}

async fn subnet_menu(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let items = ["List", "Add with a known key", "Generate", "Delete"];
    match pick("Subnets", &items)? {
        Some(0) => subnets::print(&session.subnets().await?, global),
        Some(1) => {
            let key = prompt_text("Network key (hex)")?;
            let index = prompt_number("Network index", None, cli::parse_u16)?;
            subnets::print(&session.add_subnet(key, index).await?, global)
        }
        Some(2) => {
            let index = prompt_number("Network index", None, cli::parse_u16)?;
            subnets::print(&session.generate_subnet(index).await?, global)
        }
        Some(_) => match session.select_subnet(&DialoguerChooser).await? {
            Some(subnet) => subnets::delete(session, subnet.net_index, global).await,
            None => Ok(()),
        },
        None => Ok(()),
    }
}

async fn app_key_menu(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let items = ["List", "Add with a known key", "Generate", "Delete"];
    match pick("Application keys", &items)? {
        Some(0) => app_keys::print(&session.app_keys().await?, global),
        Some(choice @ (1 | 2)) => {
            let key = if choice == 1 {
                Some(prompt_text("Application key (hex)")?)
            } else {
                None
            };
            let index = prompt_number("Application key index", None, cli::parse_u16)?;
            let Some(subnet) = session.select_subnet(&DialoguerChooser).await? else {
                return Ok(());
            };
            let keys = match key {
                Some(key) => session.add_app_key(key, index, subnet.net_index).await?,
                None => session.generate_app_key(index, subnet.net_index).await?,
            };
            app_keys::print(&keys, global)
        }
        Some(_) => match session.select_app_key(&DialoguerChooser).await? {
            Some(key) => app_keys::delete(session, key.app_index, global).await,
            None => Ok(()),
        },
        None => Ok(()),
    }
}

async fn configure(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let Some(node) = session.select_node(&DialoguerChooser).await? else {
        return Ok(());
    };
    let items = [
        "Network beacon",
        "Default TTL",
        "Relay",
        "GATT proxy",
        "Friend",
        "Add a subnet",
        "Bind an application key",
        "Subscribe a model to an address",
    ];
    let Some(choice) = pick("Change", &items)? else {
        return Ok(());
    };

    let element = || {
        prompt_number(
            "Element address",
            Some(&format!("0x{:04x}", node.address)),
            cli::parse_u16,
        )
    };

    let change = match choice {
        0 | 2 | 3 | 4 => {
            let Some(toggle) = prompt_toggle(items[choice])? else {
                return Ok(());
            };
            let state = toggle.is_on();
            match choice {
                0 => NodeConfiguration::NetworkBeaconSet { state },
                3 => NodeConfiguration::ProxyFeatureSet { state },
                4 => NodeConfiguration::FriendFeatureSet { state },
                _ => NodeConfiguration::RelayFeatureSet {
                    state,
                    retransmit_count: prompt_number("Retransmit count", Some("0"), cli::parse_u8)?,
                    retransmit_interval: prompt_number(
                        "Retransmit interval (ms)",
                        Some("10"),
                        cli::parse_u16,
                    )?,
                },
            }
        }
        1 => NodeConfiguration::TimeToLiveSet {
            value: prompt_number("Default TTL", Some("7"), cli::parse_u8)?,
        },
        5 => match session.select_subnet(&DialoguerChooser).await? {
            Some(subnet) => NodeConfiguration::SubnetAdd {
                net_index: subnet.net_index,
            },
            None => return Ok(()),
        },
        6 => {
            let element_address = element()?;
            let model_id = prompt_number("Model id", None, cli::parse_u16)?;
            let Some(key) = session.select_app_key(&DialoguerChooser).await? else {
                return Ok(());
            };
            NodeConfiguration::AppKeyBind {
                element_address,
                model_id,
                app_index: key.app_index,
            }
        }
        _ => NodeConfiguration::SubscribeAddressAdd {
            element_address: element()?,
            model_id: prompt_number("Model id", None, cli::parse_u16)?,
            subscribe_address: prompt_number("Address", None, cli::parse_u16)?,
        },
    };
    nodes::configure(session, node.address, change, global).await
}

async fn subscription_menu(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    match pick("Cloud subscriptions", &["List", "Add", "Remove"])? {
        Some(0) => subscriptions::print(&session.subscriptions().await?, global),
        Some(1) => {
            let address = prompt_number("Address", None, cli::parse_u16)?;
            subscriptions::print(&session.subscribe(&[address]).await?, global)
        }
        Some(_) => match session.select_subscription(&DialoguerChooser).await? {
            Some(sub) => subscriptions::remove(session, &[sub.address], global).await,
            None => Ok(()),
        },
        None => Ok(()),
    }
}

async fn health_menu(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let Some(node) = session.select_node(&DialoguerChooser).await? else {
        return Ok(());
    };
    let Some(key) = session.select_app_key(&DialoguerChooser).await? else {
        return Ok(());
    };
    let target = HealthTarget {
        address: node.address,
        app_key: key.app_index,
    };

    let items = [
        "Registered faults",
        "Clear registered faults",
        "Fast period divisor",
        "Attention timer",
        "Start attention timer",
    ];
    match pick("Health", &items)? {
        Some(choice @ (0 | 1)) => {
            let company = prompt_number("Company id", Some("0x0059"), cli::parse_u16)?;
            if choice == 0 {
                health::faults(session, &target, company, global).await
            } else {
                health::clear_faults(session, &target, company, global).await
            }
        }
        Some(2) => health::period(session, &target, global).await,
        Some(3) => health::attention(session, &target, global).await,
        Some(_) => {
            let seconds = prompt_number("Seconds", Some("5"), cli::parse_u8)?;
            health::set_attention(session, &target, seconds, global).await
        }
        None => Ok(()),
    }
}

async fn on_off(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let Some(node) = session.select_node(&DialoguerChooser).await? else {
        return Ok(());
    };
    let Some(key) = session.select_app_key(&DialoguerChooser).await? else {
        return Ok(());
    };
    let Some(state) = prompt_toggle("State")? else {
        return Ok(());
    };
    let keys = MessageKeys {
        subnet: key.net_index,
        app_key: key.app_index,
    };
    model::set_on_off(session, node.address, state, &keys, None, false, global).await
}
