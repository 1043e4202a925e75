//! Node command handlers.

use std::fmt::Write as _;

use tabled::Tabled;

use meshgate_api::model::{Element, PublishParameters};
use meshgate_core::message::sig_model_name;
use meshgate_core::{
    NodeConfiguration, NodeDetail, NodeSummary, PeriodUnits, ProvisionResult, Session,
};

use crate::cli::{ConfigureCommand, GlobalOpts, NodesArgs, NodesCommand, PeriodUnit};
use crate::error::CliError;
use crate::output;

use super::{shell, util};

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "UUID")]
    uuid: String,
    #[tabled(rename = "Type")]
    device_type: String,
    #[tabled(rename = "Net Index")]
    net_index: String,
    #[tabled(rename = "Elements")]
    elements: u16,
    #[tabled(rename = "Role")]
    role: String,
}

impl From<&NodeSummary> for NodeRow {
    fn from(n: &NodeSummary) -> Self {
        Self {
            address: output::hex16(n.address),
            uuid: n.uuid.clone(),
            device_type: if n.device_type.is_empty() {
                "-".into()
            } else {
                n.device_type.clone()
            },
            net_index: output::hex16(n.net_index),
            elements: n.element_count,
            role: if n.is_gateway() { "gateway".into() } else { String::new() },
        }
    }
}

// ── Detail view ─────────────────────────────────────────────────────

fn feature(support: bool, enabled: bool, color: bool) -> String {
    if support {
        format!("supported, {}", output::state(enabled, color))
    } else {
        "not supported".into()
    }
}

fn publish_line(p: &PublishParameters) -> String {
    if p.address == 0 {
        return "-".into();
    }
    format!(
        "{} via app key {}, ttl {}, period {} x {}, retransmit {} x {} ms{}",
        output::hex16(p.address),
        output::hex16(p.app_index),
        p.time_to_live,
        p.period,
        if p.period_units.is_empty() { "-" } else { p.period_units.as_str() },
        p.retransmit_count,
        p.retransmit_interval,
        if p.friend_credential_flag { ", friend credentials" } else { "" },
    )
}

fn write_element(out: &mut String, element: &Element, primary: bool, color: bool) {
    let title = format!(
        "Element {}{}",
        output::hex16(element.address),
        if primary { " (primary)" } else { "" }
    );
    let _ = writeln!(out, "  {}", output::heading(&title, color));

    for model in &element.sig_models {
        let name = sig_model_name(model.model_id).unwrap_or("unknown model");
        let _ = writeln!(out, "    SIG {} {name}", output::hex16(model.model_id));
        let _ = writeln!(out, "      App keys:   {}", output::hex16_list(&model.app_indexes));
        let _ = writeln!(
            out,
            "      Subscribed: {}",
            output::hex16_list(&model.subscribe_addresses)
        );
        let _ = writeln!(out, "      Publish:    {}", publish_line(&model.publish_parameters));
    }
    for model in &element.vendor_models {
        let _ = writeln!(
            out,
            "    Vendor {} (company {})",
            output::hex16(model.model_id),
            output::hex16(model.company_id)
        );
        let _ = writeln!(out, "      App keys:   {}", output::hex16_list(&model.app_indexes));
        let _ = writeln!(
            out,
            "      Subscribed: {}",
            output::hex16_list(&model.subscribe_addresses)
        );
        let _ = writeln!(out, "      Publish:    {}", publish_line(&model.publish_parameters));
    }
}

pub fn detail(node: &NodeDetail, color: bool) -> String {
    let relay = &node.relay_feature;
    let relay_line = if relay.support {
        format!(
            "{} (retransmit {} x {} ms)",
            feature(true, relay.state, color),
            relay.retransmit_count,
            relay.retransmit_interval
        )
    } else {
        feature(false, false, color)
    };

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        output::heading(&format!("Node {}", output::hex16(node.address)), color)
    );
    let _ = writeln!(out, "  UUID:           {}", node.uuid);
    let _ = writeln!(
        out,
        "  CID/PID/VID:    {} / {} / {}",
        output::hex16(node.cid),
        output::hex16(node.pid),
        output::hex16(node.vid)
    );
    let _ = writeln!(out, "  CRPL:           {}", output::hex16(node.crpl));
    let _ = writeln!(
        out,
        "  Network beacon: {}",
        output::state(node.network_beacon_state, color)
    );
    let _ = writeln!(out, "  Default TTL:    {}", node.time_to_live);
    let _ = writeln!(out, "  Relay:          {relay_line}");
    let _ = writeln!(
        out,
        "  Proxy:          {}",
        feature(node.proxy_feature.support, node.proxy_feature.state, color)
    );
    let _ = writeln!(
        out,
        "  Friend:         {}",
        feature(node.friend_feature.support, node.friend_feature.state, color)
    );
    let _ = writeln!(
        out,
        "  Low power:      {}",
        output::state(node.lpn_feature.state, color)
    );
    let _ = writeln!(out, "  Subnets:        {}", output::hex16_list(&node.subnets));

    for element in &node.elements {
        write_element(&mut out, element, element.address == node.address, color);
    }
    out.trim_end().to_owned()
}

pub fn print_detail(node: &NodeDetail, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        node,
        |n| detail(n, color),
        |n| output::hex16(n.address),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub fn print_list(nodes: &[NodeSummary], global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_list(&global.output, nodes, |n| NodeRow::from(n), |n| {
        output::hex16(n.address)
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn print_provisioned(result: &ProvisionResult, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_single(
        &global.output,
        result,
        |r| {
            format!(
                "Provisioned {} as {} on subnet {} ({} element{})",
                r.uuid,
                output::hex16(r.address),
                output::hex16(r.net_index),
                r.element_count,
                if r.element_count == 1 { "" } else { "s" }
            )
        },
        |r| output::hex16(r.address),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Operations shared with the interactive shell ────────────────────

pub async fn discover(session: &Session, address: u16, global: &GlobalOpts) -> Result<(), CliError> {
    let message = format!("Discovering node {}", output::hex16(address));
    let node = util::with_spinner(message, global, session.discover_node(address)).await?;
    print_detail(&node, global)
}

pub async fn configure(
    session: &Session,
    address: u16,
    change: NodeConfiguration,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let message = format!("Configuring node {}", output::hex16(address));
    let node = util::with_spinner(message, global, session.configure_node(address, change)).await?;
    print_detail(&node, global)
}

pub async fn provision(
    session: &Session,
    uuid: String,
    net_index: u16,
    address: u16,
    attention: u8,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let message = format!("Provisioning {uuid}");
    let result = util::with_spinner(
        message,
        global,
        session.provision(uuid.clone(), net_index, address, attention),
    )
    .await?;
    print_provisioned(&result, global)
}

// ── Argument translation ────────────────────────────────────────────

fn period_units(unit: PeriodUnit) -> PeriodUnits {
    match unit {
        PeriodUnit::Millis100 => PeriodUnits::Millis100,
        PeriodUnit::Seconds1 => PeriodUnits::Seconds1,
        PeriodUnit::Seconds10 => PeriodUnits::Seconds10,
        PeriodUnit::Minutes10 => PeriodUnits::Minutes10,
    }
}

pub fn to_configuration(change: ConfigureCommand) -> NodeConfiguration {
    match change {
        ConfigureCommand::NetworkBeacon { state } => NodeConfiguration::NetworkBeaconSet {
            state: state.is_on(),
        },
        ConfigureCommand::Ttl { value } => NodeConfiguration::TimeToLiveSet { value },
        ConfigureCommand::Relay {
            state,
            retransmit_count,
            retransmit_interval,
        } => NodeConfiguration::RelayFeatureSet {
            state: state.is_on(),
            retransmit_count,
            retransmit_interval,
        },
        ConfigureCommand::Proxy { state } => NodeConfiguration::ProxyFeatureSet {
            state: state.is_on(),
        },
        ConfigureCommand::Friend { state } => NodeConfiguration::FriendFeatureSet {
            state: state.is_on(),
        },
        ConfigureCommand::AddSubnet { net_index } => NodeConfiguration::SubnetAdd { net_index },
        ConfigureCommand::RemoveSubnet { net_index } => {
            NodeConfiguration::SubnetDelete { net_index }
        }
        ConfigureCommand::Bind { target, app_key } => NodeConfiguration::AppKeyBind {
            element_address: target.element,
            model_id: target.model,
            app_index: app_key,
        },
        ConfigureCommand::Unbind { target, app_key } => NodeConfiguration::AppKeyUnbind {
            element_address: target.element,
            model_id: target.model,
            app_index: app_key,
        },
        ConfigureCommand::Publish {
            target,
            address,
            app_key,
            friend_credential,
            ttl,
            period,
            period_units: units,
            retransmit_count,
            retransmit_interval,
        } => NodeConfiguration::PublishParametersSet {
            element_address: target.element,
            model_id: target.model,
            publish_address: address,
            app_index: app_key,
            friend_credential_flag: friend_credential,
            time_to_live: ttl,
            period,
            period_units: period_units(units),
            retransmit_count,
            retransmit_interval,
        },
        ConfigureCommand::Subscribe { target, address } => NodeConfiguration::SubscribeAddressAdd {
            element_address: target.element,
            model_id: target.model,
            subscribe_address: address,
        },
        ConfigureCommand::Unsubscribe { target, address } => {
            NodeConfiguration::SubscribeAddressDelete {
                element_address: target.element,
                model_id: target.model,
                subscribe_address: address,
            }
        }
        ConfigureCommand::OverwriteSubscriptions { target, address } => {
            NodeConfiguration::SubscribeAddressOverwrite {
                element_address: target.element,
                model_id: target.model,
                subscribe_address: address,
            }
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(session: &Session, args: NodesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        NodesCommand::List => print_list(&session.nodes().await?, global),
        NodesCommand::Discover { address } => discover(session, address, global).await,
        NodesCommand::Configure { address, change } => {
            configure(session, address, to_configuration(change), global).await
        }
        NodesCommand::Provision {
            uuid,
            address,
            subnet,
            attention,
        } => {
            let uuid = match uuid {
                Some(uuid) => uuid,
                None => match session.select_beacon(&shell::DialoguerChooser).await? {
                    Some(beacon) => beacon.uuid,
                    None => return Ok(()),
                },
            };
            provision(session, uuid, subnet, address, attention, global).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{ModelTarget, Toggle};
    use meshgate_api::model::SigModel;
    use pretty_assertions::assert_eq;

    #[test]
    fn detail_lists_models_with_hex_addresses() {
        let node = NodeDetail {
            address: 5,
            uuid: "abcd".into(),
            cid: 0x59,
            elements: vec![Element {
                address: 5,
                sig_models: vec![SigModel {
                    model_id: 0x1000,
                    app_indexes: vec![0],
                    ..SigModel::default()
                }],
                vendor_models: vec![],
            }],
            ..NodeDetail::default()
        };
        let text = detail(&node, false);
        assert!(text.starts_with("Node 0x0005"));
        assert!(text.contains("CID/PID/VID:    0x0059 / 0x0000 / 0x0000"));
        assert!(text.contains("Element 0x0005 (primary)"));
        assert!(text.contains("SIG 0x1000 Generic OnOff Server"));
        assert!(text.contains("App keys:   0x0000"));
        assert!(text.contains("Publish:    -"));
        assert!(text.contains("Relay:          not supported"));
    }

    #[test]
    fn configure_arguments_map_to_operations() {
        let change = to_configuration(ConfigureCommand::Bind {
            target: ModelTarget {
                element: 5,
                model: 0x1000,
            },
            app_key: 1,
        });
        assert_eq!(
            change,
            NodeConfiguration::AppKeyBind {
                element_address: 5,
                model_id: 0x1000,
                app_index: 1,
            }
        );
        assert_eq!(
            to_configuration(ConfigureCommand::Proxy { state: Toggle::Off }),
            NodeConfiguration::ProxyFeatureSet { state: false }
        );
    }
}
