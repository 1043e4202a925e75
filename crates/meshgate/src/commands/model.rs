//! Access-layer messages: raw sends, Generic OnOff, and a listener for
//! whatever nodes send back.

use std::sync::Arc;
use std::time::Duration;

use owo_colors::OwoColorize;
use serde::Serialize;
use tokio::sync::broadcast;

use meshgate_core::message::{GENERIC_ONOFF_SET, GENERIC_ONOFF_SET_UNACK};
use meshgate_core::{Notification, OnOffPayload, OnOffStatus, Session, Transition};

use crate::cli::{GlobalOpts, MessageKeys, ModelArgs, ModelCommand, OutputFormat, Toggle};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Rendering ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OnOffView {
    address: u16,
    present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining_time: Option<u8>,
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

fn notification_text(notification: &Notification, color: bool) -> String {
    let time = chrono::Local::now().format("%H:%M:%S");
    let body = match notification {
        Notification::ModelMessage(m) => format!(
            "{} -> {} opcode {} payload {}",
            output::hex16(m.source_address),
            output::hex16(m.destination_address),
            output::opcode(m.opcode),
            output::bytes(&m.payload_bytes())
        ),
        Notification::CurrentFaults(f) => {
            let codes: Vec<u8> = f.faults.iter().map(|fault| fault.fault).collect();
            format!(
                "{} current faults (company {}, test {}): {}",
                output::hex16(f.address),
                output::hex16(f.company_id),
                output::hex8(f.test_id),
                if codes.is_empty() { "none".into() } else { output::bytes(&codes) }
            )
        }
    };
    if color {
        format!("{} {body}", time.dimmed())
    } else {
        format!("{time} {body}")
    }
}

/// One line (or one YAML document) per notification.
fn notification_line(
    notification: &Notification,
    format: &OutputFormat,
    color: bool,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Table | OutputFormat::Plain => Ok(notification_text(notification, color)),
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(notification)
            .map_err(|e| CliError::Render(e.to_string())),
        OutputFormat::Yaml => serde_yaml::to_string(notification)
            .map(|doc| format!("---\n{}", doc.trim_end()))
            .map_err(|e| CliError::Render(e.to_string())),
    }
}

// ── Listening ───────────────────────────────────────────────────────

/// Print notifications until `limit` is reached, `window` elapses,
/// the session ends, or Ctrl-C.
async fn listen(
    rx: &mut broadcast::Receiver<Arc<Notification>>,
    from: Option<u16>,
    limit: Option<usize>,
    window: Option<Duration>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let deadline = window.map(|w| tokio::time::Instant::now() + w);
    let mut seen = 0usize;

    loop {
        if limit.is_some_and(|n| seen >= n) {
            return Ok(());
        }
        let expired = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };
        let received = tokio::select! {
            received = rx.recv() => received,
            () = expired => return Ok(()),
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };

        let notification = match received {
            Ok(n) => n,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "listener fell behind, messages dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        };
        if from.is_some_and(|addr| notification.source_address() != addr) {
            continue;
        }
        seen += 1;
        output::print_output(
            &notification_line(&notification, &global.output, color)?,
            global.quiet,
        );
    }
}

async fn wait_for_on_off(
    rx: &mut broadcast::Receiver<Arc<Notification>>,
    address: u16,
) -> Option<OnOffStatus> {
    loop {
        match rx.recv().await {
            Ok(notification) => {
                let Notification::ModelMessage(message) = notification.as_ref() else {
                    continue;
                };
                if message.source_address != address {
                    continue;
                }
                if let Some(status) = OnOffStatus::from_message(message) {
                    return Some(status);
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

// ── Operations shared with the interactive shell ────────────────────

/// Set a Generic OnOff server and, unless `unack`, wait for its status.
pub async fn set_on_off(
    session: &Session,
    address: u16,
    state: Toggle,
    keys: &MessageKeys,
    transition: Option<Transition>,
    unack: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let payload = OnOffPayload::new().set(state.is_on(), transition);
    let opcode = if unack {
        GENERIC_ONOFF_SET_UNACK
    } else {
        GENERIC_ONOFF_SET
    };

    // Subscribe before sending so a fast status is not missed.
    let mut rx = session.notifications();
    session
        .send_model_message(keys.subnet, keys.app_key, address, opcode, &payload)
        .await?;

    if unack {
        util::status(
            global,
            &format!("Sent {} to {}", on_off(state.is_on()), output::hex16(address)),
        );
        return Ok(());
    }

    let timeout = session.config().timeout;
    let status = match tokio::time::timeout(timeout, wait_for_on_off(&mut rx, address)).await {
        Ok(Some(status)) => status,
        Ok(None) => return Err(CliError::Cancelled),
        Err(_) => {
            return Err(CliError::Timeout {
                operation: "generic_onoff_set".into(),
                seconds: timeout.as_secs(),
            });
        }
    };

    let view = OnOffView {
        address,
        present: status.present,
        target: status.target,
        remaining_time: status.remaining_time,
    };
    let out = output::render_single(
        &global.output,
        &view,
        |v| {
            let mut line = format!("{} is {}", output::hex16(v.address), on_off(v.present));
            if let Some(target) = v.target {
                line.push_str(&format!(", moving to {}", on_off(target)));
            }
            line
        },
        |v| on_off(v.present).into(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(session: &Session, args: ModelArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ModelCommand::Send {
            address,
            opcode,
            payload,
            keys,
            listen: window,
        } => {
            let mut rx = session.notifications();
            session
                .send_model_message(keys.subnet, keys.app_key, address, opcode, &payload)
                .await?;
            util::status(
                global,
                &format!(
                    "Sent opcode {} to {} ({} payload bytes)",
                    output::opcode(opcode),
                    output::hex16(address),
                    payload.len()
                ),
            );
            match window {
                Some(secs) => {
                    listen(&mut rx, Some(address), None, Some(Duration::from_secs(secs)), global)
                        .await
                }
                None => Ok(()),
            }
        }
        ModelCommand::Onoff {
            address,
            state,
            keys,
            transition,
            delay,
            unack,
        } => {
            let transition = transition.map(|time| Transition { time, delay });
            set_on_off(session, address, state, &keys, transition, unack, global).await
        }
        ModelCommand::Listen { from, count } => {
            let mut rx = session.notifications();
            util::status(global, "Listening for model messages (Ctrl-C to stop)");
            tokio::select! {
                result = listen(&mut rx, from, count, None, global) => result,
                () = session.cancelled() => Err(CliError::Cancelled),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use meshgate_core::ModelMessage;
    use meshgate_api::model::PayloadByte;

    fn status_message() -> Notification {
        Notification::ModelMessage(ModelMessage {
            net_index: 0,
            app_index: 0,
            source_address: 5,
            destination_address: 1,
            opcode: 0x8204,
            payload: vec![PayloadByte { byte: 1 }],
        })
    }

    #[test]
    fn text_line_shows_hex_fields() {
        let line = notification_text(&status_message(), false);
        assert!(line.ends_with("0x0005 -> 0x0001 opcode 0x8204 payload 0x01"), "{line}");
    }

    #[test]
    fn json_line_is_tagged() {
        let line = notification_line(&status_message(), &OutputFormat::Json, false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["kind"], "model_message");
        assert_eq!(value["sourceAddress"], 5);
    }

    #[tokio::test]
    async fn on_off_wait_skips_other_sources() {
        let (tx, mut rx) = broadcast::channel(8);
        let mut other = status_message();
        if let Notification::ModelMessage(m) = &mut other {
            m.source_address = 9;
        }
        tx.send(Arc::new(other)).unwrap();
        tx.send(Arc::new(status_message())).unwrap();

        let status = wait_for_on_off(&mut rx, 5).await.unwrap();
        assert!(status.present);
    }
}
