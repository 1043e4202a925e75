//! Health client handlers.

use serde::Serialize;

use meshgate_core::{RegisteredFaults, Session};

use crate::cli::{GlobalOpts, HealthArgs, HealthCommand, HealthTarget};
use crate::error::CliError;
use crate::output;

use super::util;

/// A single value read from a node, for structured output.
#[derive(Debug, Serialize)]
struct Reading {
    address: u16,
    #[serde(flatten)]
    value: ReadingValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum ReadingValue {
    PeriodDivisor(u8),
    Attention(u8),
    ClientTimeout(u32),
}

fn faults_detail(address: u16, faults: &RegisteredFaults) -> String {
    let codes: Vec<u8> = faults.faults.iter().map(|f| f.fault).collect();
    format!(
        "Node {}\n  Test id: {}\n  Faults:  {}",
        output::hex16(address),
        output::hex8(faults.test_id),
        if codes.is_empty() { "none".into() } else { output::bytes(&codes) }
    )
}

pub fn print_faults(
    address: u16,
    faults: &RegisteredFaults,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let out = output::render_single(
        &global.output,
        faults,
        |f| faults_detail(address, f),
        |f| {
            f.faults
                .iter()
                .map(|fault| output::hex8(fault.fault))
                .collect::<Vec<_>>()
                .join("\n")
        },
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn print_reading(reading: &Reading, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_single(
        &global.output,
        reading,
        |r| match r.value {
            ReadingValue::PeriodDivisor(d) => {
                format!("Node {} fast period divisor: {d}", output::hex16(r.address))
            }
            ReadingValue::Attention(a) => {
                format!("Node {} attention timer: {a}s", output::hex16(r.address))
            }
            ReadingValue::ClientTimeout(t) => format!("Health client timeout: {t} ms"),
        },
        |r| match r.value {
            ReadingValue::PeriodDivisor(v) | ReadingValue::Attention(v) => v.to_string(),
            ReadingValue::ClientTimeout(v) => v.to_string(),
        },
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn faults(
    session: &Session,
    target: &HealthTarget,
    company: u16,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let faults = session
        .registered_faults(target.address, target.app_key, company)
        .await?;
    print_faults(target.address, &faults, global)
}

pub async fn clear_faults(
    session: &Session,
    target: &HealthTarget,
    company: u16,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let prompt = format!("Clear registered faults on {}?", output::hex16(target.address));
    if !util::confirm("health clear-faults", &prompt, global.yes)? {
        return Ok(());
    }
    let faults = session
        .clear_faults(target.address, target.app_key, company)
        .await?;
    print_faults(target.address, &faults, global)
}

pub async fn period(
    session: &Session,
    target: &HealthTarget,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let divisor = session.period_divisor(target.address, target.app_key).await?;
    print_reading(
        &Reading {
            address: target.address,
            value: ReadingValue::PeriodDivisor(divisor),
        },
        global,
    )
}

pub async fn attention(
    session: &Session,
    target: &HealthTarget,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let attention = session.attention(target.address, target.app_key).await?;
    print_reading(
        &Reading {
            address: target.address,
            value: ReadingValue::Attention(attention),
        },
        global,
    )
}

pub async fn set_attention(
    session: &Session,
    target: &HealthTarget,
    seconds: u8,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    session
        .set_attention(target.address, target.app_key, seconds)
        .await?;
    util::status(
        global,
        &format!(
            "Attention timer on {} set to {seconds}s",
            output::hex16(target.address)
        ),
    );
    Ok(())
}

pub async fn handle(session: &Session, args: HealthArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        HealthCommand::Faults { target, company } => faults(session, &target, company, global).await,
        HealthCommand::ClearFaults { target, company } => {
            clear_faults(session, &target, company, global).await
        }
        HealthCommand::TestFaults {
            target,
            company,
            test_id,
        } => {
            let faults = util::with_spinner(
                format!("Running test {test_id} on {}", output::hex16(target.address)),
                global,
                session.test_faults(target.address, target.app_key, company, test_id),
            )
            .await?;
            print_faults(target.address, &faults, global)
        }
        HealthCommand::Period { target } => period(session, &target, global).await,
        HealthCommand::SetPeriod { target, divisor } => {
            let divisor = session
                .set_period_divisor(target.address, target.app_key, divisor)
                .await?;
            print_reading(
                &Reading {
                    address: target.address,
                    value: ReadingValue::PeriodDivisor(divisor),
                },
                global,
            )
        }
        HealthCommand::Attention { target } => attention(session, &target, global).await,
        HealthCommand::SetAttention { target, seconds } => {
            set_attention(session, &target, seconds, global).await
        }
        HealthCommand::ClientTimeout => {
            let timeout = session.health_client_timeout().await?;
            print_reading(
                &Reading {
                    address: meshgate_core::GATEWAY_ADDRESS,
                    value: ReadingValue::ClientTimeout(timeout),
                },
                global,
            )
        }
        HealthCommand::SetClientTimeout { timeout } => {
            let timeout = session.set_health_client_timeout(timeout).await?;
            print_reading(
                &Reading {
                    address: meshgate_core::GATEWAY_ADDRESS,
                    value: ReadingValue::ClientTimeout(timeout),
                },
                global,
            )
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use meshgate_api::model::HealthFault;

    #[test]
    fn faults_show_as_hex_bytes() {
        let faults = RegisteredFaults {
            test_id: 0,
            faults: vec![HealthFault { fault: 0x01 }, HealthFault { fault: 0x0a }],
        };
        assert_eq!(
            faults_detail(5, &faults),
            "Node 0x0005\n  Test id: 0x00\n  Faults:  0x01 0x0a"
        );
    }

    #[test]
    fn reading_serializes_flat() {
        let reading = Reading {
            address: 5,
            value: ReadingValue::Attention(3),
        };
        assert_eq!(
            serde_json::to_value(&reading).unwrap(),
            serde_json::json!({ "address": 5, "attention": 3 })
        );
    }
}
