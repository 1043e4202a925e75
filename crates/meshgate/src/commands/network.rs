//! Whole-network refresh.

use std::time::Duration;

use tabled::Tabled;

use meshgate_core::{DiscoveryPhase, DiscoveryReport, Session};

use crate::cli::{GlobalOpts, NetworkArgs, NetworkCommand};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Node")]
    address: String,
    #[tabled(rename = "Result")]
    result: String,
}

fn rows(report: &DiscoveryReport) -> Vec<OutcomeRow> {
    let discovered = report.discovered.iter().map(|a| OutcomeRow {
        address: output::hex16(*a),
        result: "discovered".into(),
    });
    let failed = report.failed.iter().map(|f| OutcomeRow {
        address: output::hex16(f.address),
        result: format!("failed (code {})", f.code()),
    });
    discovered.chain(failed).collect()
}

fn phase_message(phase: DiscoveryPhase) -> String {
    match phase {
        DiscoveryPhase::Idle | DiscoveryPhase::Subnets => "Refreshing subnets".into(),
        DiscoveryPhase::AppKeys => "Refreshing application keys".into(),
        DiscoveryPhase::Nodes => "Refreshing node list".into(),
        DiscoveryPhase::NodeDetail { index, total } => {
            format!("Discovering node {} of {total}", index + 1)
        }
        DiscoveryPhase::Done => "Discovery complete".into(),
    }
}

pub async fn refresh(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let bar = util::spinner(phase_message(DiscoveryPhase::Idle), global);
    let run = session.refresh_network();
    tokio::pin!(run);

    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    let result = loop {
        tokio::select! {
            result = &mut run => break result,
            _ = ticker.tick() => bar.set_message(phase_message(session.discovery_phase())),
        }
    };
    bar.finish_and_clear();
    let report = result?;

    let out = output::render_single(
        &global.output,
        &report,
        |r| {
            if r.discovered.is_empty() && r.failed.is_empty() {
                "Every node was already discovered".into()
            } else {
                tabled::Table::new(rows(r))
                    .with(tabled::settings::Style::rounded())
                    .to_string()
            }
        },
        |r| {
            r.discovered
                .iter()
                .map(|a| output::hex16(*a))
                .collect::<Vec<_>>()
                .join("\n")
        },
    )?;
    output::print_output(&out, global.quiet);

    if !report.failed.is_empty() {
        tracing::warn!(failed = report.failed.len(), "some nodes could not be discovered");
    }
    Ok(())
}

pub async fn handle(
    session: &Session,
    args: NetworkArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        NetworkCommand::Refresh => refresh(session, global).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshgate_core::DiscoveryFailure;

    #[test]
    fn failures_show_their_code() {
        let report = DiscoveryReport {
            discovered: vec![2],
            failed: vec![DiscoveryFailure {
                address: 3,
                error: 0,
                status: 4,
            }],
        };
        let rows = rows(&report);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].address, "0x0003");
        assert_eq!(rows[1].result, "failed (code 4)");
    }

    #[test]
    fn node_phase_counts_from_one() {
        assert_eq!(
            phase_message(DiscoveryPhase::NodeDetail { index: 0, total: 3 }),
            "Discovering node 1 of 3"
        );
    }
}
