//! Unprovisioned beacon listing.

use tabled::Tabled;

use meshgate_core::{Beacon, Session};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct BeaconRow {
    #[tabled(rename = "UUID")]
    uuid: String,
    #[tabled(rename = "Type")]
    device_type: String,
    #[tabled(rename = "OOB")]
    oob: String,
    #[tabled(rename = "URI Hash")]
    uri_hash: String,
}

impl From<&Beacon> for BeaconRow {
    fn from(b: &Beacon) -> Self {
        Self {
            uuid: b.uuid.clone(),
            device_type: or_dash(&b.device_type),
            oob: or_dash(&b.oob_info),
            uri_hash: if b.uri_hash == 0 {
                "-".into()
            } else {
                format!("0x{:08x}", b.uri_hash)
            },
        }
    }
}

fn or_dash(s: &str) -> String {
    if s.is_empty() { "-".into() } else { s.to_owned() }
}

pub async fn handle(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let beacons = session.beacons().await?;
    let out = output::render_list(&global.output, beacons.as_slice(), |b| BeaconRow::from(b), |b| {
        b.uuid.clone()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
