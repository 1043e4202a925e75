//! Gateways registered to the nRF Cloud account.

use tabled::Tabled;

use meshgate_api::DeviceSummary;
use meshgate_core::CoreError;

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct GatewayRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Firmware")]
    version: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&DeviceSummary> for GatewayRow {
    fn from(d: &DeviceSummary) -> Self {
        Self {
            id: d.id.clone(),
            name: if d.name.is_empty() { "-".into() } else { d.name.clone() },
            version: d.meta.version.clone().unwrap_or_else(|| "-".into()),
            created: d.meta.created_at.clone().unwrap_or_else(|| "-".into()),
        }
    }
}

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let client = config::build_account_client(global)?;
    let devices = util::with_spinner("Listing account devices", global, client.gateways())
        .await
        .map_err(CoreError::from)?;
    let gateways: Vec<DeviceSummary> = devices.into_iter().filter(DeviceSummary::is_gateway).collect();

    let out = output::render_list(&global.output, &gateways, |d| GatewayRow::from(d), |d| {
        d.id.clone()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
