//! Registry diagnostics.

use serde::Serialize;
use tabled::Tabled;

use ska_core::error::AppError;

use crate::client::{AdminClient, HookRecord};
use crate::output::{self, OutputFormat};

/// Hook display row
#[derive(Debug, Serialize, Tabled)]
struct HookRow {
    #[tabled(rename = "Seq")]
    sequence: u64,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Live")]
    live: String,
}

impl From<HookRecord> for HookRow {
    fn from(hook: HookRecord) -> Self {
        Self {
            sequence: hook.sequence,
            kind: hook.kind,
            key: hook.key,
            live: if hook.live { "✓" } else { "✗" }.to_string(),
        }
    }
}

pub async fn list(client: &AdminClient, format: OutputFormat) -> Result<(), AppError> {
    let hooks = client.hooks().await?;
    if format == OutputFormat::Table {
        println!("Registry: {}", hooks.registry_id);
    }
    let rows: Vec<HookRow> = hooks
        .filters
        .into_iter()
        .chain(hooks.interceptors)
        .map(HookRow::from)
        .collect();
    output::print_list(&rows, format);
    Ok(())
}
