//! Plugin lifecycle commands.

use serde::Serialize;
use tabled::Tabled;

use ska_core::error::AppError;

use crate::client::{AdminClient, PluginRecord};
use crate::output::{self, OutputFormat};

/// Plugin display row
#[derive(Debug, Serialize, Tabled)]
#[serde(rename_all = "camelCase")]
pub struct PluginRow {
    /// Plugin ID
    #[tabled(rename = "ID")]
    pub plugin_id: String,
    /// Version
    #[tabled(rename = "Version")]
    pub version: String,
    /// Lifecycle state
    #[tabled(rename = "State")]
    pub state: String,
    /// Description
    #[tabled(rename = "Description")]
    pub description: String,
}

impl From<PluginRecord> for PluginRow {
    fn from(record: PluginRecord) -> Self {
        let description = match record.last_error {
            Some(error) if record.state == "FAILED" => error,
            _ => record.description,
        };
        Self {
            plugin_id: record.plugin_id,
            version: record.version,
            state: record.state,
            description,
        }
    }
}

fn rows(records: Vec<PluginRecord>) -> Vec<PluginRow> {
    records.into_iter().map(PluginRow::from).collect()
}

pub async fn list(client: &AdminClient, format: OutputFormat) -> Result<(), AppError> {
    output::print_list(&rows(client.list().await?), format);
    Ok(())
}

pub async fn show(client: &AdminClient, id: &str, format: OutputFormat) -> Result<(), AppError> {
    output::print_item(&PluginRow::from(client.get(id).await?), format);
    Ok(())
}

pub async fn start(client: &AdminClient, id: &str, format: OutputFormat) -> Result<(), AppError> {
    output::print_item(&PluginRow::from(client.start(id).await?), format);
    Ok(())
}

pub async fn stop(client: &AdminClient, id: &str, format: OutputFormat) -> Result<(), AppError> {
    output::print_item(&PluginRow::from(client.stop(id).await?), format);
    Ok(())
}

pub async fn unload(client: &AdminClient, id: &str, format: OutputFormat) -> Result<(), AppError> {
    output::print_item(&PluginRow::from(client.unload(id).await?), format);
    Ok(())
}

pub async fn reload_all(client: &AdminClient, format: OutputFormat) -> Result<(), AppError> {
    output::print_list(&rows(client.reload_all().await?), format);
    Ok(())
}
