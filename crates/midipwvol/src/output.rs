//! Output formatting for `objects`: table, JSON, plain.

use std::sync::Arc;

use serde_json::Value;
use tabled::{Table, Tabled, settings::Style};

use midipwvol_core::MirroredObject;

use crate::cli::OutputFormat;

#[derive(Tabled)]
struct ObjectRow {
    #[tabled(rename = "ID")]
    id: u32,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Media Class")]
    media_class: String,
    #[tabled(rename = "Name")]
    name: String,
}

impl From<&MirroredObject> for ObjectRow {
    fn from(obj: &MirroredObject) -> Self {
        Self {
            id: obj.id().get(),
            kind: obj.kind().to_owned(),
            media_class: obj.media_class().to_owned(),
            name: obj.name().unwrap_or_default().to_owned(),
        }
    }
}

/// Render objects in the chosen format.
pub fn render_objects(
    format: OutputFormat,
    objects: &[Arc<MirroredObject>],
) -> Result<String, serde_json::Error> {
    let raw = || objects.iter().map(|obj| obj.raw()).collect::<Vec<&Value>>();
    Ok(match format {
        OutputFormat::Table => {
            let rows: Vec<ObjectRow> = objects.iter().map(|obj| ObjectRow::from(&**obj)).collect();
            Table::new(rows).with(Style::rounded()).to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(&raw())?,
        OutputFormat::JsonCompact => serde_json::to_string(&raw())?,
        OutputFormat::Plain => objects
            .iter()
            .map(|obj| obj.id().to_string())
            .collect::<Vec<_>>()
            .join("\n"),
    })
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    println!("{output}");
}
