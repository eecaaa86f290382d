//! Schema command handler.

use csvgate::{Error, Result, Schema};
use std::path::Path;

/// Executes the schema command: loads, compiles and describes a schema file.
pub fn cmd_schema(path: &Path, json: bool) -> Result<()> {
    let schema = Schema::load_from_file(path)?;

    if json {
        let text = serde_json::to_string_pretty(&schema.to_definition()).map_err(|e| {
            Error::OperationFailed {
                operation: "serialize_schema".to_string(),
                cause: e.to_string(),
            }
        })?;
        println!("{text}");
        return Ok(());
    }

    println!(
        "Schema {} ({} columns)",
        schema.name().unwrap_or("(unnamed)"),
        schema.len()
    );
    println!();
    for column in schema.columns() {
        let null = if column.nullable { "null" } else { "not null" };
        match &column.format {
            Some(format) => println!(
                "  {:<20} {:<8} {null:<9} {format}",
                column.name,
                column.column_type.as_str()
            ),
            None => println!(
                "  {:<20} {:<8} {null}",
                column.name,
                column.column_type.as_str()
            ),
        }
    }

    let rules: Vec<_> = schema.rules().collect();
    if !rules.is_empty() {
        println!();
        println!("Rules:");
        for rule in rules {
            println!("  {rule}");
        }
    }
    Ok(())
}
