//! `covgen inspect`

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::display::{list_table, output, render_list, truncate_ellipsis, CommandOutput};
use crate::cli::types::InspectArgs;
use crate::domain::models::{CodeStructure, Language};
use crate::services::StructureExtractor;

/// JSON output of `covgen inspect`
#[derive(Debug, Serialize)]
pub struct InspectOutput {
    /// Inspected file
    pub path: String,
    /// Detected language
    pub language: Language,
    /// Extracted structure
    pub structure: CodeStructure,
}

impl CommandOutput for InspectOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["kind", "name", "lines", "signature"]);
        let mut rows = 0;
        for function in &self.structure.functions {
            table.add_row(vec![
                "function".to_string(),
                function.name.clone(),
                format!("{}-{}", function.line_range.start, function.line_range.end),
                truncate_ellipsis(&function.signature, 70),
            ]);
            rows += 1;
        }
        for class in &self.structure.classes {
            table.add_row(vec![
                "class".to_string(),
                class.name.clone(),
                format!("{}-{}", class.line_range.start, class.line_range.end),
                String::new(),
            ]);
            rows += 1;
            for method in &class.methods {
                table.add_row(vec![
                    "  method".to_string(),
                    format!("{}.{}", class.name, method.name),
                    format!("{}-{}", method.line_range.start, method.line_range.end),
                    truncate_ellipsis(&method.signature, 70),
                ]);
                rows += 1;
            }
        }
        format!(
            "{} ({})\n{}",
            self.path,
            self.language,
            render_list("declaration", table, rows)
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Handle the inspect command
pub async fn execute(args: InspectArgs, json: bool) -> Result<()> {
    let path = args.file.to_string_lossy().replace('\\', "/");
    let language = match args.language.as_deref() {
        Some(name) => name.parse::<Language>().map_err(|e| anyhow::anyhow!(e))?,
        None => Language::from_path(&args.file),
    };
    let source = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let structure = StructureExtractor::extract(language, &path, &source);
    output(
        &InspectOutput {
            path,
            language,
            structure,
        },
        json,
    );
    Ok(())
}
