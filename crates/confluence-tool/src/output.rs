//! Rendering command results as YAML (default) or JSON

use anyhow::Result;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Format::Json
        } else {
            Format::Yaml
        }
    }
}

/// Render one document per record.
///
/// YAML output is a multi-document stream; JSON output is a single value
/// for one record and an array otherwise.
pub fn render(documents: &[Value], format: Format) -> Result<String> {
    match format {
        Format::Yaml => {
            let mut out = String::new();
            for (i, document) in documents.iter().enumerate() {
                if i > 0 {
                    out.push_str("---\n");
                }
                out.push_str(&serde_yaml::to_string(document)?);
            }
            Ok(out)
        }
        Format::Json => {
            let mut out = match documents {
                [single] => serde_json::to_string_pretty(single)?,
                many => serde_json::to_string_pretty(many)?,
            };
            out.push('\n');
            Ok(out)
        }
    }
}

pub fn print(documents: &[Value], format: Format) -> Result<()> {
    print!("{}", render(documents, format)?);
    Ok(())
}
