//! `zkvault inspect-export`: list the items in an export file.

use std::path::Path;

use crate::cli::{output, prompt_password, read_file};
use crate::errors::Result;
use crate::vault::transfer::{read_export, sealed_format};
use crate::vault::ExportFormat;

/// Guess the format of a plain export from its content and extension.
fn detect_format(path: &Path, data: &str) -> ExportFormat {
    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| ext.parse::<ExportFormat>().ok());
    by_extension.unwrap_or_else(|| {
        if data.trim_start().starts_with('[') {
            ExportFormat::Json
        } else {
            ExportFormat::Csv
        }
    })
}

/// Execute the `inspect-export` command.
pub fn execute(file: &Path, format: Option<&str>) -> Result<()> {
    let data = zeroize::Zeroizing::new(read_file(file)?);

    let sealed = sealed_format(&data);
    let format = match (format, sealed) {
        (Some(f), _) => f.parse()?,
        (None, Some(f)) => f,
        (None, None) => detect_format(file, &data),
    };

    let password = match sealed {
        Some(_) => Some(prompt_password("Export password")?),
        None => None,
    };

    let records = read_export(&data, format, password.as_ref().map(|p| p.as_bytes()))?;

    output::info(&format!(
        "{} item(s), {} format{}",
        records.len(),
        format,
        if sealed.is_some() { ", password-sealed" } else { "" }
    ));
    output::print_items_table(&records);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn detects_format_from_extension_then_content() {
        assert_eq!(detect_format(Path::new("a.csv"), "[]"), ExportFormat::Csv);
        assert_eq!(detect_format(Path::new("a.JSON"), ""), ExportFormat::Json);
        assert_eq!(detect_format(Path::new("export"), "  [ ]"), ExportFormat::Json);
        assert_eq!(detect_format(Path::new("export"), "name\nx"), ExportFormat::Csv);
    }

    #[test]
    fn inspects_a_plain_csv_export() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("items.csv");
        fs::write(&path, "type,name,password\nlogin,Bank,p@ss\n").unwrap();
        execute(&path, None).unwrap();
    }
}
