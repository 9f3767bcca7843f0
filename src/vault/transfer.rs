//! Vault export and import.
//!
//! Plain exports are either a JSON array of records or a CSV file with
//! the header `type,name,username,password,url,notes,folder,favorite`.
//! A password-sealed export wraps either of those in a small JSON
//! document carrying its own salt and KDF parameters, so it opens with
//! nothing but the password:
//!
//! ```text
//! { "format": "csv", "kdf": { "algorithm": "argon2id-v1", .. },
//!   "salt": <base64>, "payload": <EncryptedPayload> }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::{generate_salt, Argon2Params, CryptoEngine, EncryptOptions, EncryptedPayload, KdfParams};
use crate::encoding::{base64_decode, base64_encode};
use crate::errors::{Result, ZkVaultError};

use super::item::{CustomField, DecryptedItem, ItemDraft, ItemFields, ItemType};

const CSV_COLUMNS: [&str; 8] = [
    "type", "name", "username", "password", "url", "notes", "folder", "favorite",
];

/// Serialization used inside an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    fn associated_data(self) -> Vec<u8> {
        format!("zkvault-export-v1:{}", self.as_str()).into_bytes()
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ZkVaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(ZkVaultError::InvalidInput(format!(
                "unknown export format '{other}' — use 'json' or 'csv'"
            ))),
        }
    }
}

/// One exported item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ExportRecord {
    #[serde(rename = "type")]
    #[zeroize(skip)]
    pub item_type: ItemType,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    #[serde(default)]
    pub favorite: bool,

    /// JSON only; CSV has no column for tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// JSON only.  A CSV export refuses items that carry any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom: Vec<CustomField>,
}

impl From<&DecryptedItem> for ExportRecord {
    fn from(item: &DecryptedItem) -> Self {
        Self {
            item_type: item.item_type,
            name: item.fields.name.clone(),
            username: item.fields.username.clone(),
            password: item.fields.password.clone(),
            url: item.fields.url.clone(),
            notes: item.fields.notes.clone(),
            folder: item.folder_id.clone(),
            favorite: item.favorite,
            tags: item.tags.clone(),
            custom: item.fields.custom.clone(),
        }
    }
}

impl ExportRecord {
    /// A draft that creates this record as a new item.
    pub fn into_draft(mut self) -> Result<ItemDraft> {
        if self.name.trim().is_empty() {
            return Err(ZkVaultError::InvalidFormat("record has an empty name".into()));
        }

        let mut fields = ItemFields::named(&self.name);
        fields.username = self.username.take();
        fields.password = self.password.take();
        fields.url = self.url.take();
        fields.notes = self.notes.take();
        fields.custom = std::mem::take(&mut self.custom);

        let mut draft = ItemDraft::new(self.item_type, fields);
        draft.folder_id = self.folder.take();
        draft.tags = std::mem::take(&mut self.tags);
        draft.favorite = self.favorite;
        Ok(draft)
    }
}

/// A password-protected export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedExport {
    pub format: ExportFormat,
    pub kdf: KdfParams,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt: Vec<u8>,

    pub payload: EncryptedPayload,
}

/// Serialize `items` and, when `password` is given, seal the result
/// under a key derived from it with a fresh salt.
pub fn export_vault(
    items: &[DecryptedItem],
    format: ExportFormat,
    password: Option<&[u8]>,
    params: &Argon2Params,
) -> Result<String> {
    if format == ExportFormat::Csv {
        if let Some(item) = items.iter().find(|i| !i.fields.custom.is_empty()) {
            return Err(ZkVaultError::InvalidInput(format!(
                "item '{}' has custom fields, which CSV cannot hold; export as JSON",
                item.fields.name
            )));
        }
    }

    let records: Vec<ExportRecord> = items.iter().map(ExportRecord::from).collect();
    let plain = Zeroizing::new(match format {
        ExportFormat::Json => format_as_json(&records)?,
        ExportFormat::Csv => format_as_csv(&records),
    });

    match password {
        None => Ok(plain.to_string()),
        Some(password) => seal(&plain, format, password, params),
    }
}

fn seal(plain: &str, format: ExportFormat, password: &[u8], params: &Argon2Params) -> Result<String> {
    if password.is_empty() {
        return Err(ZkVaultError::InvalidInput("export password cannot be empty".into()));
    }

    // One-time engine; its key is zeroed when it drops.
    let salt = generate_salt();
    let kdf = KdfParams::from(*params);
    let mut engine = CryptoEngine::new(kdf);
    engine.initialize(password, &salt)?;

    let aad = format.associated_data();
    let payload = engine.encrypt(
        plain.as_bytes(),
        EncryptOptions {
            compress: true,
            additional_data: Some(aad.as_slice()),
        },
    )?;

    let sealed = SealedExport {
        format,
        kdf,
        salt: salt.to_vec(),
        payload,
    };
    serde_json::to_string_pretty(&sealed)
        .map_err(|e| ZkVaultError::Serialization(format!("sealed export: {e}")))
}

/// The inner format if `data` is a sealed export.
pub fn sealed_format(data: &str) -> Option<ExportFormat> {
    serde_json::from_str::<SealedExport>(data).ok().map(|s| s.format)
}

/// Parse an export, unsealing it first if it is password-protected.
pub fn read_export(data: &str, format: ExportFormat, password: Option<&[u8]>) -> Result<Vec<ExportRecord>> {
    let plain = match serde_json::from_str::<SealedExport>(data) {
        Ok(sealed) => {
            let password = password.ok_or_else(|| {
                ZkVaultError::InvalidInput("this export is password-protected".into())
            })?;
            if sealed.format != format {
                return Err(ZkVaultError::InvalidFormat(format!(
                    "export contains {} but {format} was requested",
                    sealed.format
                )));
            }
            unseal(&sealed, password)?
        }
        Err(_) => {
            if password.is_some() {
                debug!("export is not sealed; ignoring password");
            }
            Zeroizing::new(data.to_string())
        }
    };

    let records = match format {
        ExportFormat::Json => serde_json::from_str::<Vec<ExportRecord>>(&plain)
            .map_err(|e| ZkVaultError::InvalidFormat(format!("JSON export: {e}")))?,
        ExportFormat::Csv => parse_csv(&plain)?,
    };

    for (n, record) in records.iter().enumerate() {
        if record.name.trim().is_empty() {
            return Err(ZkVaultError::InvalidFormat(format!(
                "record {} has an empty name",
                n + 1
            )));
        }
    }
    Ok(records)
}

fn unseal(sealed: &SealedExport, password: &[u8]) -> Result<Zeroizing<String>> {
    let mut engine = CryptoEngine::new(sealed.kdf);
    engine.initialize(password, &sealed.salt)?;

    let aad = sealed.format.associated_data();
    let bytes = engine.decrypt(&sealed.payload, Some(aad.as_slice()))?;
    let text = std::str::from_utf8(&bytes)
        .map_err(|_| ZkVaultError::InvalidFormat("sealed export is not UTF-8".into()))?;
    Ok(Zeroizing::new(text.to_string()))
}

fn format_as_json(records: &[ExportRecord]) -> Result<String> {
    serde_json::to_string_pretty(records)
        .map_err(|e| ZkVaultError::Serialization(format!("JSON export: {e}")))
}

fn format_as_csv(records: &[ExportRecord]) -> String {
    use std::fmt::Write;

    let mut out = CSV_COLUMNS.join(",");
    out.push('\n');
    for r in records {
        let row = [
            r.item_type.as_str(),
            r.name.as_str(),
            r.username.as_deref().unwrap_or_default(),
            r.password.as_deref().unwrap_or_default(),
            r.url.as_deref().unwrap_or_default(),
            r.notes.as_deref().unwrap_or_default(),
            r.folder.as_deref().unwrap_or_default(),
            if r.favorite { "true" } else { "false" },
        ];
        let line: Vec<String> = row.iter().map(|v| csv_quote(v)).collect();
        let _ = writeln!(out, "{}", line.join(","));
    }
    out
}

/// Quote a value when it contains a delimiter, quote, line break, or
/// surrounding whitespace.
fn csv_quote(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) || value.trim() != value {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Split CSV text into rows of fields.  Quoted fields may span lines.
fn split_csv(text: &str) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }
    if in_quotes {
        return Err(ZkVaultError::InvalidFormat("CSV export has an unterminated quote".into()));
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    // Blank lines carry no record.
    rows.retain(|r| !(r.len() == 1 && r[0].trim().is_empty()));
    Ok(rows)
}

fn parse_csv(text: &str) -> Result<Vec<ExportRecord>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rows = split_csv(text)?.into_iter();

    let header: Vec<String> = rows
        .next()
        .ok_or_else(|| ZkVaultError::InvalidFormat("CSV export is empty".into()))?
        .into_iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();
    let column = |name: &str| header.iter().position(|h| h == name);
    let name_col = column("name")
        .ok_or_else(|| ZkVaultError::InvalidFormat("CSV export has no 'name' column".into()))?;
    let cols = CSV_COLUMNS.map(column);

    let mut records = Vec::new();
    for (n, mut row) in rows.enumerate() {
        let mut take = |col: Option<usize>| -> Option<String> {
            col.and_then(|i| row.get_mut(i))
                .map(std::mem::take)
                .filter(|v| !v.is_empty())
        };

        let item_type = take(cols[0]).unwrap_or_default();
        let item_type = item_type
            .parse::<ItemType>()
            .map_err(|e| ZkVaultError::InvalidFormat(format!("CSV row {}: {e}", n + 2)))?;
        let favorite = take(cols[7])
            .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"));

        records.push(ExportRecord {
            item_type,
            name: take(Some(name_col)).unwrap_or_default(),
            username: take(cols[2]),
            password: take(cols[3]),
            url: take(cols[4]),
            notes: take(cols[5]),
            folder: take(cols[6]),
            favorite,
            tags: Vec::new(),
            custom: Vec::new(),
        });
        row.zeroize();
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::item::VaultItem;
    use chrono::Utc;

    fn fast() -> Argon2Params {
        Argon2Params {
            memory_kib: 8_192,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn item(name: &str, password: &str, notes: Option<&str>) -> DecryptedItem {
        let record = VaultItem {
            item_id: name.to_lowercase(),
            item_type: ItemType::Login,
            encrypted_data: crate::crypto::encrypt(&[0u8; 32], b"{}", EncryptOptions::default()).unwrap(),
            folder_id: Some("work".into()),
            tags: vec!["t1".into()],
            domain_hash: None,
            favorite: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let mut fields = ItemFields::login(name, Some("me"), password, Some("https://bank.com"));
        fields.notes = notes.map(str::to_string);
        DecryptedItem::from_parts(&record, fields)
    }

    #[test]
    fn csv_quotes_awkward_values() {
        assert_eq!(csv_quote("plain"), "plain");
        assert_eq!(csv_quote("a,b"), "\"a,b\"");
        assert_eq!(csv_quote("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_quote(" padded"), "\" padded\"");
        assert_eq!(csv_quote("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn csv_export_has_fixed_header() {
        let out = export_vault(&[item("Bank", "p@ss", None)], ExportFormat::Csv, None, &fast()).unwrap();
        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("type,name,username,password,url,notes,folder,favorite")
        );
        assert_eq!(lines.next(), Some("login,Bank,me,p@ss,https://bank.com,,work,true"));
    }

    #[test]
    fn csv_survives_commas_quotes_and_newlines() {
        let tricky = item("Bank", "p,a\"ss", Some("line one\nline two"));
        let out = export_vault(&[tricky], ExportFormat::Csv, None, &fast()).unwrap();
        let records = read_export(&out, ExportFormat::Csv, None).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].password.as_deref(), Some("p,a\"ss"));
        assert_eq!(records[0].notes.as_deref(), Some("line one\nline two"));
        assert!(records[0].favorite);
    }

    #[test]
    fn custom_fields_survive_json_and_are_refused_by_csv() {
        let mut with_pin = item("Bank", "p@ss", None);
        with_pin.fields.custom.push(CustomField {
            name: "PIN".into(),
            value: "4321".into(),
        });

        let json = export_vault(&[with_pin.clone()], ExportFormat::Json, None, &fast()).unwrap();
        let records = read_export(&json, ExportFormat::Json, None).unwrap();
        let draft = records[0].clone().into_draft().unwrap();
        assert_eq!(draft.fields.custom, with_pin.fields.custom);

        assert!(matches!(
            export_vault(&[with_pin], ExportFormat::Csv, None, &fast()),
            Err(ZkVaultError::InvalidInput(_))
        ));
    }

    #[test]
    fn csv_columns_are_matched_by_name() {
        let csv = "name,password,extra\r\nMail,hunter2,ignored\r\n\r\n";
        let records = parse_csv(csv).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].item_type, ItemType::Login);
        assert_eq!(records[0].password.as_deref(), Some("hunter2"));
        assert_eq!(records[0].username, None);
    }

    #[test]
    fn csv_without_name_column_is_rejected() {
        assert!(matches!(
            parse_csv("type,password\nlogin,x\n"),
            Err(ZkVaultError::InvalidFormat(_))
        ));
    }

    #[test]
    fn unterminated_quote_is_rejected() {
        assert!(split_csv("name\n\"open").is_err());
    }

    #[test]
    fn json_export_keeps_tags() {
        let out = export_vault(&[item("Bank", "p@ss", None)], ExportFormat::Json, None, &fast()).unwrap();
        let records = read_export(&out, ExportFormat::Json, None).unwrap();
        assert_eq!(records[0].tags, vec!["t1".to_string()]);
        assert_eq!(records[0].folder.as_deref(), Some("work"));
    }

    #[test]
    fn sealed_export_needs_the_password() {
        let out = export_vault(&[item("Bank", "p@ss", None)], ExportFormat::Json, Some(b"export-pw"), &fast())
            .unwrap();
        assert!(!out.contains("p@ss"));
        assert_eq!(sealed_format(&out), Some(ExportFormat::Json));

        assert!(matches!(
            read_export(&out, ExportFormat::Json, None),
            Err(ZkVaultError::InvalidInput(_))
        ));
        assert!(matches!(
            read_export(&out, ExportFormat::Json, Some(b"wrong")),
            Err(ZkVaultError::Authentication)
        ));
        let records = read_export(&out, ExportFormat::Json, Some(b"export-pw")).unwrap();
        assert_eq!(records[0].password.as_deref(), Some("p@ss"));
    }

    #[test]
    fn sealed_export_format_must_match() {
        let out = export_vault(&[item("Bank", "p@ss", None)], ExportFormat::Csv, Some(b"pw"), &fast()).unwrap();
        assert!(matches!(
            read_export(&out, ExportFormat::Json, Some(b"pw")),
            Err(ZkVaultError::InvalidFormat(_))
        ));
    }

    #[test]
    fn empty_export_password_is_rejected() {
        assert!(export_vault(&[], ExportFormat::Json, Some(b""), &fast()).is_err());
    }

    #[test]
    fn into_draft_carries_metadata() {
        let record = ExportRecord::from(&item("Bank", "p@ss", None));
        let draft = record.into_draft().unwrap();
        assert!(draft.item_id.is_none());
        assert_eq!(draft.fields.password.as_deref(), Some("p@ss"));
        assert_eq!(draft.folder_id.as_deref(), Some("work"));
        assert!(draft.favorite);
    }
}
