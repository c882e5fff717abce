use std::collections::BTreeMap;
use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub const MAX_DETAIL_LEVEL: u8 = 3;

pub(crate) const SEPARATOR: &str =
    "--------------------------------------------------------------------------------";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Artifact {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub device_types_compatible: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub info: ArtifactInfo,
    pub signed: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub updates: Vec<Update>,
    #[serde(deserialize_with = "null_as_default")]
    pub artifact_provides: BTreeMap<String, Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub artifact_depends: BTreeMap<String, Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub clears_provides: Vec<String>,
    pub size: u64,
    pub modified: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ArtifactInfo {
    pub format: String,
    pub version: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Update {
    #[serde(deserialize_with = "null_as_default")]
    pub type_info: TypeInfo,
    #[serde(deserialize_with = "null_as_default")]
    pub files: Vec<UpdateFile>,
    pub meta_data: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TypeInfo {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateFile {
    pub name: String,
    pub checksum: String,
    pub size: u64,
    pub date: String,
}

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decode the body of the artifact listing endpoint.
pub fn parse_list(value: Value) -> Result<Vec<Artifact>> {
    serde_json::from_value(value).context("unexpected artifact list format")
}

/// Strings print bare, everything else as compact JSON.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(display_value).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

/// Write artifacts as text. `detail` ranges from 0 (id and name only) to
/// [`MAX_DETAIL_LEVEL`].
pub fn render(out: &mut impl Write, artifacts: &[Artifact], detail: u8) -> io::Result<()> {
    for artifact in artifacts {
        render_one(out, artifact, detail)?;
        writeln!(out, "{SEPARATOR}")?;
    }
    Ok(())
}

fn render_one(out: &mut impl Write, a: &Artifact, detail: u8) -> io::Result<()> {
    writeln!(out, "ID: {}", a.id)?;
    writeln!(out, "Name: {}", a.name)?;
    if detail == 0 {
        return Ok(());
    }

    writeln!(out, "Signed: {}", a.signed)?;
    writeln!(out, "Modified: {}", a.modified)?;
    writeln!(out, "Size: {}", a.size)?;
    writeln!(out, "Description: {}", a.description)?;
    writeln!(out, "Compatible device types:")?;
    for device_type in &a.device_types_compatible {
        writeln!(out, "  {device_type}")?;
    }
    writeln!(out, "Artifact format: {}", a.info.format)?;
    if detail == 1 {
        return Ok(());
    }

    writeln!(out, "Info:")?;
    writeln!(out, "  Format: {}", a.info.format)?;
    writeln!(out, "  Version: {}", a.info.version)?;
    writeln!(out, "Updates:")?;
    for update in &a.updates {
        writeln!(out, "  Type: {}", update.type_info.kind)?;
        writeln!(out, "  Files:")?;
        for file in &update.files {
            writeln!(out, "    Name: {}", file.name)?;
            writeln!(out, "    Checksum: {}", file.checksum)?;
            writeln!(out, "    Size: {}", file.size)?;
            writeln!(out, "    Date: {}", file.date)?;
        }
        if detail >= 3 && !update.meta_data.is_null() {
            writeln!(out, "  Metadata: {}", update.meta_data)?;
        }
    }
    if detail < 3 {
        return Ok(());
    }

    writeln!(out, "Artifact provides:")?;
    for (key, value) in &a.artifact_provides {
        writeln!(out, "  {key}: {}", display_value(value))?;
    }
    writeln!(out, "Artifact depends:")?;
    for (key, value) in &a.artifact_depends {
        writeln!(out, "  {key}: {}", display_value(value))?;
    }
    writeln!(out, "Clears provides:")?;
    for pattern in &a.clears_provides {
        writeln!(out, "  {pattern}")?;
    }
    Ok(())
}
