use std::collections::BTreeMap;
use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::artifacts::{SEPARATOR, display_value, null_as_default};

pub const MAX_DETAIL_LEVEL: u8 = 1;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Device {
    pub id: String,
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub identity_data: BTreeMap<String, Value>,
    pub created_ts: String,
    pub updated_ts: String,
    #[serde(deserialize_with = "null_as_default")]
    pub auth_sets: Vec<AuthSet>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuthSet {
    pub id: String,
    pub status: String,
    pub ts: String,
}

/// Decode the body of the device listing endpoint.
pub fn parse_list(value: Value) -> Result<Vec<Device>> {
    serde_json::from_value(value).context("unexpected device list format")
}

/// Write devices as text. Level 0 shows id and status; level 1 adds
/// identity data, timestamps and auth sets.
pub fn render(out: &mut impl Write, devices: &[Device], detail: u8) -> io::Result<()> {
    for device in devices {
        writeln!(out, "ID: {}", device.id)?;
        writeln!(out, "Status: {}", device.status)?;
        if detail >= 1 {
            writeln!(out, "Identity data:")?;
            for (key, value) in &device.identity_data {
                writeln!(out, "  {key}: {}", display_value(value))?;
            }
            writeln!(out, "Created: {}", device.created_ts)?;
            writeln!(out, "Updated: {}", device.updated_ts)?;
            writeln!(out, "Auth sets:")?;
            for set in &device.auth_sets {
                writeln!(out, "  {} ({}, {})", set.id, set.status, set.ts)?;
            }
        }
        writeln!(out, "{SEPARATOR}")?;
    }
    Ok(())
}
