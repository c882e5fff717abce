use std::io::Read;

use anyhow::{Context, Result, bail};

const PASSWORD_ENV: &str = "MENDER_PASSWORD";

/// Resolve the login password: CLI flag takes precedence over the env var.
/// Pass `Some("-")` to read from stdin.
pub fn resolve_password_or(cli_password: Option<&str>) -> Result<String> {
    resolve_password_or_with(cli_password, |k| std::env::var(k), std::io::stdin())
}

fn resolve_password_or_with(
    cli_password: Option<&str>,
    env_var: impl Fn(&str) -> Result<String, std::env::VarError>,
    stdin: impl Read,
) -> Result<String> {
    if let Some(password) = cli_password {
        if password == "-" {
            return read_password_from_reader(stdin);
        }
        anyhow::ensure!(!password.is_empty(), "--password value must not be empty");
        return Ok(password.to_string());
    }

    match env_var(PASSWORD_ENV) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => bail!("No password given. Pass --password (or '-' for stdin) or set {PASSWORD_ENV}"),
    }
}

// Only the line terminator is stripped; passwords may carry spaces.
fn read_password_from_reader(mut reader: impl Read) -> Result<String> {
    let mut buf = String::new();
    reader
        .read_to_string(&mut buf)
        .context("failed to read password from stdin")?;
    let password = buf.trim_end_matches(['\r', '\n']).to_string();
    anyhow::ensure!(!password.is_empty(), "stdin was empty; expected a password");
    Ok(password)
}
