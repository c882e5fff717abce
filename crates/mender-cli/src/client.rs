use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use tracing::{debug, warn};
use ureq::tls::TlsConfig;
use ureq::{Agent, http};

use crate::token_path::create_private_dir;

pub const DEFAULT_SERVER: &str = "https://hosted.mender.io";
const LOGIN_PATH: &str = "/api/management/v1/useradm/auth/login";
const ARTIFACTS_PATH: &str = "/api/management/v1/deployments/artifacts";
const DEVICES_PATH: &str = "/api/management/v2/devauth/devices";
const TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("mender-cli/", env!("CARGO_PKG_VERSION"));
const LOGIN_HINT: &str = "please login first";

/// Client for the management APIs of a Mender server.
pub struct MenderClient {
    agent: Agent,
    server: String,
}

impl std::fmt::Debug for MenderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenderClient")
            .field("server", &self.server)
            .finish()
    }
}

impl MenderClient {
    pub fn new(server: &str, skip_verify: bool) -> Result<Self> {
        let server = server.trim().trim_end_matches('/');
        anyhow::ensure!(!server.is_empty(), "no server URL configured");
        if skip_verify {
            warn!(server, "TLS certificate verification is disabled");
        }

        let tls = TlsConfig::builder()
            .disable_verification(skip_verify)
            .build();
        let agent = Agent::config_builder()
            .timeout_global(Some(TIMEOUT))
            .http_status_as_error(false)
            .tls_config(tls)
            .build()
            .into();

        Ok(Self {
            agent,
            server: server.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server)
    }

    /// Exchange user credentials for an auth token.
    pub fn login(&self, username: &str, password: &str) -> Result<String> {
        debug!(method = "POST", path = LOGIN_PATH, username, "sending request");
        let resp = self
            .agent
            .post(&self.url(LOGIN_PATH))
            .header("Authorization", &basic_auth(username, password))
            .header("User-Agent", USER_AGENT)
            .send_empty()
            .context("request failed")?;
        let (status, text) = read_response(resp)?;
        parse_login_response(status, text).with_context(|| format!("POST {LOGIN_PATH}"))
    }

    /// Fetch the artifact list, authenticating with `token`.
    pub fn list_artifacts(&self, token: &str) -> Result<Value> {
        self.get_authorized(ARTIFACTS_PATH, token)
    }

    /// Fetch the devices known to device authentication, authenticating with `token`.
    pub fn list_devices(&self, token: &str) -> Result<Value> {
        self.get_authorized(DEVICES_PATH, token)
    }

    fn get_authorized(&self, path: &str, token: &str) -> Result<Value> {
        debug!(method = "GET", path, "sending request");
        let resp = self
            .agent
            .get(&self.url(path))
            .header("Authorization", &format!("Bearer {token}"))
            .header("User-Agent", USER_AGENT)
            .call()
            .context("request failed")?;
        let (status, text) = read_response(resp)?;
        parse_authorized_response(status, text).with_context(|| format!("GET {path}"))
    }
}

fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// Read the cached token written by a previous login.
pub fn load_token(path: &Path) -> Result<String> {
    let token = fs::read_to_string(path)
        .with_context(|| format!("failed to read auth token {}; {LOGIN_HINT}", path.display()))?;
    let token = token.trim();
    anyhow::ensure!(
        !token.is_empty(),
        "auth token {} is empty; {LOGIN_HINT}",
        path.display()
    );
    Ok(token.to_string())
}

/// Write `token` to `path`, creating owner-only parent directories.
pub fn store_token(path: &Path, token: &str) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        create_private_dir(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
    }
    let mut file = open_private(path)
        .with_context(|| format!("failed to open {} for writing", path.display()))?;
    file.write_all(token.trim().as_bytes())
        .with_context(|| format!("failed to write auth token {}", path.display()))?;
    debug!(path = %path.display(), "stored auth token");
    Ok(())
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies on creation; an existing token keeps its old bits.
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path)
}

fn read_response(mut resp: http::Response<ureq::Body>) -> Result<(u16, String)> {
    let status = resp.status().as_u16();
    let text = resp
        .body_mut()
        .read_to_string()
        .context("failed to read response body")?;
    debug!(status, "received response");
    Ok((status, text))
}

fn parse_response(status: u16, text: String) -> Result<Value> {
    if !(200..300).contains(&status) {
        return Err(api_error(status, &text));
    }
    Ok(serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text)))
}

// A rejected bearer token means the cached login is stale or missing.
fn parse_authorized_response(status: u16, text: String) -> Result<Value> {
    parse_response(status, text).map_err(|err| {
        if status == 401 {
            err.context(LOGIN_HINT)
        } else {
            err
        }
    })
}

fn parse_login_response(status: u16, text: String) -> Result<String> {
    if !(200..300).contains(&status) {
        return Err(api_error(status, &text));
    }
    let token = text.trim();
    anyhow::ensure!(!token.is_empty(), "server returned an empty token");
    Ok(token.to_string())
}

fn api_error(status: u16, text: &str) -> anyhow::Error {
    let message = serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|body| body.get("error").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| text.trim().to_string());
    anyhow::anyhow!("API error ({status}): {message}")
}
