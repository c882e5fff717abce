use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::{debug, info};

use crate::artifacts;
use crate::auth;
use crate::client::{self, DEFAULT_SERVER, MenderClient};
use crate::devices;
use crate::logging;
use crate::token_path;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputMode {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    name = "mender-cli",
    version,
    about = "Command line client for the Mender server"
)]
struct Cli {
    /// Root URL of the Mender server
    #[arg(long, global = true, env = "MENDER_SERVER", default_value = DEFAULT_SERVER)]
    server: String,

    /// Skip TLS certificate verification
    #[arg(short = 'k', long, global = true)]
    skip_verify: bool,

    /// Auth token file (defaults to $XDG_CACHE_HOME/mender/authtoken)
    #[arg(long, global = true, env = "MENDER_TOKEN_PATH")]
    token: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputMode::Text)]
    output: OutputMode,

    /// Log debug diagnostics to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in to the Mender server and cache the auth token
    Login {
        /// Account user name (email)
        #[arg(long)]
        username: String,
        /// Password (use '-' to read from stdin; falls back to $MENDER_PASSWORD)
        #[arg(long)]
        password: Option<String>,
    },
    /// Work with Mender Artifacts
    Artifacts {
        #[command(subcommand)]
        command: ArtifactsCommands,
    },
    /// Work with devices
    Devices {
        #[command(subcommand)]
        command: DevicesCommands,
    },
}

#[derive(Subcommand)]
enum ArtifactsCommands {
    /// List Mender Artifacts from the Mender server
    List {
        /// Artifacts list detail level [0..3]
        #[arg(
            short,
            long,
            default_value_t = 0,
            value_parser = clap::value_parser!(u8).range(0..=artifacts::MAX_DETAIL_LEVEL as i64)
        )]
        detail: u8,
    },
}

#[derive(Subcommand)]
enum DevicesCommands {
    /// List devices known to the Mender server
    List {
        /// Devices list detail level [0..1]
        #[arg(
            short,
            long,
            default_value_t = 0,
            value_parser = clap::value_parser!(u8).range(0..=devices::MAX_DETAIL_LEVEL as i64)
        )]
        detail: u8,
    },
}

/// Everything a command needs to talk to the server.
#[derive(Debug)]
struct ClientConfig {
    server: String,
    skip_verify: bool,
    token_path: PathBuf,
}

impl ClientConfig {
    fn from_cli(cli: &Cli) -> Result<Self> {
        anyhow::ensure!(!cli.server.trim().is_empty(), "no server URL configured");
        let token_path = match &cli.token {
            Some(path) if !path.as_os_str().is_empty() => path.clone(),
            _ => token_path::default_token_path()?,
        };
        debug!(server = %cli.server, token_path = %token_path.display(), "resolved configuration");
        Ok(Self {
            server: cli.server.clone(),
            skip_verify: cli.skip_verify,
            token_path,
        })
    }

    fn client(&self) -> Result<MenderClient> {
        MenderClient::new(&self.server, self.skip_verify)
    }
}

// -- helpers --

fn print_json(value: &Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to format JSON output")?;
    println!("{text}");
    Ok(())
}

fn write_stdout(
    render: impl FnOnce(&mut std::io::StdoutLock<'static>) -> std::io::Result<()>,
) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    render(&mut stdout)
        .and_then(|()| stdout.flush())
        .context("failed to write output")
}

// -- command handlers --

fn handle_login(config: &ClientConfig, username: &str, password: Option<&str>) -> Result<()> {
    let password = auth::resolve_password_or(password)?;
    let token = config.client()?.login(username, &password)?;
    client::store_token(&config.token_path, &token)?;
    info!(path = %config.token_path.display(), "login successful");
    eprintln!("Login successful.");
    Ok(())
}

fn handle_artifacts(
    config: &ClientConfig,
    command: ArtifactsCommands,
    mode: OutputMode,
) -> Result<()> {
    match command {
        ArtifactsCommands::List { detail } => {
            let token = client::load_token(&config.token_path)?;
            let result = config.client()?.list_artifacts(&token)?;
            match mode {
                OutputMode::Json => print_json(&result)?,
                OutputMode::Text => {
                    let list = artifacts::parse_list(result)?;
                    write_stdout(|out| artifacts::render(out, &list, detail))?;
                }
            }
        }
    }
    Ok(())
}

fn handle_devices(
    config: &ClientConfig,
    command: DevicesCommands,
    mode: OutputMode,
) -> Result<()> {
    match command {
        DevicesCommands::List { detail } => {
            let token = client::load_token(&config.token_path)?;
            let result = config.client()?.list_devices(&token)?;
            match mode {
                OutputMode::Json => print_json(&result)?,
                OutputMode::Text => {
                    let list = devices::parse_list(result)?;
                    write_stdout(|out| devices::render(out, &list, detail))?;
                }
            }
        }
    }
    Ok(())
}

// -- main dispatch --

/// Parse CLI arguments and execute the corresponding Mender command.
pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    logging::init(cli.verbose)?;
    let config = ClientConfig::from_cli(&cli)?;

    match cli.command {
        Commands::Login { username, password } => {
            handle_login(&config, &username, password.as_deref())
        }
        Commands::Artifacts { command } => handle_artifacts(&config, command, cli.output),
        Commands::Devices { command } => handle_devices(&config, command, cli.output),
    }
}
