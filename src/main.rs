// src/main.rs

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod provisioner;
mod sys;

use crate::config::{LogFormat, ProvisionerConfig};
use crate::error::{ProvisionError, ProvisionResult};
use crate::provisioner::{OperationResult, SiteProvisioner};
use crate::sys::render::{ProxyLocation, SiteSpec};

/// Provision and tear down nginx virtual hosts on this machine.
#[derive(Parser)]
#[command(name = "site-provisioner", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print the operation result as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install, enable and verify a site
    Create {
        /// Domain to serve (ignored when --spec is given)
        domain: Option<String>,

        /// Additional server_name entries
        #[arg(long = "alias", action = clap::ArgAction::Append)]
        aliases: Vec<String>,

        /// Index files, in order
        #[arg(long, action = clap::ArgAction::Append)]
        index: Vec<String>,

        /// client_max_body_size value (e.g. 20m)
        #[arg(long)]
        max_body_size: Option<String>,

        /// Forward a path prefix upstream: PATH=URL
        #[arg(long = "proxy", value_parser = parse_proxy, action = clap::ArgAction::Append)]
        proxies: Vec<ProxyLocation>,

        /// Read the full site spec from a JSON file
        #[arg(long, conflicts_with_all = ["aliases", "index", "max_body_size", "proxies"])]
        spec: Option<PathBuf>,
    },

    /// Remove a site and confirm it is no longer served
    Delete { domain: String },

    /// Test the config and live-reload nginx
    Reload,

    /// Test the config and restart nginx
    Restart,

    /// Run the nginx syntax check
    Test,

    /// Write the base nginx configuration
    Init,

    /// Print the user nginx runs as
    User,

    /// Check that a site serves its status page
    Verify { domain: String },
}

fn parse_proxy(raw: &str) -> Result<ProxyLocation, String> {
    let (path, upstream) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected PATH=URL, got '{raw}'"))?;
    Ok(ProxyLocation {
        path: path.to_string(),
        upstream: upstream.to_string(),
    })
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn load_spec(domain: Option<String>, path: Option<PathBuf>) -> ProvisionResult<Option<SiteSpec>> {
    if let Some(path) = path {
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| crate::error::fs_err(&path, e))?;
        return Ok(Some(serde_json::from_str(&raw)?));
    }
    Ok(domain.map(SiteSpec::new))
}

async fn dispatch(provisioner: &SiteProvisioner, command: Commands) -> ProvisionResult<OperationResult> {
    match command {
        Commands::Create {
            domain,
            aliases,
            index,
            max_body_size,
            proxies,
            spec,
        } => {
            let from_file = spec.is_some();
            let mut site = load_spec(domain, spec)
                .await?
                .ok_or_else(|| ProvisionError::Config("create needs a domain or --spec".into()))?;
            if !from_file {
                site.aliases = aliases;
                if !index.is_empty() {
                    site.index = index;
                }
                site.client_max_body_size = max_body_size;
                site.proxy_locations = proxies;
            }
            provisioner.create_site(&site).await
        }
        Commands::Delete { domain } => provisioner.delete_site(&domain).await,
        Commands::Reload => provisioner.reload().await,
        Commands::Restart => provisioner.test_and_restart().await,
        Commands::Test => provisioner.test_config().await,
        Commands::Init => provisioner.init_base_config().await,
        Commands::User => {
            let user = provisioner.service_user().await;
            Ok(OperationResult::ok(user.to_string()))
        }
        Commands::Verify { domain } => provisioner.verify(&domain).await,
    }
}

fn print_result(result: &OperationResult, json: bool) {
    if json {
        match serde_json::to_string(result) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("failed to encode result: {e}"),
        }
    } else {
        println!("{}", result.message);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ProvisionerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.log_format);

    if !nix::unistd::geteuid().is_root() {
        tracing::warn!("not running as root; useradd, chown and systemctl will likely fail");
    }

    let provisioner = SiteProvisioner::new(&config);
    match dispatch(&provisioner, cli.command).await {
        Ok(result) => {
            print_result(&result, cli.json);
            if result.success { ExitCode::SUCCESS } else { ExitCode::FAILURE }
        }
        Err(e) => {
            tracing::error!(error = %e, "operation failed");
            print_result(&OperationResult::failed(e.to_string()), cli.json);
            ExitCode::FAILURE
        }
    }
}
