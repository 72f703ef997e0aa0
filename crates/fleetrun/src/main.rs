//! fleetrun
//!
//! Runs one command bundle on every host of a host list, launching
//! connections at a capped rate and collecting per-host output files

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser};
use color_eyre::Result;
use fleetrun_core::{
    AggregateSinks, CoreError, CredentialContext, CredentialRequest, EffectiveUid, Engine,
    RunConfig, RunSummary,
};
use fleetrun_exec::{KeySource, PingProbe, SshOptions};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod config;
mod factory;
mod secrets;

use config::{Config, LogFormat};
use factory::DefaultTransportFactory;
use secrets::CommandSecretStore;

/// Run a command bundle across a fleet of hosts
#[derive(Parser, Debug)]
#[command(name = "fleetrun", version, about, long_about = None)]
struct Args {
    /// Remote user, authenticated with the password held in --bucket
    #[arg(short, long, required_unless_present = "sudo_root")]
    user: Option<String>,

    /// Connect as root with key authentication (must already run as root)
    #[arg(short, long, conflicts_with_all = ["user", "bucket"])]
    sudo_root: bool,

    /// Secret-store bucket holding the user's password
    #[arg(short, long, required_unless_present = "sudo_root")]
    bucket: Option<String>,

    /// Host list, one host per line, `#` starts a comment
    #[arg(short = 'H', long)]
    hosts: PathBuf,

    /// Command bundle copied to and executed on every host
    #[arg(short, long)]
    commands: PathBuf,

    /// Directory receiving `<host>.txt` result files
    #[arg(short, long)]
    output_dir: PathBuf,

    /// New connections per second; 0 or less launches without delay [default: 25]
    #[arg(short, long, allow_negative_numbers = true)]
    rate: Option<i64>,

    /// Extra transport options, e.g. "-p 2222 -o ConnectTimeout=5"
    #[arg(short = 'x', long, allow_hyphen_values = true)]
    ssh_options: Option<String>,

    /// Write an aggregate of all results to the output directory
    #[arg(short, long)]
    aggregate_file: bool,

    /// Print the aggregate of all results to stdout
    #[arg(short, long)]
    display: bool,

    /// Reachability probe timeout in seconds [default: 2]
    #[arg(long)]
    probe_timeout: Option<u64>,

    /// Configuration file (also `$FLEETRUN_CONFIG`)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    json_summary: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(config: &Config, verbose: u8) {
    let level = match verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = if verbose == 0 {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run_config(args: &Args, config: &Config) -> RunConfig {
    let mut run = RunConfig::new(&args.hosts, &args.commands, &args.output_dir);
    run.rate = args.rate.unwrap_or(config.defaults.rate);
    run.probe_timeout = Duration::from_secs(
        args.probe_timeout
            .unwrap_or(config.defaults.probe_timeout_secs),
    );
    run.aggregate = AggregateSinks {
        to_file: args.aggregate_file,
        to_console: args.display,
    };
    run.aggregate_prefix = config.defaults.aggregate_prefix.clone();
    run.remote_tmp_dir = config.defaults.remote_tmp_dir.clone();
    run
}

fn key_source(config: &Config) -> Option<KeySource> {
    config
        .defaults
        .ssh_key
        .clone()
        .map(KeySource::Path)
        .or_else(|| config.defaults.ssh_key_env.clone().map(KeySource::Env))
}

/// Load the configuration file; a bad file is a configuration error
fn load_config(path: Option<&Path>) -> Result<Config, CoreError> {
    Config::load_default(path).map_err(|e| CoreError::Config(format!("config file: {e}")))
}

fn abort(e: &CoreError) -> ExitCode {
    error!(error = %e, "run aborted");
    eprintln!("fleetrun: {e}");
    ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
}

async fn execute(args: Args, config: Config) -> Result<RunSummary, CoreError> {
    let options = args
        .ssh_options
        .as_deref()
        .or(config.defaults.ssh_options.as_deref())
        .map(SshOptions::parse)
        .transpose()
        .map_err(|e| CoreError::Config(e.to_string()))?
        .unwrap_or_default();

    let engine = Engine::new(run_config(&args, &config))?;

    let request = CredentialRequest {
        sudo_root: args.sudo_root,
        user: args.user,
        bucket: args.bucket,
    };
    let store = CommandSecretStore::new(&config.secrets.command);
    let credential = CredentialContext::resolve(&request, &store, &EffectiveUid).await?;

    let factory =
        DefaultTransportFactory::new(&credential, key_source(&config).as_ref(), options)?;

    let mut stdout = std::io::stdout();
    engine
        .run(
            credential,
            Arc::new(PingProbe::new()),
            Arc::new(factory),
            &mut stdout,
        )
        .await
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let args = Args::parse();
    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return Ok(abort(&e)),
    };
    init_tracing(&config, args.verbose);

    let json_summary = args.json_summary;

    match execute(args, config).await {
        Ok(summary) => {
            if json_summary {
                eprintln!("{}", serde_json::to_string(&summary)?);
            } else {
                eprintln!("{summary}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(abort(&e)),
    }
}
