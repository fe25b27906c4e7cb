//! `sheet-fetch` command line entry point.

// std
use std::{path::PathBuf, time::Duration};
// crates.io
use clap::{Args, Parser, Subcommand};
use color_eyre::{Result, eyre::eyre};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
// self
use drive_sheet_fetcher::{
	auth::{ClientId, TenantId, TokenSecret},
	config::{self, EnvVar, FetchConfig},
	drive::DriveClient,
	error::{AuthError, ConfigError, render_chain},
	fetcher::Fetcher,
	flows::{ClientRegistration, DEFAULT_MAX_ATTEMPTS, DevicePoller, TokenBroker},
	http::{ContentHttpClient, DEFAULT_REQUEST_TIMEOUT},
	store::{ArtifactStore, FileArtifactStore},
};

#[derive(Debug, Parser)]
#[command(name = "sheet-fetch", version, about = "Fetch one spreadsheet from a remote drive.")]
struct Cli {
	/// Raise log verbosity (`-v` debug, `-vv` trace); overrides `RUST_LOG`.
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	verbose: u8,
	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Download the spreadsheet through the first strategy that works (default).
	Fetch(FetchArgs),
	/// Mint a delegated refresh token through the device-code sign-in.
	Setup(SetupArgs),
}

#[derive(Debug, Default, Args)]
struct FetchArgs {
	/// Directory receiving the output file.
	#[arg(long)]
	output_dir: Option<PathBuf>,
	/// Target file name on the drive and on disk.
	#[arg(long)]
	file_name: Option<String>,
	/// Exit successfully when every strategy fails but a previous output file exists.
	#[arg(long)]
	allow_stale: bool,
}

#[derive(Debug, Args)]
struct SetupArgs {
	/// Directory (tenant) identifier.
	#[arg(long, env = EnvVar::TENANT_ID)]
	tenant: Option<String>,
	/// Application (client) identifier.
	#[arg(long, env = EnvVar::CLIENT_ID)]
	client_id: Option<String>,
	/// Client secret for confidential registrations.
	#[arg(long, env = EnvVar::CLIENT_SECRET, hide_env_values = true)]
	client_secret: Option<String>,
	/// File receiving the `AZURE_REFRESH_TOKEN=...` line.
	#[arg(long, default_value = "azure_refresh_token.txt")]
	output: PathBuf,
	/// Seconds between polling attempts.
	#[arg(long, default_value_t = 5)]
	interval: u64,
	/// Maximum number of polling attempts.
	#[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
	max_attempts: u32,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
	color_eyre::install()?;

	// A missing `.env` file is fine; the process environment still applies.
	let dotenv = dotenvy::dotenv();
	let cli = Cli::parse();

	init_tracing(cli.verbose)?;

	if let Ok(path) = dotenv {
		info!(path = %path.display(), "Loaded environment file.");
	}

	match cli.command.unwrap_or(Command::Fetch(FetchArgs::default())) {
		Command::Fetch(args) => fetch(args).await,
		Command::Setup(args) => setup(args).await,
	}
}

fn init_tracing(verbose: u8) -> Result<()> {
	let level = match verbose {
		0 => "info",
		1 => "debug",
		_ => "trace",
	};
	let fallback = || {
		EnvFilter::try_new(format!(
			"drive_sheet_fetcher={level},sheet_fetch={level},h2=warn,hyper=warn,reqwest=warn"
		))
	};
	let filter = match EnvFilter::try_from_default_env() {
		Ok(filter) if verbose == 0 => filter,
		_ => fallback()?,
	};

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.try_init()
		.map_err(|e| eyre!("Failed to initialize logging: {e}"))
}

async fn fetch(args: FetchArgs) -> Result<()> {
	let mut config = FetchConfig::from_env()?;

	if let Some(dir) = args.output_dir {
		config = config.with_output_dir(dir);
	}
	if let Some(name) = args.file_name {
		config = config.with_file_name(name)?;
	}

	let fetcher = Fetcher::from_config(&config)?;

	match fetcher.run(&config.credentials).await {
		Ok(report) => {
			for failure in &report.failures {
				warn!(
					strategy = %failure.strategy,
					error = %render_chain(&failure.error),
					"Strategy failed before success."
				);
			}

			info!(
				strategy = %report.strategy,
				path = %report.path.display(),
				bytes = report.bytes,
				verdict = ?report.verdict,
				"Spreadsheet updated."
			);

			Ok(())
		},
		Err(e)
			if args.allow_stale
				&& e.is_stale_tolerable()
				&& config::has_previous_output(&config.output_path()) =>
		{
			warn!(
				error = %render_chain(&e),
				path = %config.output_path().display(),
				"Download failed; keeping the previously synced file."
			);

			Ok(())
		},
		Err(e) => Err(e.into()),
	}
}

async fn setup(args: SetupArgs) -> Result<()> {
	let descriptor = config::descriptor_from_env()?;
	let mut missing = Vec::new();

	if args.tenant.is_none() {
		missing.push(EnvVar::TENANT_ID);
	}
	if args.client_id.is_none() {
		missing.push(EnvVar::CLIENT_ID);
	}

	let (Some(tenant), Some(client_id)) = (args.tenant, args.client_id) else {
		return Err(ConfigError::MissingVariables { missing }.into());
	};
	let tenant = TenantId::new(tenant)?;
	let client_id = ClientId::new(client_id)?;
	let client_secret = args.client_secret.map(TokenSecret::new);
	let registration = ClientRegistration {
		tenant: &tenant,
		client_id: &client_id,
		client_secret: client_secret.as_ref(),
	};
	let broker = TokenBroker::new(descriptor.clone())?;
	let authorization = broker.start_device_authorization(registration).await?;

	match &authorization.message {
		Some(message) => println!("{message}"),
		None => println!(
			"Open {} and enter the code {} to sign in.",
			authorization.verification_uri, authorization.user_code
		),
	}
	println!("The code expires in {} minutes.", authorization.expires_in / 60);

	let poller = DevicePoller::new(Duration::from_secs(args.interval), args.max_attempts);
	let token = broker.complete_device_authorization(registration, &authorization, poller).await?;
	let refresh_token = token.refresh_token.as_ref().ok_or(AuthError::MissingRefreshToken)?;
	let drive = DriveClient::new(ContentHttpClient::new(DEFAULT_REQUEST_TIMEOUT)?, descriptor);

	match drive.list_root_children(&token).await {
		Ok(count) => info!(items = count, "Drive access confirmed."),
		Err(e) => warn!(
			error = %render_chain(&e),
			"Drive access check failed; the refresh token is saved anyway."
		),
	}

	let line = format!("{}={}\n", EnvVar::REFRESH_TOKEN, refresh_token.expose());
	let store = FileArtifactStore::new(args.output);
	#[cfg(unix)]
	let store = store.with_mode(0o600);
	let path = store.persist(line.as_bytes())?;

	println!(
		"Refresh token saved to {}. Store it as the {} secret and keep it out of version control.",
		path.display(),
		EnvVar::REFRESH_TOKEN
	);

	Ok(())
}
