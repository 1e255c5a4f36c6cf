//! ossync - content-addressed directory sync

use clap::Parser;
use ossync::cli::{Cli, Commands, ConfigArgs, DirsCommand, TransferArgs};
use ossync::config::Config;
use ossync::progress::{format_size, print_summary, ConsoleSink, LogSink, ProgressSink, TransferProfile};
use ossync::storage::{CloudClient, HttpCloudClient, LocalStore};
use ossync::{Error, SyncEngine, TransferDirection};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.json);

    if let Commands::Config(args) = &cli.command {
        return handle_config_command(args);
    }

    let config = cli.common.to_config()?;
    let client = build_client(&cli, &config)?;

    tokio::select! {
        result = run(cli.command, config, client) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Received Ctrl+C, shutting down...");
            Err(Error::Cancelled.into())
        }
    }
}

fn init_tracing(verbose: u8, json: bool) {
    let filter = match verbose {
        0 => EnvFilter::new("ossync=info"),
        1 => EnvFilter::new("ossync=debug"),
        2 => EnvFilter::new("ossync=trace"),
        _ => EnvFilter::new("trace"),
    };

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    }
}

fn build_client(cli: &Cli, config: &Config) -> anyhow::Result<Arc<dyn CloudClient>> {
    if let Some(ref root) = cli.common.store {
        tracing::debug!(store = %root.display(), "Using local directory store");
        return Ok(Arc::new(LocalStore::new(
            root.clone(),
            config.namespace.clone(),
            config.account_id.clone(),
        )));
    }
    Ok(Arc::new(HttpCloudClient::new(config)?))
}

fn profile(config: &Config, args: &TransferArgs) -> TransferProfile {
    if args.boot {
        return TransferProfile::boot(config, Arc::new(LogSink));
    }
    let sink: Arc<dyn ProgressSink> = if args.progress {
        Arc::new(ConsoleSink::new())
    } else {
        Arc::new(LogSink)
    };
    TransferProfile::interactive(config, sink)
}

async fn run(command: Commands, config: Config, client: Arc<dyn CloudClient>) -> anyhow::Result<()> {
    match command {
        Commands::Download(args) => {
            let profile = profile(&config, &args);
            let engine = SyncEngine::new(config, client);
            tracing::info!(local = %args.local.display(), remote = %args.remote, "Starting download");

            let start = Instant::now();
            let stats = engine.download(&args.local, &args.remote, &profile).await?;
            print_summary(TransferDirection::Download, &stats, start.elapsed().as_secs_f64());
        }

        Commands::Upload(args) => {
            let profile = profile(&config, &args.transfer);
            let engine = SyncEngine::new(config, client);
            tracing::info!(
                local = %args.transfer.local.display(),
                remote = %args.transfer.remote,
                "Starting upload"
            );

            let start = Instant::now();
            let stats = engine
                .upload(&args.transfer.local, &args.transfer.remote, &args.remote_device, &profile)
                .await?;
            print_summary(TransferDirection::Upload, &stats, start.elapsed().as_secs_f64());
        }

        Commands::Dirs(DirsCommand::List) => {
            let listing = client.list_sync_directories().await?;
            for dir in &listing.dirs {
                println!("{:<32} {}", dir.name, format_size(dir.size.max(0) as u64));
            }
            println!("Total: {}", format_size(listing.total_size.max(0) as u64));
        }

        Commands::Dirs(DirsCommand::Create { name }) => {
            client.create_sync_directory(&name).await?;
            println!("Created {}", name);
        }

        Commands::Dirs(DirsCommand::Remove { dir }) => {
            client.remove_sync_directory(&dir).await?;
            println!("Removed {}", dir);
        }

        Commands::Status(args) => {
            let version = client.workspace_sync_version(&args.dir).await?;
            let meta = client.workspace_sync_meta(&args.dir).await?;
            println!("Sync version: {}", version);
            println!("Asset size:   {}", format_size(meta.asset_size.max(0) as u64));
            println!("Backup size:  {}", format_size(meta.backup_size.max(0) as u64));
            if let Some(device) = meta.last_device_id {
                println!("Last device:  {}", device);
            }
        }

        Commands::Config(args) => handle_config_command(&args)?,
    }
    Ok(())
}

fn handle_config_command(args: &ConfigArgs) -> anyhow::Result<()> {
    if args.path {
        match Config::default_config_path() {
            Ok(path) => println!("{}", path.display()),
            Err(e) => eprintln!("Error: {}", e),
        }
    } else if args.init {
        let config = Config::default();
        config.save()?;
        println!(
            "Created default configuration at {}",
            Config::default_config_path()?.display()
        );
    } else {
        let config = Config::load().unwrap_or_default();
        println!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}
