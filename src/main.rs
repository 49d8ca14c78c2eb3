// ABOUTME: Entry point for the ocidrv CLI application.
// ABOUTME: Resolves configuration, connects through the chosen driver and runs one command.

mod cli;

use std::env;
use std::path::PathBuf;

use clap::Parser;
use cli::{Cli, Commands};
use ocidrv::backends;
use ocidrv::chain::ChainState;
use ocidrv::client::Client;
use ocidrv::config::Config;
use ocidrv::error::{Error, Result};
use ocidrv::types::Kind;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    backends::register_builtin();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    if let Err(e) = run(cli, &cancel).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, cancel: &CancellationToken) -> Result<()> {
    let Cli {
        config,
        driver,
        uri,
        command,
        ..
    } = cli;

    if let Commands::Drivers = command {
        for name in ocidrv::driver::drivers() {
            println!("{name}");
        }
        return Ok(());
    }

    let config = resolve_config(config, driver, uri)?;
    let client = Client::from_config(cancel, &config).await?;

    let result = match command {
        Commands::Drivers => Ok(()),
        Commands::Pull { reference } => pull(&client, cancel, &reference).await,
        Commands::Inspect { kind, id } => inspect(&client, cancel, kind, &id).await,
        Commands::Provision {
            reference,
            network,
            namespace,
            no_start,
            exec,
        } => {
            let plan = Plan {
                network,
                namespace,
                start: !no_start,
                exec,
            };
            provision(&client, cancel, &reference, &plan).await
        }
    };

    let closed = client.close().await;
    result.and(closed)
}

/// Explicit file, else discovered file, else defaults; then env vars; then flags.
fn resolve_config(
    path: Option<PathBuf>,
    driver: Option<String>,
    uri: Option<String>,
) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(&path)?,
        None => match Config::discover(&env::current_dir()?) {
            Ok(config) => config,
            Err(Error::ConfigNotFound(_)) => Config::default(),
            Err(e) => return Err(e),
        },
    };

    let mut config = config.with_env_overrides();
    if let Some(driver) = driver {
        config.driver = driver;
    }
    if let Some(uri) = uri {
        config.uri = uri;
    }
    Ok(config)
}

async fn pull(client: &Client, cancel: &CancellationToken, reference: &str) -> Result<()> {
    let id = client.pull(cancel, reference).await?.text().await?;
    println!("{id}");
    Ok(())
}

async fn inspect(
    client: &Client,
    cancel: &CancellationToken,
    kind: Kind,
    id: &str,
) -> Result<()> {
    let stat = client.inspect(cancel, kind, id).await?;
    println!("{}", String::from_utf8_lossy(&stat));
    Ok(())
}

struct Plan {
    network: bool,
    namespace: bool,
    start: bool,
    exec: Vec<String>,
}

async fn provision(
    client: &Client,
    cancel: &CancellationToken,
    reference: &str,
    plan: &Plan,
) -> Result<()> {
    let conn = client.conn().await?;
    let mut chain = conn.chain(reference);

    chain.pull_image();
    if plan.network {
        chain.new_network();
    }
    if plan.namespace {
        chain.new_namespace();
    }
    chain.new_container();
    if plan.start {
        chain.start_container();
    }
    if let Some((cmd, args)) = plan.exec.split_first() {
        chain.exec(cmd.clone(), args.iter().cloned());
    }

    let outcome = chain.commit(cancel).await;

    let provisioned = chain.provisioned();
    if let Some(image) = &provisioned.image {
        println!("image: {image}");
    }
    if let Some(network) = &provisioned.network {
        println!("network: {network}");
    }
    if let Some(namespace) = &provisioned.namespace {
        println!("namespace: {namespace}");
    }
    if let Some(container) = &provisioned.container {
        println!("container: {container}");
    }

    if let ChainState::Failed { step } = chain.state() {
        let names = chain.step_names();
        eprintln!(
            "step {} of {} ({}) failed; earlier steps were not rolled back",
            step + 1,
            names.len(),
            names.get(step).copied().unwrap_or("?")
        );
    }
    outcome
}
