use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tle_sync::catalog::SpaceTrackHttpClient;
use tle_sync::clock::{Clock, SystemClock};
use tle_sync::config::{ConfigLoader, ResolvedConfig};
use tle_sync::domain::{CatalogId, ElementSets, OwnerId, TrackedObject};
use tle_sync::error::TleError;
use tle_sync::output::{DerivationResult, JsonOutput};
use tle_sync::session::SessionManager;
use tle_sync::store::{ElementRepository, FileRepository};
use tle_sync::sync::{self, SyncOrchestrator, SyncOutcome};

#[derive(Parser)]
#[command(name = "tle-sync")]
#[command(about = "Keeps a per-owner history of two-line element sets in sync with an upstream catalog")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    store: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run one sync pass (with bounded retry) and exit")]
    Sync(SyncArgs),
    #[command(about = "Run sync passes forever on the configured interval")]
    Watch,
    #[command(about = "Start tracking an object for an owner")]
    Track(ObjectArgs),
    #[command(about = "Show the current snapshot, fetching on demand if needed")]
    Show(ObjectArgs),
    #[command(about = "Print the stored history of an object")]
    History(ObjectArgs),
    #[command(about = "Derive orbital parameters from element sets in a file (`-` for stdin)")]
    Derive(InputArgs),
    #[command(about = "Store element sets from a file (`-` for stdin) for an owner")]
    Import(ImportArgs),
}

#[derive(Args)]
struct SyncArgs {
    #[arg(long)]
    exit_on_failure: bool,
}

#[derive(Args)]
struct ObjectArgs {
    catalog_id: String,

    #[arg(long)]
    owner: String,
}

#[derive(Args)]
struct InputArgs {
    input: String,
}

#[derive(Args)]
struct ImportArgs {
    input: String,

    #[arg(long)]
    owner: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(tle) = report.downcast_ref::<TleError>() {
            return ExitCode::from(map_exit_code(tle));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &TleError) -> u8 {
    match error {
        TleError::ObjectNotFound(_) => 2,
        TleError::MissingCredentials => 2,
        TleError::SyncAbandoned { .. } => 3,
        other if other.is_upstream() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store_path = match cli.store.as_deref() {
        Some(path) => Utf8PathBuf::from(path),
        None => match &config.store_path {
            Some(path) => path.clone(),
            None => FileRepository::default_path()?,
        },
    };
    let repository = FileRepository::open(store_path)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command {
        Commands::Sync(args) => {
            let mut orchestrator = online_orchestrator(&config, repository, clock)?;
            seed_tracked(&config, orchestrator.repository())?;
            let outcome = orchestrator.run_sync();
            JsonOutput::print_outcome(&outcome).into_diagnostic()?;
            match outcome {
                SyncOutcome::Exhausted { attempts, error } if args.exit_on_failure => {
                    Err(TleError::SyncAbandoned { attempts, error }.into())
                }
                _ => Ok(()),
            }
        }
        Commands::Watch => {
            let mut orchestrator = online_orchestrator(&config, repository, clock.clone())?;
            seed_tracked(&config, orchestrator.repository())?;
            info!(interval_secs = config.interval.as_secs(), "watching catalog");
            loop {
                match orchestrator.run_sync() {
                    SyncOutcome::Completed { report, .. } => {
                        info!(objects = report.items.len(), "sync finished");
                    }
                    SyncOutcome::Exhausted { attempts, error } => {
                        error!(attempts, %error, "sync failed; waiting for next interval");
                    }
                }
                clock.sleep(config.interval);
            }
        }
        Commands::Track(args) => {
            let object = parse_object(&args)?;
            let added = repository.track(&object)?;
            if added {
                println!("tracking {object}");
            } else {
                println!("already tracking {object}");
            }
            Ok(())
        }
        Commands::Show(args) => {
            let object = parse_object(&args)?;
            let mut orchestrator = online_orchestrator(&config, repository, clock)?;
            let snapshot = orchestrator.lookup(&object)?;
            JsonOutput::print_snapshot(&snapshot).into_diagnostic()
        }
        Commands::History(args) => {
            let object = parse_object(&args)?;
            let history = repository.history(&object)?;
            JsonOutput::print_history(&history).into_diagnostic()
        }
        Commands::Derive(args) => {
            let text = read_input(&args.input)?;
            let results = ElementSets::new(&text)
                .map(|parsed| parsed.map(|elements| DerivationResult::from_elements(&elements)))
                .collect::<Result<Vec<_>, TleError>>()?;
            JsonOutput::print_derivations(&results).into_diagnostic()
        }
        Commands::Import(args) => {
            let owner = args.owner.parse::<OwnerId>()?;
            let text = read_input(&args.input)?;
            let report = sync::import(&repository, clock.as_ref(), &owner, &text);
            JsonOutput::print_report(&report).into_diagnostic()
        }
    }
}

fn online_orchestrator(
    config: &ResolvedConfig,
    repository: FileRepository,
    clock: Arc<dyn Clock>,
) -> miette::Result<SyncOrchestrator<SpaceTrackHttpClient, FileRepository>> {
    let credentials = config.credentials()?;
    let client = SpaceTrackHttpClient::new(config.base_url.clone(), config.request_timeout)?;
    let session = SessionManager::new(client, credentials, config.session, clock.clone());
    Ok(SyncOrchestrator::new(session, repository, config.sync, clock))
}

fn seed_tracked(config: &ResolvedConfig, repository: &FileRepository) -> miette::Result<()> {
    for object in &config.tracked {
        repository.track(object)?;
    }
    Ok(())
}

fn parse_object(args: &ObjectArgs) -> miette::Result<TrackedObject> {
    let catalog_id = args.catalog_id.parse::<CatalogId>()?;
    let owner_id = args.owner.parse::<OwnerId>()?;
    Ok(TrackedObject::new(catalog_id, owner_id))
}

fn read_input(input: &str) -> miette::Result<String> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .into_diagnostic()?;
        return Ok(text);
    }
    let text = std::fs::read_to_string(input)
        .map_err(|err| TleError::Filesystem(format!("read {input}: {err}")))?;
    Ok(text)
}
