use clap::Parser;
use colored::Colorize;
use indicatif::{MultiProgress, ProgressDrawTarget};
use scoby::cancel::{self, CancelToken};
use scoby::colors::{self, ColorChoice};
use scoby::config::{self, Layout};
use scoby::executor::{EventHandler, ExecuteOptions, Executor, ExecutorEvent, InstallEnv, InstallOutcome};
use scoby::fetch::HttpFetcher;
use scoby::report::{self, Summary};
use scoby::runner::SystemRunner;
use scoby::verify::Verifier;
use scoby::{ScobyError, manifest, resolve};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "scoby")]
#[command(author, version, about = "Install Python command-line tools from JSON formulae", long_about = None)]
struct Cli {
    /// Formulae to install
    #[arg(required = true, value_name = "TARGETS")]
    targets: Vec<String>,

    /// Manifest file or directory (repeatable; defaults to $SCOBY_FORMULA_PATH or ./Formula)
    #[arg(short, long = "manifests", value_name = "PATH")]
    manifests: Vec<PathBuf>,

    /// Print the install plan without running anything
    #[arg(long)]
    dry_run: bool,

    /// Do not run post-install tests
    #[arg(long)]
    skip_tests: bool,

    /// Timeout in seconds for each external command
    #[arg(long, value_name = "SECONDS", default_value_t = config::DEFAULT_TIMEOUT.as_secs(),
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Packages to install concurrently
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    jobs: u16,

    /// Install prefix (defaults to $SCOBY_PREFIX or ~/.scoby)
    #[arg(long, value_name = "DIR")]
    prefix: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// When to use colors
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);
    colors::init_colors(cli.color);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            e.exit_code()
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32, ScobyError> {
    let manifests = if cli.manifests.is_empty() {
        config::default_manifest_paths()
    } else {
        cli.manifests.clone()
    };

    let graph = manifest::load_paths(&manifests)?;
    tracing::debug!("Loaded {} formulae and resources", graph.len());

    let plan = resolve(&graph, &cli.targets)?;

    if cli.dry_run {
        if cli.json {
            let value = serde_json::json!({
                "targets": plan.targets,
                "order": plan.order,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        } else {
            println!("Dry run mode - no packages will be installed");
            println!("Install plan ({} entries):", plan.len().to_string().bold());
            for line in report::plan_lines(&graph, &plan) {
                println!("{}", line);
            }
            if cli.verbose {
                println!();
                print!("{}", plan.render_tree(&graph));
            }
        }
        return Ok(0);
    }

    let layout = Layout::from_env(cli.prefix.clone());
    let timeout = Duration::from_secs(cli.timeout);

    let cancel = CancelToken::new();
    cancel::install_interrupt_handler(cancel.clone());

    let progress = if cli.json {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    } else {
        MultiProgress::new()
    };

    let fetcher = HttpFetcher::new()?.with_progress(progress.clone());
    let env = InstallEnv::new(layout, Arc::new(fetcher), Arc::new(SystemRunner));

    if !cli.json {
        println!(
            "Installing {} packages into {}",
            plan.len().to_string().bold(),
            env.layout.prefix.display().to_string().cyan()
        );
    }

    let on_event: Option<EventHandler> = (!cli.json).then(|| {
        let progress = progress.clone();
        let handler: EventHandler = Arc::new(move |event: &ExecutorEvent<'_>| {
            let line = match event {
                ExecutorEvent::Started { name } => format!("{} {}", "==>".blue().bold(), name.bold()),
                ExecutorEvent::Finished {
                    name,
                    outcome: InstallOutcome::Failed { stage, error },
                } => format!(
                    "  {} {} failed at {}: {}",
                    "✗".red(),
                    name.bold().red(),
                    stage,
                    error
                ),
                ExecutorEvent::Finished { .. } => return,
            };
            progress.suspend(|| println!("{}", line));
        });
        handler
    });

    let options = ExecuteOptions {
        timeout,
        jobs: usize::from(cli.jobs),
        cancel: cancel.clone(),
        on_event,
    };
    let results = Executor::new(env.clone(), options).execute(&graph, &plan).await;

    let tests = if cli.skip_tests || cancel.is_cancelled() {
        None
    } else {
        if !cli.json {
            println!("Running tests...");
        }
        Some(Verifier::new(env, timeout).verify(&graph, &results).await)
    };

    let summary = Summary::new(&graph, &plan, &results, tests.as_ref());
    if cli.json {
        println!("{}", summary.to_json()?);
    } else {
        summary.print();
    }

    Ok(summary.exit_code())
}
