use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use tessera_cli::commands::{self, Session};
use tessera_cli::config::Config;
use tessera_cli::output::OutputContext;

/// Command-line runner for Tessera query plans
#[derive(Parser)]
#[command(name = "tessera")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, env = "TESSERA_CONFIG")]
    pub config: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Output in CSV format
    #[arg(long)]
    pub csv: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a JSON plan against a JSON store
    Run(PlanArgs),
    /// Print the stage tree a plan compiles to
    Explain(PlanArgs),
}

#[derive(Args)]
pub struct PlanArgs {
    /// Plan file (JSON)
    pub plan: PathBuf,

    /// Store file (JSON); defaults to `store` from the config file
    #[arg(short, long, env = "TESSERA_STORE")]
    pub store: Option<PathBuf>,

    /// Bind a variable, e.g. `--var year=2021`
    #[arg(long = "var")]
    pub variables: Vec<String>,

    /// Attach the stage tree to the results
    #[arg(long)]
    pub trace: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "tessera=debug,tessera_core=debug,tessera_cli=debug".into())
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "tessera=warn,tessera_core=warn,tessera_cli=warn".into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cfg = Config::load(cli.config.as_deref())?;
    let output = OutputContext {
        json: cli.json,
        csv: cli.csv,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Run(args) => {
            let session = open_session(&cfg, &args)?;
            let (plan, planning) = commands::load_plan(&args.plan)?;
            let results = session.run(&plan, planning)?;
            println!("{}", output.render(&results, session.context().config())?);
            for line in output.diagnostics(&results) {
                eprintln!("{}", line);
            }
            Ok(())
        }
        Commands::Explain(args) => {
            let session = open_session(&cfg, &args)?;
            let (plan, _) = commands::load_plan(&args.plan)?;
            println!("{}", session.explain(&plan)?);
            Ok(())
        }
    }
}

fn open_session(cfg: &Config, args: &PlanArgs) -> Result<Session> {
    let store = args
        .store
        .clone()
        .or_else(|| cfg.store.clone())
        .context("no store given; pass --store or set `store` in the config file")?;
    let mut processor = cfg.processor.clone().with_env_overrides();
    if args.trace {
        processor = processor.with_trace_plan(true);
    }
    let session = Session::open(&store, processor)?;
    session.bind_variables(&args.variables)?;
    Ok(session)
}
