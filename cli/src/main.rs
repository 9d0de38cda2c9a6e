//! CLI runner for the federated SPARQL query engine: loads a federation-member list and an
//! optional engine configuration, runs one query against them, and writes the solutions out in
//! the requested SPARQL results format (§6).

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use federation_core::config::{EngineConfig, FederationMembers};
use federation_core::manager::FederationManager;
use federation_core::Bindings;
use oxrdf::Variable;
use sparesults::{QueryResultsFormat, QueryResultsSerializer};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Runs a SPARQL SELECT query against a federation of SPARQL endpoints.
#[derive(Debug, Parser)]
#[command(name = "fedsparql", version, about)]
struct Cli {
    /// TOML file listing federation members (`[[member]]` tables).
    #[arg(short = 'd', long = "members", value_name = "FILE")]
    members: PathBuf,

    /// TOML file with engine tuning knobs; engine defaults are used when omitted.
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Query text given directly on the command line.
    #[arg(short = 'q', long = "query", conflicts_with = "query_file")]
    query: Option<String>,

    /// Query text read from a file.
    #[arg(short = 'Q', long = "query-file", value_name = "FILE", conflicts_with = "query")]
    query_file: Option<PathBuf>,

    /// Output format for solutions.
    #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Per-query wall-clock budget in seconds; overrides the engine config's default.
    #[arg(short = 't', long = "timeout")]
    timeout_secs: Option<u64>,

    /// Increase log verbosity (`-v`, `-vv`).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines instead of the default human-readable format.
    #[arg(long = "log-json")]
    log_json: bool,

    /// Print the rewritten execution plan to stderr before running the query (§6 `debugQueryPlan`).
    #[arg(long = "print-plan")]
    print_plan: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Xml,
    Tsv,
}

impl From<OutputFormat> for QueryResultsFormat {
    fn from(value: OutputFormat) -> Self {
        match value {
            OutputFormat::Json => QueryResultsFormat::Json,
            OutputFormat::Xml => QueryResultsFormat::Xml,
            OutputFormat::Tsv => QueryResultsFormat::Tsv,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let members = FederationMembers::load(&cli.members).with_context(|| format!("loading federation members from {}", cli.members.display()))?;
    let engine_config = match &cli.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading engine config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let query_text = match (&cli.query, &cli.query_file) {
        (Some(text), None) => text.clone(),
        (None, Some(path)) => fs::read_to_string(path).with_context(|| format!("reading query file {}", path.display()))?,
        _ => bail!("exactly one of --query or --query-file must be given"),
    };

    let timeout = Duration::from_secs(cli.timeout_secs.unwrap_or(engine_config.default_max_execution_time_secs));
    let grace_period = engine_config.shutdown_grace_period();
    let manager = FederationManager::new(engine_config);

    for member in &members.members {
        manager
            .add_member(member, None)
            .with_context(|| format!("registering federation member {}", member.id))?;
    }

    let prepared = manager.prepare_query(&query_text, timeout).context("preparing query")?;
    if cli.print_plan {
        eprintln!("{:#?}", prepared.plan());
    }
    let variables = prepared.variables().to_vec();
    let stream = manager.execute(prepared).context("executing query")?;

    let stdout = io::stdout();
    let result = write_solutions(stdout.lock(), cli.format.into(), &variables, stream);

    manager.shutdown(grace_period);
    result
}

fn write_solutions(
    writer: impl Write,
    format: QueryResultsFormat,
    variables: &[Variable],
    rows: impl Iterator<Item = Result<Bindings, federation_core::EvaluationError>>,
) -> Result<()> {
    let mut serializer = QueryResultsSerializer::from_format(format)
        .serialize_solutions_to_writer(writer, variables.to_vec())
        .context("starting result serialization")?;
    for row in rows {
        let row = row.context("evaluating query")?;
        let solution = variables.iter().filter_map(|variable| row.get(variable).map(|term| (variable.as_ref(), term.as_ref())));
        serializer.serialize(solution).context("serializing a solution row")?;
    }
    serializer.finish().context("finalizing result serialization")?;
    Ok(())
}

fn init_logging(verbose: u8, json: bool) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("fedsparql={default_level},federation_core={default_level}")));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
