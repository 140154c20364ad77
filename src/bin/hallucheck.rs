//! hallucheck - command-line front end for hallucination checks
//!
//! # Usage
//!
//! ```bash
//! # Answer a question and assess the answer
//! hallucheck verify "高血压可以吃什么水果？"
//!
//! # Assess an answer you already have
//! hallucheck verify "Does aspirin cause bleeding?" --answer "It can."
//!
//! # Manage the knowledge base
//! hallucheck kb add 高血压 "需要遵医嘱控制血压"
//! hallucheck kb import facts.csv
//!
//! # Inspect history and tune thresholds
//! hallucheck history list --high-risk --since 2025-01-01
//! hallucheck history report --output report.md
//! hallucheck history clear
//! hallucheck stats
//! hallucheck thresholds set --risk 0.6 --weight topic_drift=0.2
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use hallucheck_core::{
    Error, HistoryFilter, KnowledgeBase, Result, Settings, SignalKind, SqliteHistoryStore,
    VerificationResult, Verifier,
};

#[derive(Parser)]
#[command(
    name = "hallucheck",
    version,
    about = "Multi-signal hallucination detection for LLM answers"
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Settings file (JSON)
    #[arg(short, long, global = true, default_value = "hallucheck.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify one or more questions
    Verify(VerifyArgs),

    /// Knowledge base management
    #[command(subcommand)]
    Kb(KbCommand),

    /// Verification history
    #[command(subcommand)]
    History(HistoryCommand),

    /// Show aggregate statistics
    Stats,

    /// Show or change decision thresholds
    #[command(subcommand)]
    Thresholds(ThresholdsCommand),
}

#[derive(Args)]
struct VerifyArgs {
    /// Questions to verify, in order
    #[arg(required = true)]
    questions: Vec<String>,

    /// Assess this answer instead of generating one (single question only)
    #[arg(long)]
    answer: Option<String>,

    /// Print JSON instead of a summary
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum KbCommand {
    /// List all entries
    List,
    /// Add or update an entry
    Add { key: String, fact: String },
    /// Remove an entry
    Remove { key: String },
    /// Import entries from a CSV file with Key/Value columns
    Import { path: PathBuf },
    /// Export entries to a CSV file
    Export { path: PathBuf },
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// Show recent verifications, newest first
    List {
        /// Number of entries to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Only high-risk verifications
        #[arg(long, conflicts_with = "low_risk")]
        high_risk: bool,

        /// Only low-risk verifications
        #[arg(long)]
        low_risk: bool,

        /// Only verifications whose answer could not be generated
        #[arg(long)]
        failed: bool,

        /// Only verifications at or after this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_since)]
        since: Option<DateTime<Utc>>,

        /// Only verifications whose question or answer contains this text
        #[arg(long)]
        contains: Option<String>,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Write a Markdown report
    Report {
        /// Save the report here as well as printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete all verifications, keeping a timestamped copy of the database
    Clear {
        /// Delete without a backup
        #[arg(long)]
        no_backup: bool,
    },
    /// Show logged LLM calls, newest first
    Calls {
        /// Number of entries to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ThresholdsCommand {
    /// Print the current thresholds
    Show,
    /// Update thresholds and save them to the settings file
    Set {
        /// Risk threshold
        #[arg(long)]
        risk: Option<f64>,

        /// Critical reverse similarity
        #[arg(long)]
        similarity: Option<f64>,

        /// Signal weight as kind=value (repeatable)
        #[arg(long = "weight", value_parser = parse_weight)]
        weights: Vec<(SignalKind, f64)>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(Some(cli.config.as_path()))?;

    match cli.command {
        Commands::Verify(args) => verify(&settings, args).await,
        Commands::Kb(command) => knowledge(&settings, command),
        Commands::History(command) => history(&settings, command),
        Commands::Stats => {
            let store = SqliteHistoryStore::open(settings.history_path())?;
            println!("{}", serde_json::to_string_pretty(&store.stats()?)?);
            Ok(())
        }
        Commands::Thresholds(ThresholdsCommand::Show) => {
            println!("{}", serde_json::to_string_pretty(&settings.thresholds)?);
            Ok(())
        }
        Commands::Thresholds(ThresholdsCommand::Set {
            risk,
            similarity,
            weights,
        }) => {
            let shared = settings.shared_thresholds()?;
            if let Some(value) = risk {
                shared.set_risk_threshold(value)?;
            }
            if let Some(value) = similarity {
                shared.set_similarity_critical(value)?;
            }
            for (kind, value) in weights {
                shared.set_weight(kind, value)?;
            }

            settings.thresholds = shared.snapshot();
            settings.save(&cli.config)?;
            println!("{}", serde_json::to_string_pretty(&settings.thresholds)?);
            Ok(())
        }
    }
}

async fn verify(settings: &Settings, args: VerifyArgs) -> Result<()> {
    let store = Arc::new(SqliteHistoryStore::open(settings.history_path())?);
    let mut generator = settings.text_generator()?;
    if settings.llm.record_calls {
        generator = generator.with_recorder(store.clone());
    }
    let verifier = Verifier::from_settings_with_history(settings, Arc::new(generator), store)?;

    let results = match args.answer {
        Some(ref answer) => {
            if args.questions.len() != 1 {
                return Err(Error::Config(
                    "--answer requires exactly one question".to_string(),
                ));
            }
            vec![verifier.verify_answer(&args.questions[0], answer).await]
        }
        None => verifier.batch_verify(&args.questions).await,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for result in &results {
            print_summary(result);
        }
    }
    Ok(())
}

fn history(settings: &Settings, command: HistoryCommand) -> Result<()> {
    let store = SqliteHistoryStore::open(settings.history_path())?;

    match command {
        HistoryCommand::List {
            limit,
            high_risk,
            low_risk,
            failed,
            since,
            contains,
            json,
        } => {
            let mut filter = HistoryFilter::new().with_limit(limit);
            if high_risk || low_risk {
                filter = filter.with_high_risk(high_risk);
            }
            if failed {
                filter = filter.with_failed(true);
            }
            if let Some(since) = since {
                filter = filter.with_since(since);
            }
            if let Some(text) = contains {
                filter = filter.with_text(text);
            }

            let results = store.query(&filter)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for result in &results {
                    print_summary(result);
                }
            }
        }
        HistoryCommand::Report { output } => {
            let report = store.report()?;
            if let Some(path) = output {
                std::fs::write(&path, &report)?;
                eprintln!("Report saved to {}", path.display());
            }
            println!("{}", report);
        }
        HistoryCommand::Clear { no_backup } => {
            let removed = if no_backup {
                store.clear()?
            } else {
                let backup = store.backup_path(Utc::now()).ok_or_else(|| {
                    Error::HistoryStorage("History database has no file path".to_string())
                })?;
                let removed = store.clear_with_backup(&backup)?;
                println!("Backed up to {}", backup.display());
                removed
            };
            println!("Removed {} verifications", removed);
        }
        HistoryCommand::Calls { limit, json } => {
            let calls = store.api_calls(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&calls)?);
            } else {
                for call in &calls {
                    println!(
                        "{}  {}  {} ms",
                        call.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        call.model,
                        call.elapsed_ms
                    );
                    println!("  prompt:   {}", first_line(&call.prompt));
                    println!("  response: {}", first_line(&call.response));
                }
            }
        }
    }
    Ok(())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

fn knowledge(settings: &Settings, command: KbCommand) -> Result<()> {
    let path = settings.knowledge_path();
    let mut kb = KnowledgeBase::open_or_default(&path);

    match command {
        KbCommand::List => {
            for (key, fact) in kb.iter() {
                println!("{}\t{}", key, fact);
            }
            return Ok(());
        }
        KbCommand::Add { key, fact } => {
            let verb = if kb.add(key.clone(), fact) { "Added" } else { "Updated" };
            println!("{} '{}'", verb, key);
        }
        KbCommand::Remove { key } => {
            if kb.remove(&key).is_none() {
                return Err(Error::KnowledgeStore(format!("No entry for '{}'", key)));
            }
            println!("Removed '{}'", key);
        }
        KbCommand::Import { path: csv } => {
            let imported = kb.import_csv(&csv)?;
            println!("Imported {} entries ({} total)", imported, kb.len());
        }
        KbCommand::Export { path: csv } => {
            kb.export_csv(&csv)?;
            println!("Exported {} entries to {}", kb.len(), csv.display());
            return Ok(());
        }
    }

    kb.save_json(&path)
}

fn print_summary(result: &VerificationResult) {
    println!("Question:   {}", result.question);
    if let Some(ref error) = result.error {
        println!("Error:      {}", error);
    } else {
        println!("Answer:     {}", result.answer);
        if let Some(ref reverse) = result.reverse_question {
            println!("Reverse:    {} ({:.3})", reverse, result.similarity);
        }
        if let Some(score) = result.factuality_score {
            println!("Factuality: {}/10", score);
        }
        if result.knowledge_conflict {
            println!("Conflict:   {}", result.conflict_info);
        }
    }
    println!(
        "Risk:       {:.3}{}",
        result.risk_score,
        if result.is_high_risk { " HIGH" } else { "" }
    );
    println!();
}

fn parse_weight(s: &str) -> std::result::Result<(SignalKind, f64), String> {
    let (kind, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected kind=value, got '{}'", s))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid weight '{}': {}", value, e))?;
    Ok((kind.trim().parse()?, value))
}

fn parse_since(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("expected RFC 3339 or YYYY-MM-DD, got '{}'", s))
}
