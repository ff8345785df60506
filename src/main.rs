//! sheetwise CLI - Ask questions about a spreadsheet in plain language.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use sheetwise::models::expand_headers;
use sheetwise::{
    Answer, Config, HealthCheckResult, HealthStatus, LlmClient, LlmOracleBinder, Session, SessionOptions, Transcript,
    TranscriptEntry, load_dataset,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_CONFIG: &str = "sheetwise.toml";

#[derive(Parser)]
#[command(name = "sheetwise")]
#[command(version)]
#[command(about = "Ask natural-language questions about spreadsheet data")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question about a spreadsheet
    Ask {
        /// Spreadsheet or CSV file
        #[arg(short, long)]
        file: PathBuf,

        /// The question
        query: String,
    },

    /// Interactive session: load once, ask many questions
    Chat {
        /// Spreadsheet or CSV file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print the chat transcript
    History,

    /// Empty the chat transcript
    ClearHistory,

    /// Validate configuration and endpoint reachability
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# sheetwise configuration file

[endpoint]
# API key (can also use the env var named by api_key_env)
# api_key = "${GOOGLE_API_KEY}"
base_url = "https://generativelanguage.googleapis.com/v1beta/openai"
api_key_env = "GOOGLE_API_KEY"
timeout_secs = 180
max_retries = 3

[model]
id = "gemini-2.5-flash"
max_tokens = 8192
temperature = 0.0

[dataset]
comment_columns = ["Comments", "RMG Comments"]
identity_column = "Employee Name"
lowercase_values = false
# sheet = "Sheet1"
max_prompt_rows = 5000

[query]
timeout_secs = 300

[glossary]
"Status" = ["Billable", "Bench", "Shadow"]
"Location" = ["Pune", "Bangalore", "Hyderabad"]

[transcript]
path = "chat_history.json"
"#;
    println!("{example}");
}

/// Load the config file; the default path may be absent.
fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
        info!("No {DEFAULT_CONFIG} found, using built-in defaults");
        return Ok(Config::default());
    }

    let config = Config::from_file(path)
        .with_context(|| format!("Failed to load config from {path:?}"))?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn build_client(config: &Config) -> Result<Arc<LlmClient>> {
    let api_key = config
        .resolve_api_key()
        .context("Failed to resolve API key")?;

    let client = LlmClient::new(
        Some(api_key),
        config.endpoint.base_url.clone(),
        expand_headers(&config.endpoint.headers),
        config.endpoint.timeout_secs,
        config.endpoint.max_retries,
    )?;
    Ok(Arc::new(client))
}

async fn open_session(config: &Config, client: &Arc<LlmClient>, file: &Path) -> Result<Session> {
    let dataset = load_dataset(file, config.dataset.sheet.as_deref())
        .with_context(|| format!("Failed to load dataset from {file:?}"))?;

    let binder = LlmOracleBinder::new(
        Arc::clone(client),
        config.model.clone(),
        config.dataset.max_prompt_rows,
    );

    let session = Session::open(dataset, &SessionOptions::from(config), &binder)
        .await
        .context("Failed to prepare dataset")?;
    Ok(session)
}

/// Run one query behind a spinner.
async fn ask_with_spinner(session: &Session, query: &str) -> sheetwise::Result<Answer> {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} [{elapsed}]") {
        spinner.set_style(style);
    }
    spinner.set_message("Processing your query...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let answer = session.ask(query).await;
    spinner.finish_and_clear();
    answer
}

/// Only a healthy endpoint passes validation.
fn ensure_healthy(health: &HealthCheckResult) -> Result<()> {
    if health.status == HealthStatus::Healthy {
        return Ok(());
    }
    bail!(
        "endpoint is {}: {}",
        health.status,
        health.error.as_deref().unwrap_or("unknown error")
    )
}

fn log_token_usage(client: &LlmClient) {
    let (input_tokens, output_tokens) = client.total_tokens();
    info!(input_tokens, output_tokens, "Token usage");
}

fn print_answer(answer: &Answer) {
    match &answer.response.table {
        Some(table) => {
            println!("\n{table}");
            if let Some(commentary) = &answer.response.commentary {
                println!("\n{commentary}");
            }
        }
        None => println!("\n{}", answer.response.display_text),
    }

    if answer.recovered {
        info!("Answer recovered from an unparseable reply; it may be incomplete");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            let client = build_client(&config)?;

            let health = client.health_check().await;
            ensure_healthy(&health)
                .with_context(|| format!("Endpoint {} failed its health check", client.base_url()))?;
            info!(
                latency_ms = health.latency_ms.unwrap_or_default(),
                "Endpoint is healthy"
            );

            info!("Configuration is valid");
            info!("  Endpoint: {}", client.base_url());
            info!("  Model: {}", config.model.id);
            info!(
                "  Comment columns: {}",
                config.dataset.comment_columns.join(", ")
            );
            info!("  Glossary columns: {}", config.glossary.len());
            info!("  Query timeout: {}s", config.query.timeout_secs);
        }

        Commands::History => {
            let config = load_config(&cli.config)?;
            let transcript = Transcript::open(&config.transcript.path)
                .context("Failed to read transcript")?;

            if transcript.is_empty() {
                println!("No chat history.");
            }
            for entry in transcript.entries() {
                println!("[{}]", entry.asked_at.format("%Y-%m-%d %H:%M:%S"));
                println!("You: {}", entry.user);
                println!("Bot: {}\n", entry.assistant);
            }
        }

        Commands::ClearHistory => {
            let config = load_config(&cli.config)?;
            let mut transcript = Transcript::open(&config.transcript.path)
                .context("Failed to read transcript")?;
            let cleared = transcript.len();
            transcript.clear().context("Failed to clear transcript")?;
            info!(cleared, "Chat history cleared");
        }

        Commands::Ask { file, query } => {
            let config = load_config(&cli.config)?;
            let mut transcript = Transcript::open(&config.transcript.path)
                .context("Failed to read transcript")?;
            let client = build_client(&config)?;
            let session = open_session(&config, &client, &file).await?;

            let answer = ask_with_spinner(&session, &query).await?;
            print_answer(&answer);
            transcript
                .append(TranscriptEntry::from(&answer))
                .context("Failed to save transcript")?;
            log_token_usage(&client);
        }

        Commands::Chat { file } => {
            let config = load_config(&cli.config)?;
            let mut transcript = Transcript::open(&config.transcript.path)
                .context("Failed to read transcript")?;
            let client = build_client(&config)?;
            let session = open_session(&config, &client, &file).await?;

            println!("Ask anything about {}. Type 'exit' to quit.", file.display());
            if !session.has_comments() {
                println!("(No comments column found; comment questions will not be answered.)");
            }

            let mut stdout = tokio::io::stdout();
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                stdout.write_all(b"\n> ").await?;
                stdout.flush().await?;

                let Some(line) = lines.next_line().await? else {
                    break;
                };
                let query = line.trim();
                if query.is_empty() {
                    continue;
                }
                if matches!(query, "exit" | "quit") {
                    break;
                }

                match ask_with_spinner(&session, query).await {
                    Ok(answer) => {
                        print_answer(&answer);
                        transcript
                            .append(TranscriptEntry::from(&answer))
                            .context("Failed to save transcript")?;
                    }
                    Err(e) => error!(error = %e, "Query failed"),
                }
            }
            log_token_usage(&client);
        }
    }

    Ok(())
}
