//! CLI entry point for verse-search.
//!
//! Provides commands for building the verse index and querying it.
//! Main components: Cli parser, Commands enum, and the async runtime that
//! drives the query service.

use anyhow::{Context, anyhow};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

use verse_search::display::{THEME, create_results_table, create_status_table};
use verse_search::explain::create_provider;
use verse_search::io::{ExitCode, JsonResponse, OutputFormat, ResponseMeta};
use verse_search::search::EnrichmentOptions;
use verse_search::vector::create_embedding_generator;
use verse_search::{BackendKind, IndexBuilder, QueryError, QueryService, ServiceState, Settings};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Semantic verse search
#[derive(Parser)]
#[command(
    name = "verse-search",
    version = env!("CARGO_PKG_VERSION"),
    about = "Semantic search over scripture verses",
    long_about = "Build a vector index over a verse corpus and find the verses closest in meaning to a question.",
    styles = clap_cargo_style(),
    after_help = "Examples:\n  verse-search init\n  verse-search build verse.json\n  verse-search search \"what is my duty?\" -k 5\n  verse-search verse 2 47 --json\n  verse-search answer \"what happens to the soul at death?\""
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .verse-search directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings")]
    Config,

    /// Build the index from a corpus file
    #[command(about = "Encode the corpus and publish a new index")]
    Build {
        /// Corpus JSON file (defaults to corpus_path from settings)
        corpus: Option<PathBuf>,

        /// Index backend: flat or managed (overrides config)
        #[arg(short, long)]
        backend: Option<BackendKind>,

        /// Texts per encoder call (overrides config)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Find verses closest in meaning to a query
    #[command(about = "Search verses by meaning")]
    Search {
        /// Free-text query
        query: String,

        /// Number of matches (defaults to search.default_top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Attach an explanation to every match
        #[arg(short, long)]
        explain: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the nearest verses or a given passage
    #[command(about = "Answer a question using retrieved verses as context")]
    Answer {
        /// Question to answer
        question: String,

        /// Answer from this passage instead of retrieved verses
        #[arg(long)]
        context: Option<String>,

        /// Verses retrieved as context (defaults to search.default_top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show a verse by chapter and verse number
    #[command(about = "Look up a single verse")]
    Verse {
        chapter: u32,
        verse: u32,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show index status
    #[command(about = "Display index backend, model and size")]
    Info {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

fn load_settings(config: Option<&PathBuf>) -> anyhow::Result<Settings> {
    match config {
        Some(path) => {
            let mut settings = Settings::load_from(path)
                .map_err(|e| anyhow!("{e}"))
                .with_context(|| format!("Configuration error loading from {}", path.display()))?;
            if settings.workspace_root.is_none() {
                settings.workspace_root = path
                    .parent()
                    .and_then(|dir| dir.parent())
                    .map(PathBuf::from);
            }
            Ok(settings)
        }
        None => Settings::load()
            .map_err(|e| anyhow!("{e}"))
            .context("Configuration error"),
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("{}", THEME.error_with_icon(&format!("Failed to encode JSON: {e}"))),
    }
}

/// Exit code for a failed query, using the load failure behind an
/// unavailable service when there is one.
fn query_exit_code(service: &QueryService, error: &QueryError) -> ExitCode {
    match (error, service.startup_error()) {
        (QueryError::ServiceUnavailable { .. }, Some(cause)) => {
            ExitCode::from_startup_error(cause)
        }
        _ => ExitCode::from_error(error),
    }
}

fn report_query_error(
    service: &QueryService,
    error: &QueryError,
    format: OutputFormat,
) -> ExitCode {
    let code = query_exit_code(service, error);
    if format.is_json() {
        print_json(&JsonResponse::from_error(error).with_exit_code(code));
    } else {
        eprintln!("{}", THEME.error_with_icon(&error.to_string()));
        for suggestion in error.recovery_suggestions() {
            eprintln!("  {}", THEME.apply(&THEME.dim, suggestion));
        }
    }
    code
}

fn report_error(code: ExitCode, message: &str, format: OutputFormat) -> ExitCode {
    if format.is_json() {
        print_json(&JsonResponse::error(code, message, vec![]));
    } else {
        eprintln!("{}", THEME.error_with_icon(message));
    }
    code
}

fn run_init(force: bool) -> ExitCode {
    match Settings::init_config_file(force) {
        Ok(path) => {
            println!(
                "{}",
                THEME.success_with_icon(&format!(
                    "Created configuration file at: {}",
                    path.display()
                ))
            );
            println!("Edit this file to customize your settings.");
            ExitCode::Success
        }
        Err(e) => report_error(ExitCode::ConfigError, &e.to_string(), OutputFormat::Text),
    }
}

fn run_build(
    settings: &Settings,
    corpus: Option<PathBuf>,
    backend: BackendKind,
    batch_size: usize,
    format: OutputFormat,
) -> ExitCode {
    let corpus_path = corpus.unwrap_or_else(|| settings.corpus_file());
    let index_dir = settings.index_dir();

    let generator = match create_embedding_generator(&settings.embedding) {
        Ok(generator) => generator,
        Err(e) => return report_error(ExitCode::ConfigError, &e.to_string(), format),
    };

    let builder = IndexBuilder::new(generator, backend).with_batch_size(batch_size);
    match builder.run(&corpus_path, &index_dir) {
        Ok(report) => {
            if format.is_json() {
                print_json(&JsonResponse::success(&report));
            } else {
                report.display();
            }
            ExitCode::Success
        }
        Err(e) => report_error(ExitCode::from_build_error(&e), &e.to_string(), format),
    }
}

async fn run_search(
    service: &QueryService,
    query: &str,
    top_k: usize,
    format: OutputFormat,
) -> ExitCode {
    let start = Instant::now();
    let response = match service.search(query, top_k).await {
        Ok(response) => response,
        Err(e) => return report_query_error(service, &e, format),
    };
    let code = ExitCode::from_results(&response.matches);

    if format.is_json() {
        print_json(
            &JsonResponse::success(&response)
                .with_meta(ResponseMeta::with_elapsed(start.elapsed()))
                .with_exit_code(code),
        );
    } else if response.matches.is_empty() {
        println!("{}", THEME.warning_with_icon("No verses matched"));
    } else {
        println!(
            "{} {}",
            THEME.apply(&THEME.header, "Results for"),
            THEME.apply(&THEME.reference, format!("\"{query}\""))
        );
        println!("{}", create_results_table(&response.matches));
    }
    code
}

async fn run_answer(
    service: &QueryService,
    question: &str,
    context: Option<&str>,
    top_k: usize,
    format: OutputFormat,
) -> ExitCode {
    let start = Instant::now();
    let response = match service.answer(question, context, top_k).await {
        Ok(response) => response,
        Err(e) => return report_query_error(service, &e, format),
    };
    let code = if response.answer.is_empty() {
        ExitCode::NotFound
    } else {
        ExitCode::Success
    };

    if format.is_json() {
        print_json(
            &JsonResponse::success(&response)
                .with_meta(ResponseMeta::with_elapsed(start.elapsed()))
                .with_exit_code(code),
        );
        return code;
    }

    if response.answer.is_empty() {
        println!("{}", THEME.warning_with_icon("No answer found in the context"));
    } else {
        println!("{}", THEME.apply(&THEME.header, "Answer"));
        println!("{}", response.answer);
        println!(
            "{}",
            THEME.apply(&THEME.dim, format!("score: {:.2}", response.score))
        );
    }
    if !response.sources.is_empty() {
        println!();
        println!("{}", THEME.apply(&THEME.header, "Sources"));
        println!("{}", create_results_table(&response.sources));
    }
    code
}

fn run_verse(service: &QueryService, chapter: u32, verse: u32, format: OutputFormat) -> ExitCode {
    match service.verse(chapter, verse) {
        Ok(record) => {
            if format.is_json() {
                print_json(&JsonResponse::success(&record));
            } else {
                println!(
                    "{}",
                    THEME.apply(&THEME.reference, format!("{}.{}", record.chapter, record.verse))
                );
                println!("{}", record.text);
                if !record.interpretation.is_empty() {
                    println!();
                    println!("{}", THEME.apply(&THEME.dim, &record.interpretation));
                }
            }
            ExitCode::Success
        }
        Err(e) => report_query_error(service, &e, format),
    }
}

fn run_info(service: &QueryService, format: OutputFormat) -> ExitCode {
    let status = service.status();
    let code = match status.state {
        ServiceState::Ready => ExitCode::Success,
        ServiceState::Uninitialized => service
            .startup_error()
            .map_or(ExitCode::ServiceUnavailable, ExitCode::from_startup_error),
    };

    if format.is_json() {
        print_json(&JsonResponse::success(&status).with_exit_code(code));
    } else {
        println!("{}", create_status_table(&status));
    }
    code
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    // Skip the "not initialized" warning for the command that fixes it
    if cli.config.is_none() && !matches!(cli.command, Commands::Init { .. }) {
        if let Err(warning) = Settings::check_init() {
            eprintln!("{}", THEME.warning_with_icon(&warning));
            eprintln!("Using default configuration for now.");
        }
    }

    let mut settings = match load_settings(cli.config.as_ref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", THEME.error_with_icon(&format!("{e:#}")));
            return ExitCode::ConfigError.into();
        }
    };

    verse_search::logging::init(&settings.logging.level);

    let code = match cli.command {
        Commands::Init { force } => run_init(force),

        Commands::Config => match toml::to_string_pretty(&settings) {
            Ok(toml_str) => {
                println!("{}", THEME.apply(&THEME.header, "Current Configuration:"));
                println!("{}", "=".repeat(50));
                println!("{toml_str}");
                ExitCode::Success
            }
            Err(e) => report_error(ExitCode::ConfigError, &e.to_string(), OutputFormat::Text),
        },

        Commands::Build {
            corpus,
            backend,
            batch_size,
            json,
        } => run_build(
            &settings,
            corpus,
            backend.unwrap_or(settings.index.backend),
            batch_size.unwrap_or(settings.embedding.batch_size),
            OutputFormat::from_json_flag(json),
        ),

        Commands::Search {
            query,
            top_k,
            explain,
            json,
        } => {
            settings.explanation.enabled |= explain;
            let service = QueryService::from_settings(&settings);
            run_search(
                &service,
                &query,
                top_k.unwrap_or(settings.search.default_top_k),
                OutputFormat::from_json_flag(json),
            )
            .await
        }

        Commands::Answer {
            question,
            context,
            top_k,
            json,
        } => {
            settings.explanation.enabled = true;
            // A given passage is answered without loading the index
            let service = match &context {
                Some(_) => QueryService::unavailable("index not loaded for a given context")
                    .with_explainer(
                        create_provider(&settings.explanation),
                        EnrichmentOptions::from_config(&settings.explanation),
                    ),
                None => QueryService::from_settings(&settings),
            };
            run_answer(
                &service,
                &question,
                context.as_deref(),
                top_k.unwrap_or(settings.search.default_top_k),
                OutputFormat::from_json_flag(json),
            )
            .await
        }

        Commands::Verse {
            chapter,
            verse,
            json,
        } => {
            let service = QueryService::from_settings(&settings);
            run_verse(&service, chapter, verse, OutputFormat::from_json_flag(json))
        }

        Commands::Info { json } => {
            let service = QueryService::from_settings(&settings);
            run_info(&service, OutputFormat::from_json_flag(json))
        }
    };

    code.into()
}
