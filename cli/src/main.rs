use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use config::{API_KEY_ENV, PathManager, Settings, load_env_file};
use docsight_core::{
    CorpusIndex, DEFAULT_TOP_K, DispatcherConfig, DocumentParser, EnrichedCorpus, Enricher,
    ExtractionDispatcher, JsonFileParser, LlmCorpusIndex, ParseCache, SchemaRegistry,
};
use llm::{ChatModel, ClaudeProvider};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod logging;

#[derive(Parser, Debug)]
#[command(name = "docsight", author, version, about, long_about = None)]
struct Args {
    /// API key for the reasoning backend
    #[arg(long, env = API_KEY_ENV, hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Custom base URL for the Claude API (e.g., for proxy)
    #[arg(long, env = "CLAUDE_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Model name, overrides settings
    #[arg(long, global = true)]
    model: Option<String>,

    /// Settings file to use instead of the default location
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Keep logs, cache and config under this directory
    #[arg(long, env = "DOCSIGHT_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Log to stderr instead of the log file
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Describe every image of a parsed document
    Enrich {
        /// Parser output: {"pages": [...], "images": [...]}
        #[arg(long)]
        parsed: PathBuf,

        /// Where to write the enriched corpus
        #[arg(long, default_value = "corpus.json")]
        out: PathBuf,

        /// Images in flight at once, overrides settings
        #[arg(long)]
        concurrency: Option<usize>,

        /// Read the parsed document directly, bypassing the parse cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Ask a question about an enriched corpus
    Query {
        #[arg(long)]
        corpus: PathBuf,

        /// Records shown to the model per question
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        question: String,
    },
    /// Print the extraction schemas as tool definitions
    Schemas,
    /// Write the default settings file if none exists
    InitSettings,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    let args = Args::parse();
    if let Some(dir) = &args.data_dir {
        PathManager::set_data_dir(dir.clone());
    }
    if let Err(e) = PathManager::ensure_dirs_exist() {
        eprintln!("[docsight] Failed to create application directories: {}", e);
    }
    let _log_guard = logging::init_logging(args.verbose);

    match &args.command {
        Command::Enrich {
            parsed,
            out,
            concurrency,
            no_cache,
        } => {
            let mut settings = load_settings(&args)?;
            if let Some(concurrency) = concurrency {
                settings.enrichment.concurrency = *concurrency;
            }
            let model = chat_model(&args, &settings)?;
            enrich(model, &settings, parsed, out, *no_cache).await
        }
        Command::Query {
            corpus,
            top_k,
            question,
        } => {
            let settings = load_settings(&args)?;
            let model = chat_model(&args, &settings)?;
            query(model, &settings, corpus, *top_k, question).await
        }
        Command::Schemas => print_schemas(),
        Command::InitSettings => init_settings(&args),
    }
}

/// Settings file, then command line overrides
fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = match &args.settings {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    if let Some(model) = &args.model {
        settings.backend.model = model.clone();
    }
    if let Some(base_url) = &args.base_url {
        settings.backend.base_url = base_url.clone();
    }
    Ok(settings)
}

fn chat_model(args: &Args, settings: &Settings) -> Result<Arc<dyn ChatModel + Send + Sync>> {
    let Some(api_key) = args.api_key.as_deref() else {
        bail!("No API key: set {} or pass --api-key", API_KEY_ENV);
    };
    let provider = ClaudeProvider::new(
        &settings.backend.base_url,
        api_key,
        Duration::from_secs(settings.backend.timeout_secs),
    )
    .context("Failed to create Claude provider")?;
    Ok(provider.create_chat_model(&settings.backend.model, settings.backend.max_tokens))
}

async fn enrich(
    model: Arc<dyn ChatModel + Send + Sync>,
    settings: &Settings,
    parsed: &Path,
    out: &Path,
    no_cache: bool,
) -> Result<()> {
    let document = if no_cache {
        JsonFileParser.parse(parsed).await?
    } else {
        let cache = ParseCache::default_location().context("No cache directory available")?;
        cache.get_or_parse(&JsonFileParser, parsed).await?
    };
    let pages = document.page_context()?;

    let registry = Arc::new(SchemaRegistry::research()?);
    let config = DispatcherConfig::from_settings(&settings.backend, &settings.enrichment);
    let dispatcher = Arc::new(ExtractionDispatcher::new(model, registry, config));
    let enricher = Enricher::new(dispatcher, settings.enrichment.concurrency);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, keeping finished records");
            trigger.cancel();
        }
    });

    let report = match enricher.run(&document.images, &pages, cancel).await {
        Ok(report) => report,
        Err(err) => {
            let partial = err.partial_report();
            save_corpus(&partial.corpus, out).await?;
            eprintln!(
                "kept {} records finished before the abort in {}",
                partial.produced(),
                out.display()
            );
            return Err(err.into());
        }
    };
    save_corpus(&report.corpus, out).await?;

    for skip in &report.skips {
        eprintln!("skipped {}: {}", skip.image_path.display(), skip.reason);
    }
    println!(
        "attempted {} of {} images, produced {} records, skipped {}{}",
        report.attempted,
        report.total,
        report.produced(),
        report.skipped(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
    println!("corpus written to {}", out.display());
    Ok(())
}

async fn save_corpus(corpus: &EnrichedCorpus, out: &Path) -> Result<()> {
    corpus
        .save(out)
        .await
        .with_context(|| format!("Failed to write corpus to {}", out.display()))
}

async fn query(
    model: Arc<dyn ChatModel + Send + Sync>,
    settings: &Settings,
    corpus: &Path,
    top_k: usize,
    question: &str,
) -> Result<()> {
    let corpus = EnrichedCorpus::load(corpus)
        .await
        .with_context(|| format!("Failed to read corpus {}", corpus.display()))?;

    let mut index = LlmCorpusIndex::new(model)
        .with_top_k(top_k)
        .with_max_tokens(settings.backend.max_tokens);
    index.index(corpus.to_index_documents()).await?;
    let answer = index.query(question).await?;
    println!("{}", answer);
    Ok(())
}

fn print_schemas() -> Result<()> {
    let registry = SchemaRegistry::research()?;
    let tools = registry.tool_definitions();
    println!("{}", serde_json::to_string_pretty(&tools)?);
    Ok(())
}

fn init_settings(args: &Args) -> Result<()> {
    let path = match &args.settings {
        Some(path) => path.clone(),
        None => PathManager::settings_path().context("No config directory available")?,
    };
    if path.exists() {
        println!("{} already exists", path.display());
        return Ok(());
    }
    Settings::default().save_to(&path)?;
    println!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_enrich_defaults() {
        let args =
            Args::try_parse_from(["docsight", "enrich", "--parsed", "paper.json"]).unwrap();
        match args.command {
            Command::Enrich {
                parsed,
                out,
                concurrency,
                no_cache,
                ..
            } => {
                assert_eq!(parsed, PathBuf::from("paper.json"));
                assert_eq!(out, PathBuf::from("corpus.json"));
                assert_eq!(concurrency, None);
                assert!(!no_cache);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "docsight",
            "query",
            "--corpus",
            "corpus.json",
            "What does figure 2 show?",
            "--model",
            "claude-haiku-4-5",
        ])
        .unwrap();
        assert_eq!(args.model.as_deref(), Some("claude-haiku-4-5"));
        assert!(matches!(
            args.command,
            Command::Query { ref question, top_k, .. }
                if question == "What does figure 2 show?" && top_k == DEFAULT_TOP_K
        ));
    }

    #[test]
    fn test_query_requires_question() {
        assert!(Args::try_parse_from(["docsight", "query", "--corpus", "c.json"]).is_err());
    }
}
