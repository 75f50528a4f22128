use geistfabrik::cli::{Cli, Commands, ConfigAction};
use geistfabrik::config::{expand_path, Config, ConfigValidator};
use geistfabrik::embedding::{build_provider, EmbeddingComputer};
use geistfabrik::error::{GeistError, Result};
use geistfabrik::filtering::{FilterPipeline, Suggestion};
use geistfabrik::notes::Note;
use geistfabrik::query::QueryEngine;
use geistfabrik::session::Session;
use geistfabrik::storage::StorageManager;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "geistfabrik=debug"
    } else {
        "geistfabrik=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Config { action } => cmd_config(cli.config, action),
        command => {
            let config = load_config(cli.config, cli.profile)?;
            let date = cli
                .date
                .unwrap_or_else(|| chrono::Local::now().date_naive());
            let ctx = Context::open(&config, cli.notes, date)?;
            let result = dispatch(&ctx, &config, command);
            let session = ctx.engine.into_session();
            tracing::debug!("Session {} closed", session.id);
            result
        }
    }
}

/// Everything one invocation needs: storage plus an embedding-ready engine
struct Context {
    storage: StorageManager,
    engine: QueryEngine,
}

impl Context {
    fn open(config: &Config, notes_path: Option<PathBuf>, date: NaiveDate) -> Result<Self> {
        let notes_path = notes_path.ok_or_else(|| {
            GeistError::Config("No note file given; pass --notes <FILE>".to_string())
        })?;
        let notes: Vec<Note> = read_json(&notes_path)?;

        let storage = StorageManager::open(&expand_path(&config.storage.db_path)?)?;
        let provider = build_provider(&config.embedding)?;
        let computer = Arc::new(EmbeddingComputer::new(
            provider,
            Some(storage.embeddings.clone()),
            &config.embedding,
        ));

        let mut session = Session::new(date, notes);
        session.compute_embeddings(&computer)?;

        let keep: Vec<&str> = session.notes().iter().map(|n| n.path.as_str()).collect();
        match storage.embeddings.remove_missing(&keep) {
            Ok(0) => {}
            Ok(removed) => tracing::info!("Pruned {} cached embeddings for removed notes", removed),
            Err(e) => tracing::warn!("Failed to prune embedding cache: {}", e),
        }
        if let Err(e) = session.record(&storage.database) {
            tracing::warn!("Failed to record session: {}", e);
        }

        let engine = QueryEngine::new(session, computer, config.query.clone())?;
        Ok(Self { storage, engine })
    }
}

fn dispatch(ctx: &Context, config: &Config, command: Commands) -> Result<()> {
    let engine = &ctx.engine;

    match command {
        Commands::Stats { json } => {
            let graph = engine.graph_stats();
            let compute = engine.session().compute_stats().clone();
            let db = ctx.storage.database.stats()?;

            if json {
                let value = serde_json::json!({
                    "session_date": engine.session().date.to_string(),
                    "seed": engine.session().seed,
                    "graph": graph,
                    "embeddings": compute,
                    "database": {
                        "embedding_count": db.embedding_count,
                        "session_count": db.session_count,
                        "suggestion_count": db.suggestion_count,
                    },
                });
                print_json(&value)?;
            } else {
                println!("GeistFabrik Stats");
                println!("=================");
                println!("\nSession: {} (seed {})", engine.session().date, engine.session().seed);
                println!("\nNotes:          {}", graph.note_count);
                println!("Links:          {}", graph.edge_count);
                println!("Linked pairs:   {}", graph.linked_pair_count);
                println!("Orphans:        {}", graph.orphan_count);
                println!("Dangling links: {}", graph.dangling_count);
                println!(
                    "\nEmbeddings: {} cached, {} computed, {} empty, {} failed ({}ms)",
                    compute.cache_hits,
                    compute.computed,
                    compute.empty,
                    compute.failed,
                    compute.duration_ms
                );
                println!(
                    "Database:   {} embeddings, {} sessions, {} suggestions",
                    db.embedding_count, db.session_count, db.suggestion_count
                );
            }
        }
        Commands::Hubs { limit } => {
            for (note, count) in engine.hubs_with_counts(limit) {
                println!("{:>5}  {}", count, note.path);
            }
        }
        Commands::Orphans => {
            for note in engine.orphans() {
                println!("{}", note.path);
            }
        }
        Commands::Clusters { min_size } => {
            let min_size = min_size.unwrap_or(config.query.cluster_min_size);
            let clusters = engine.get_clusters(min_size);
            if clusters.is_empty() {
                println!("No clusters of at least {} notes", min_size);
            }
            for cluster in clusters {
                println!("[{}] {} ({} notes)", cluster.cluster_id, cluster.label, cluster.len());
                for member in &cluster.members {
                    println!("    {}", member);
                }
            }
        }
        Commands::Neighbours { path, limit } => {
            if engine.get_note(&path).is_none() {
                return Err(GeistError::NoteNotFound { path });
            }
            for (note, score) in engine.neighbours_with_scores(&path, limit) {
                println!("{:.3}  {}", score, note.path);
            }
        }
        Commands::Unlinked { limit, candidates } => {
            let candidates = candidates.unwrap_or(config.query.unlinked_candidate_limit);
            for (a, b, score) in engine.unlinked_pairs(limit, candidates) {
                println!("{:.3}  {}  <->  {}", score, a.path, b.path);
            }
        }
        Commands::Filter {
            suggestions,
            record,
            json,
        } => {
            let suggestions: Vec<Suggestion> = read_json(&suggestions)?;
            let pipeline = FilterPipeline::new(config.filtering.clone())?
                .with_history(ctx.storage.history.clone());
            let outcome = pipeline.filter(engine, suggestions)?;

            if record {
                let written = FilterPipeline::record(
                    &ctx.storage.history,
                    engine.session().date,
                    &outcome.accepted,
                )?;
                tracing::info!("Recorded {} suggestions for {}", written, engine.session().date);
            }

            if json {
                print_json(&outcome)?;
            } else {
                for suggestion in &outcome.accepted {
                    println!("[{}] {}", suggestion.geist_id, suggestion.text);
                }
                println!(
                    "\n{} of {} suggestions accepted",
                    outcome.stats.output_count, outcome.stats.input_count
                );
            }
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, None)?;
            let content = toml::to_string_pretty(&config)?;
            println!("{}", content);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            ConfigValidator::validate(&config)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'geistfabrik config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    match profile {
        Some(profile) => Config::load_with_profile(&path, &profile),
        None => Config::load(&path),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| GeistError::Io {
        source: e,
        context: format!("Failed to read {:?}", path),
    })?;
    serde_json::from_str(&content).map_err(|e| GeistError::Json {
        source: e,
        context: format!("Failed to parse {:?}", path),
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| GeistError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })?;
    println!("{}", json);
    Ok(())
}
