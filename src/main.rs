//! Matchbook server binary

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use matchbook::api::{create_router, AppState};
use matchbook::config::{AppConfig, LogFormat};
use matchbook::encoder::{Counter, Encoder};
use matchbook::index::SignatureIndex;
use matchbook::limiter::RateLimiter;
use matchbook::query::Searcher;
use matchbook::source::RecordSource;
use matchbook::store::{create_stores, PostingStore, RecordStore};
use matchbook::template::Template;

#[derive(Parser, Debug)]
#[command(author, version, about = "Record-linkage match server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the posting and record stores.
    Prepare,
    /// Delete the posting and record stores.
    Destroy,
    /// Report which resources exist.
    Env,
    /// Stream records from the source into the record store.
    Source,
    /// Train an encoder from the source and save it to the workspace.
    Schema {
        /// Overwrite an existing encoder.
        #[arg(short, long)]
        force: bool,
    },
    /// Generate the hash template files for the saved encoder.
    Hash {
        /// Overwrite existing template files.
        #[arg(short, long)]
        force: bool,
    },
    /// Build the posting store from source + encoder + template.
    Index,
    /// Serve queries over HTTP.
    Server,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("matchbook: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = init_tracing(&config) {
        eprintln!("matchbook: {e}");
        return ExitCode::from(1);
    }

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            let config_error = e
                .downcast_ref::<matchbook::Error>()
                .is_some_and(matchbook::Error::is_config);
            ExitCode::from(if config_error { 1 } else { 2 })
        }
    }
}

#[tokio::main]
async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    match cli.command {
        Command::Prepare => prepare(&config).await,
        Command::Destroy => destroy(&config).await,
        Command::Env => env_report(&config).await,
        Command::Source => load_source(&config).await,
        Command::Schema { force } => train_schema(&config, force).await,
        Command::Hash { force } => generate_hash(&config, force).await,
        Command::Index => build_index(&config).await,
        Command::Server => serve(&config).await,
    }
}

async fn prepare(config: &AppConfig) -> anyhow::Result<()> {
    let (postings, records) = create_stores(&config.store_runtime()?)?;
    postings.create().await.context("creating posting store")?;
    records.create().await.context("creating record store")?;
    tracing::info!("stores ready");
    Ok(())
}

async fn destroy(config: &AppConfig) -> anyhow::Result<()> {
    let (postings, records) = create_stores(&config.store_runtime()?)?;
    postings.destroy().await.context("destroying posting store")?;
    records.destroy().await.context("destroying record store")?;
    tracing::info!("stores destroyed");
    Ok(())
}

async fn env_report(config: &AppConfig) -> anyhow::Result<()> {
    let (postings, records) = create_stores(&config.store_runtime()?)?;

    let disposition = |exists: bool| if exists { "exists" } else { "<does not exist>" };
    println!("posting store: {}", disposition(postings.exists().await?));
    println!("record store:  {}", disposition(records.exists().await?));
    println!(
        "encoder:       {}",
        disposition(config.workspace.encoder_path().exists())
    );
    println!(
        "hash template: {}",
        disposition(config.workspace.template_dir().exists())
    );
    Ok(())
}

async fn load_source(config: &AppConfig) -> anyhow::Result<()> {
    let source = config.source_runtime()?;
    let (_, records) = create_stores(&config.store_runtime()?)?;
    if !records.exists().await? {
        anyhow::bail!(matchbook::Error::StoreMissing("record store".into()));
    }

    let limiter = RateLimiter::start(config.limiter.record_fill);
    let (tx, mut rx) = mpsc::channel(config.indexing.channel_capacity);
    let reader = tokio::spawn(async move { source.stream(tx).await });

    let mut stored = 0u64;
    while let Some(record) = rx.recv().await {
        limiter
            .run(|| records.put(record.id, &record.attrs))
            .await?;
        stored += 1;
        if stored % 10_000 == 0 {
            tracing::info!(stored, "loading records");
        }
    }
    reader.await.context("source reader panicked")??;
    limiter.kill();

    tracing::info!(stored, "source load complete");
    Ok(())
}

async fn train_schema(config: &AppConfig, force: bool) -> anyhow::Result<()> {
    let encoder_path = config.workspace.encoder_path();
    if encoder_path.exists() && !force {
        anyhow::bail!(
            "encoder already exists at {}; use --force to overwrite",
            encoder_path.display()
        );
    }
    if config.schema.fields.is_empty() {
        anyhow::bail!(matchbook::Error::config("schema.fields must not be empty"));
    }

    let source = config.source_runtime()?;
    let (tx, mut rx) = mpsc::channel(config.indexing.channel_capacity);
    let reader = tokio::spawn(async move { source.stream(tx).await });

    let mut counter = Counter::new(config.schema.fields.clone());
    while let Some(record) = rx.recv().await {
        counter.learn(&record);
    }
    reader.await.context("source reader panicked")??;

    let learned = counter.records();
    let encoder = counter.freeze();
    if let Some(parent) = encoder_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    encoder.save(&encoder_path)?;
    tracing::info!(
        records = learned,
        dimension = encoder.dimension(),
        path = %encoder_path.display(),
        "encoder frozen"
    );
    Ok(())
}

async fn generate_hash(config: &AppConfig, force: bool) -> anyhow::Result<()> {
    let encoder = Encoder::load(&config.workspace.encoder_path())
        .context("loading encoder; run `matchbook schema` first")?;
    let dir = config.workspace.template_dir();
    if dir.exists() && !force {
        anyhow::bail!(
            "hash template already exists at {}; use --force to overwrite",
            dir.display()
        );
    }

    let dimension = encoder.dimension();
    let bands = config.signature.bands;
    let bits = config.signature.bits;
    let seed = config.signature.seed.clone();
    tracing::info!(dimension, bands, bits, "generating hash template");

    tokio::task::spawn_blocking(move || Template::generate(&dir, dimension, bands, bits, &seed))
        .await
        .context("template generation panicked")??;
    tracing::info!("hash template created");
    Ok(())
}

async fn build_index(config: &AppConfig) -> anyhow::Result<()> {
    let encoder = Arc::new(
        Encoder::load(&config.workspace.encoder_path())
            .context("loading encoder; run `matchbook schema` first")?,
    );
    let template = Arc::new(
        Template::load(
            &config.workspace.template_dir(),
            encoder.dimension(),
            config.signature.bands,
            config.signature.bits,
        )
        .context("loading hash template; run `matchbook hash` first")?,
    );

    let (postings, _) = create_stores(&config.store_runtime()?)?;
    if !postings.exists().await? {
        anyhow::bail!(matchbook::Error::StoreMissing("posting store".into()));
    }

    let limiter = RateLimiter::start(config.limiter.posting_fill);
    let index = Arc::new(SignatureIndex::new(
        postings,
        limiter.clone(),
        config.indexing.flush_threshold,
    ));

    let source = config.source_runtime()?;
    let (tx, rx) = mpsc::channel(config.indexing.channel_capacity);
    let reader = tokio::spawn(async move { source.stream(tx).await });

    let rx = Arc::new(tokio::sync::Mutex::new(rx));
    let mut workers = Vec::with_capacity(config.indexing.workers);
    for _ in 0..config.indexing.workers {
        let rx = Arc::clone(&rx);
        let encoder = Arc::clone(&encoder);
        let template = Arc::clone(&template);
        let index = Arc::clone(&index);
        workers.push(tokio::spawn(async move {
            loop {
                let record = { rx.lock().await.recv().await };
                let Some(record) = record else {
                    return Ok::<(), matchbook::Error>(());
                };
                let signature = template.sign(&encoder.encode(&record));
                index.write(record.id, &signature).await?;
            }
        }));
    }

    for worker in workers {
        worker.await.context("ingestion worker panicked")??;
    }
    reader.await.context("source reader panicked")??;

    index.flush_all().await?;
    limiter.kill();
    tracing::info!("index build complete");
    Ok(())
}

async fn serve(config: &AppConfig) -> anyhow::Result<()> {
    let encoder = Arc::new(
        Encoder::load(&config.workspace.encoder_path()).context("loading encoder")?,
    );
    let template = Arc::new(
        Template::load(
            &config.workspace.template_dir(),
            encoder.dimension(),
            config.signature.bands,
            config.signature.bits,
        )
        .context("loading hash template")?,
    );

    let (postings, records) = create_stores(&config.store_runtime()?)?;
    if !postings.exists().await? {
        anyhow::bail!(matchbook::Error::StoreMissing("posting store".into()));
    }
    if !records.exists().await? {
        anyhow::bail!(matchbook::Error::StoreMissing("record store".into()));
    }

    let searcher = Arc::new(Searcher::new(encoder, template, postings, records));
    let router = create_router(AppState::new(searcher));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    tracing::info!(addr = %addr, "listening for queries");
    axum::serve(listener, router).await?;
    Ok(())
}

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.logging.level.clone()))
        .unwrap_or_else(|_| EnvFilter::new("matchbook=info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.logging.format {
        LogFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
    }
    Ok(())
}
