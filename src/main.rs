use anyhow::{bail, Context};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tianqi::{
    api::routes::build_app,
    cli::{output::Output, Cli, Commands, StoreCommands},
    protocol::{EventReceiver, RagClient},
    rag::{chunker::TextChunker, ingest::prepare_folder},
    utils::logging::init_tracing,
    AppState, TianqiConfig, TianqiConfigManager,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    let loaded = TianqiConfig::load_or_default(&cli.config);
    let level = match &loaded {
        _ if cli.verbose => "debug".to_string(),
        Ok(config) => config.server.log_level.clone(),
        Err(_) => "info".to_string(),
    };
    init_tracing(&level, cli.json_logs);

    let command = cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    });

    if let Commands::Config { validate } = command {
        return show_config(&cli.config, validate, &output);
    }

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            output.error(&format!("Failed to load {}: {}", cli.config.display(), e));
            return Err(e).context("Invalid configuration");
        }
    };

    match command {
        Commands::Serve { host, port } => serve(&cli.config, config, host, port, &output).await,
        Commands::Ingest { folder, local } => {
            let folder = folder.unwrap_or_else(|| config.rag.documents_path.clone());
            if local {
                ingest_local(&config, folder, &output).await
            } else {
                ingest_remote(&client(&config, cli.url)?, &config, folder, &output).await
            }
        }
        Commands::Chat { query, k } => {
            render_stream(client(&config, cli.url)?.chat(query, k), &output).await
        }
        Commands::Casual { content, role } => {
            render_stream(client(&config, cli.url)?.casual_chat(content, role), &output).await
        }
        Commands::Store(store) => manage_store(&client(&config, cli.url)?, store, &output).await,
        Commands::Config { .. } => Ok(()),
    }
}

fn client(config: &TianqiConfig, url: Option<String>) -> anyhow::Result<RagClient> {
    let mut client_config = config.client.clone();
    if let Some(url) = url {
        client_config.base_url = url;
    }
    Ok(RagClient::from_config(&client_config)?)
}

async fn serve(
    config_path: &Path,
    config: TianqiConfig,
    host: Option<String>,
    port: Option<u16>,
    output: &Output,
) -> anyhow::Result<()> {
    let config_manager = if config_path.exists() {
        let manager = TianqiConfigManager::new(config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?;
        if let Err(e) = manager.start_watching() {
            warn!(error = %e, "Config hot reload disabled");
        }
        manager
    } else {
        TianqiConfigManager::from_config(config)
    };
    let config_manager = Arc::new(config_manager);
    let config = config_manager.config();

    let state = AppState::from_config(Arc::clone(&config_manager))
        .await
        .context("Failed to initialise session")?;

    let addr = format!(
        "{}:{}",
        host.unwrap_or_else(|| config.server.host.clone()),
        port.unwrap_or(config.server.port)
    );
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    output.banner();
    output.kv("listening", &addr);
    output.kv("generation", state.backend.model_name());
    let retrieval = if state.retrieval.is_activated() {
        "active"
    } else {
        "inactive"
    };
    output.kv("retrieval", retrieval);
    info!(%addr, "Server listening");

    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn ingest_local(
    config: &TianqiConfig,
    folder: PathBuf,
    output: &Output,
) -> anyhow::Result<()> {
    let chunker = TextChunker::new(config.rag.chunk_size, config.rag.chunk_overlap)?;
    let prepared = prepare_folder(folder, chunker).await?;
    for skipped in &prepared.skipped {
        output.skipped(&skipped.path.display().to_string(), &skipped.message);
    }
    if prepared.chunks.is_empty() {
        output.warning("No text found to ingest");
        return Ok(());
    }

    let retrieval = tianqi::build_retrieval(config).await?;
    retrieval.activate().await?;
    let assigned = retrieval.add_texts(prepared.chunks).await?;

    output.success(&format!(
        "Stored {} chunks from {} documents in {}",
        assigned.len(),
        prepared.documents,
        retrieval.store_path().display()
    ));
    Ok(())
}

async fn ingest_remote(
    client: &RagClient,
    config: &TianqiConfig,
    folder: PathBuf,
    output: &Output,
) -> anyhow::Result<()> {
    let chunker = TextChunker::new(config.rag.chunk_size, config.rag.chunk_overlap)?;
    let prepared = client.upload_folder(folder, chunker).await?;
    for skipped in &prepared.skipped {
        output.skipped(&skipped.path.display().to_string(), &skipped.message);
    }

    if prepared.chunks.is_empty() {
        output.warning("No text found to ingest");
    } else {
        output.success(&format!(
            "Uploaded {} chunks from {} documents to {}",
            prepared.chunks.len(),
            prepared.documents,
            client.base_url()
        ));
    }
    Ok(())
}

async fn render_stream(mut events: EventReceiver, output: &Output) -> anyhow::Result<()> {
    let mut ok = true;
    while let Some(event) = events.recv().await {
        ok &= output.event(&event);
    }
    if !ok {
        bail!("Chat failed");
    }
    Ok(())
}

async fn manage_store(
    client: &RagClient,
    command: StoreCommands,
    output: &Output,
) -> anyhow::Result<()> {
    match command {
        StoreCommands::Status => {
            let health = client.health().await?;
            output.header("Vector store");
            output.kv("activated", &health.activated.to_string());
            output.kv("state", &format!("{:?}", health.store_state).to_lowercase());
            output.kv("entries", &health.entry_count.to_string());
            output.kv("embedding model", &health.embedding_model);
            output.kv("server version", &health.version);
        }
        StoreCommands::Search { query, k } => {
            let hits = client.search(query, k).await?;
            if hits.is_empty() {
                output.info("No matching entries");
            }
            for hit in hits {
                output.kv(&format!("[{}] {:.3}", hit.index, hit.score), &hit.text);
            }
        }
        StoreCommands::Delete { index } => {
            client.delete_by_index(index).await?;
            output.success(&format!("Deleted entry {}", index));
        }
        StoreCommands::Clear => {
            client.delete_all().await?;
            output.success("Vector store cleared");
        }
        StoreCommands::Update { index, text } => {
            client.update_text(index, text).await?;
            output.success(&format!("Replaced entry {}", index));
        }
        StoreCommands::Model { name } => {
            client.change_embedding_model(&name).await?;
            output.success(&format!("Embedding model switched to {}", name));
        }
    }
    Ok(())
}

fn show_config(path: &Path, validate: bool, output: &Output) -> anyhow::Result<()> {
    if validate {
        return match TianqiConfig::load(path) {
            Ok(_) => {
                output.success(&format!("{} is valid", path.display()));
                Ok(())
            }
            Err(e) => {
                output.error(&e.to_string());
                Err(e).context("Configuration is invalid")
            }
        };
    }

    let config = TianqiConfig::load_or_default(path)?;
    output.header("Configuration");
    output.kv("file", &path.display().to_string());
    output.kv("server", &config.bind_address());
    output.kv("client base_url", &config.client.base_url);
    output.kv("documents", &config.rag.documents_path.display().to_string());
    output.kv("vector store", &config.rag.vector_store_path.display().to_string());
    output.kv(
        "chunking",
        &format!("{} / {} overlap", config.rag.chunk_size, config.rag.chunk_overlap),
    );
    output.kv("top_k", &config.rag.top_k_default.to_string());
    output.kv("embedding model", config.rag.embedding.model());
    output.kv("generation provider", &config.generation.provider);
    Ok(())
}
