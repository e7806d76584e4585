// Ragline query orchestration engine
// Main entry point for the ragline binary

use clap::Parser;
use ragline::cache::MemoryResponseCache;
use ragline::cli::{Cli, Command, ConfigAction};
use ragline::config::Config;
use ragline::embedding::HttpEmbeddingProvider;
use ragline::llm::gateway::GenerationGateway;
use ragline::llm::openrouter::OpenRouterClient;
use ragline::metrics::MetricsRegistry;
use ragline::orchestrator::{GenerationParams, Query, QueryOrchestrator, TemplatePaths};
use ragline::prompt::{FsTemplateStore, PromptAssembler};
use ragline::retrieval::qdrant::QdrantSearch;
use ragline::retrieval::ContextRetriever;
use ragline::telemetry::init_telemetry_with_level;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // CLI flag wins over the configured level
    let log_level = cli.log.as_deref().unwrap_or(&config.app.log_level);
    init_telemetry_with_level(log_level);

    match cli.command {
        Command::Ask {
            question,
            rag,
            top_k,
            score_threshold,
            session,
            show_metrics,
        } => {
            let orchestrator = build_orchestrator(&config);

            let query = Query {
                rag_id: rag,
                question,
                top_k,
                score_threshold,
                session_id: session,
                history: None,
            };

            let answer = orchestrator.answer(query).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}", answer.text);
                if !answer.chunks_used.is_empty() {
                    println!();
                    for chunk in &answer.chunks_used {
                        println!("  [{:.2}] {}", chunk.score, chunk.source);
                    }
                }
                println!();
                match &answer.model_used {
                    Some(model) => println!(
                        "model: {}{} | latency: {}ms | session: {}",
                        model,
                        if answer.used_fallback { " (fallback)" } else { "" },
                        answer.latency_ms,
                        answer.session_id
                    ),
                    None => println!(
                        "degraded answer | latency: {}ms | session: {}",
                        answer.latency_ms, answer.session_id
                    ),
                }
            }

            if show_metrics {
                let snapshot = orchestrator.metrics_snapshot();
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&snapshot)?);
                } else {
                    println!(
                        "requests: {} | errors: {} | cache hits: {} | avg latency: {:.1}ms | p95: {:.1}ms",
                        snapshot.requests_total,
                        snapshot.errors_total,
                        snapshot.cache_hits_total,
                        snapshot.avg_latency_ms,
                        snapshot.p95_latency_ms
                    );
                }
            }

            Ok(())
        }

        Command::Config { action } => match action {
            ConfigAction::Init => {
                let path = cli.config.unwrap_or_else(Config::default_path);
                Config::default().save(&path)?;
                println!("Wrote default configuration to {}", path.display());
                Ok(())
            }
            ConfigAction::Validate => {
                config.validate()?;
                println!("Configuration is valid.");
                Ok(())
            }
            ConfigAction::Show => {
                println!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            }
        },
    }
}

/// Wire the component graph from configuration.
fn build_orchestrator(config: &Config) -> QueryOrchestrator {
    let metrics = Arc::new(MetricsRegistry::standard());

    let retriever = ContextRetriever::new(Arc::new(QdrantSearch::new(
        config.qdrant.url.clone(),
        config.qdrant.api_key.clone(),
        Duration::from_secs(config.qdrant.timeout_s),
    )));

    let assembler = PromptAssembler::new(Arc::new(FsTemplateStore::new(
        config.paths.templates_dir.clone(),
    )));

    let gateway = GenerationGateway::new(
        config.model_chain(),
        Arc::new(OpenRouterClient::new(
            config.llm.base_url.clone(),
            config.llm.api_key_env.clone(),
            config.llm.referer.clone(),
        )),
        Duration::from_millis(config.llm.backoff_ms),
    );

    let embedder = Arc::new(HttpEmbeddingProvider::new(
        config.embedding.url.clone(),
        Duration::from_secs(config.embedding.timeout_s),
    ));

    let cache = config.cache.enabled.then(|| {
        Arc::new(MemoryResponseCache::new(Duration::from_secs(
            config.cache.ttl_s,
        ))) as Arc<dyn ragline::cache::ResponseCache>
    });

    QueryOrchestrator::new(
        metrics,
        retriever,
        assembler,
        gateway,
        embedder,
        cache,
        TemplatePaths::default(),
        GenerationParams {
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
        },
    )
}
