mod repl;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use jarvis_core::capability::CapabilityHost;
use jarvis_core::config::JarvisCfg;
use jarvis_core::registry::catalogue::CatalogueDocument;
use jarvis_core::registry::db;
use jarvis_core::registry::derive::derive_module;
use jarvis_core::registry::{Catalogue, FunctionRegistry};
use jarvis_core::risk::RiskGate;
use jarvis_core::router::{Collaborators, LlmChatFallback, LlmFunctionResolver, Router};
use jarvis_core::rules::RuleSet;
use jarvis_core::rules::classifier::PatternClassifier;
use jarvis_llm::http::HttpProvider;
use jarvis_llm::provider::{LlmProvider, LlmRouter};
use sqlx::PgPool;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DB_CONNECT_TIMEOUT_SECS: u64 = 3;

#[derive(Parser)]
#[command(name = "jarvis")]
#[command(about = "Rule-gated intent router for in-car assistants")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive session (default)
    Repl,
    /// Route one utterance and print the reply
    Ask { text: String },
    /// Show the rules an utterance fires and the resulting disposition
    Classify { text: String },
    /// Fuzzy search the capability catalogue
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Build a catalogue module from a Rust source file
    Derive {
        file: PathBuf,
        /// Write a catalogue document here instead of printing the module
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the registry with call counters as JSON
    Schema {
        #[arg(long)]
        history: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Repl) {
        Command::Repl => {
            let (cfg, pool) = load_config().await?;
            let router = build_router(&cfg, pool)?;
            repl::run(router).await
        }
        Command::Ask { text } => {
            let (cfg, pool) = load_config().await?;
            let router = build_router(&cfg, pool)?;
            println!("{}", router.process_request(text.as_str()).await);
            Ok(())
        }
        Command::Classify { text } => {
            let (cfg, _) = load_config().await?;
            classify(&cfg, &text)
        }
        Command::Search { query, limit, threshold } => {
            let (cfg, _) = load_config().await?;
            let registry = FunctionRegistry::from_config(&cfg, CapabilityHost::with_builtins())?;
            let hits = registry.search(
                &query,
                limit.unwrap_or(cfg.search_limit),
                threshold.unwrap_or(cfg.search_threshold),
            );
            if hits.is_empty() {
                println!("no match");
            }
            for hit in hits {
                println!("{:>6.1}  {}", hit.score, hit.descriptor.search_key);
            }
            Ok(())
        }
        Command::Schema { history } => {
            let (cfg, pool) = load_config().await?;
            let registry = FunctionRegistry::from_config(&cfg, CapabilityHost::with_builtins())?;
            let mut schema = serde_json::to_value(registry.export_schema(history))?;
            // Counters from earlier sessions live only in the database.
            if let Some(pool) = pool {
                schema["persisted_stats"] = serde_json::to_value(db::fetch_all(&pool).await?)?;
            }
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
        Command::Derive { file, out } => derive(&file, out.as_deref()),
    }
}

/// Defaults, then the `jarvis_config` table when a database is reachable,
/// then `JARVIS_*` environment overrides.
async fn load_config() -> anyhow::Result<(JarvisCfg, Option<PgPool>)> {
    let pool = connect_db().await;
    let cfg = match &pool {
        Some(pool) => JarvisCfg::load(pool).await?,
        None => JarvisCfg::default(),
    };
    Ok((cfg.with_env(), pool))
}

/// `RUST_LOG` filter, JSON lines when `JARVIS_LOG_JSON` is set.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var_os("JARVIS_LOG_JSON").is_some() {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

/// Optional database. Without `DATABASE_URL`, or when it is unreachable,
/// config comes from defaults and call stats stay in memory.
async fn connect_db() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        tracing::info!("DATABASE_URL not set, running without database");
        return None;
    };
    let connect = tokio::time::timeout(
        Duration::from_secs(DB_CONNECT_TIMEOUT_SECS),
        sqlx::postgres::PgPoolOptions::new().max_connections(4).connect(&url),
    )
    .await;
    match connect {
        Ok(Ok(pool)) => match sqlx::migrate!("../../migrations").run(&pool).await {
            Ok(()) => {
                tracing::info!("database connected and migrations applied");
                Some(pool)
            }
            Err(e) => {
                tracing::warn!(error = %e, "database migration failed, running without database");
                None
            }
        },
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "failed to connect DATABASE_URL, running without database");
            None
        }
        Err(_) => {
            tracing::warn!(timeout_secs = DB_CONNECT_TIMEOUT_SECS, "database connect timed out");
            None
        }
    }
}

fn build_router(cfg: &JarvisCfg, pool: Option<PgPool>) -> anyhow::Result<Router> {
    let mut registry = FunctionRegistry::from_config(cfg, CapabilityHost::with_builtins())?;
    if let Some(pool) = pool {
        registry = registry.with_pool(pool);
    }

    // Chat prefers the main model, extraction the lite one; each fails over to the other.
    let chat_llm = failover_chain([jarvis_llm::http::from_env(), jarvis_llm::http::lite_from_env()]);
    let resolver_llm = failover_chain([jarvis_llm::http::lite_from_env(), jarvis_llm::http::from_env()]);

    let collaborators = match (chat_llm, resolver_llm) {
        (Some(chat), Some(resolver)) => {
            tracing::info!(chat = chat.name(), resolver = resolver.name(), "language model configured");
            Collaborators::new(
                Arc::new(LlmChatFallback::new(chat)),
                Arc::new(LlmFunctionResolver::new(resolver, &registry)),
            )
        }
        _ => {
            tracing::warn!("JARVIS_LLM_MODEL not set, chat and function extraction run offline");
            Collaborators::offline()
        }
    };

    Ok(Router::from_config_with_registry(cfg, Arc::new(registry), collaborators)?)
}

/// Providers in order, wrapped in an [`LlmRouter`] when there is more than one.
fn failover_chain(candidates: [Option<HttpProvider>; 2]) -> Option<Arc<dyn LlmProvider>> {
    let mut providers: Vec<Box<dyn LlmProvider>> = candidates
        .into_iter()
        .flatten()
        .map(|p| Box::new(p) as Box<dyn LlmProvider>)
        .collect();
    match providers.len() {
        0 => None,
        1 => providers.pop().map(Arc::from),
        n => {
            tracing::debug!(providers = n, "LLM failover chain");
            Some(Arc::new(LlmRouter::new(providers)))
        }
    }
}

fn classify(cfg: &JarvisCfg, text: &str) -> anyhow::Result<()> {
    let rules = RuleSet::load(&cfg.rules_path)?;
    let classifier = PatternClassifier::from_rule_set(&rules)?;
    let gate = RiskGate::new(rules.risk_table.clone());

    let fired = classifier.matches(text);
    if fired.is_empty() {
        println!("no rule fired (chat fallback)");
        return Ok(());
    }
    for rule in &fired {
        println!(
            "{:>3}  {:<24} {}  {}",
            rule.priority,
            rule.intent,
            rule.tier,
            rule.tag.as_deref().unwrap_or("-")
        );
    }
    if let Some(best) = classifier.classify(text) {
        println!("=> {} ({}) {}", best.intent, best.tier, gate.resolve(best.tier.as_str()));
    }
    Ok(())
}

/// Print the derived module, or merge it into the catalogue at `out`
/// (replacing a module of the same name).
fn derive(file: &Path, out: Option<&Path>) -> anyhow::Result<()> {
    let module = derive_module(file)?;
    let Some(path) = out else {
        println!("{}", serde_json::to_string_pretty(&module)?);
        return Ok(());
    };

    let mut doc = if path.exists() {
        Catalogue::load(path)?.to_document()
    } else {
        CatalogueDocument::default()
    };
    let functions = module.functions.len();
    doc.modules.retain(|m| m.module_name != module.module_name);
    doc.modules.push(module);
    Catalogue::from_document(doc).save(path)?;
    println!("wrote {functions} functions to {}", path.display());
    Ok(())
}
