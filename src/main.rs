use sagecrawl::config::{self, SessionConfig};
use sagecrawl::llm::{LlmManager, ProviderKind};
use sagecrawl::search::EngineManager;
use sagecrawl::session::{SearchSession, SessionDeps};
use sagecrawl::{HttpFetcher, RetrievalFamily, StaticTextEmbedder};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

struct CliArgs {
    query: String,
    corpus_dir: Option<PathBuf>,
    max_depth: usize,
    top_k: usize,
    web_search: bool,
    provider: ProviderKind,
    model: Option<String>,
    retrieval: RetrievalFamily,
    personality: Option<String>,
    seed: Option<u64>,
}

fn print_usage() {
    eprintln!(
        "usage: sagecrawl <query> [options]\n\n\
         options:\n\
           --corpus <dir>       local document corpus to include\n\
           --depth <n>          max recursion depth (default 1)\n\
           --top-k <n>          local retrieval depth (default 3)\n\
           --no-web             skip web expansion, local corpus only\n\
           --provider <name>    ollama | openai | anthropic (default ollama)\n\
           --model <id>         override the provider's default model\n\
           --retrieval <name>   text | siglip | clip | colpali (default text)\n\
           --personality <p>    assistant personality for LLM prompts\n\
           --seed <n>           RNG seed for reproducible Monte Carlo runs"
    );
}

fn parse_args() -> Option<CliArgs> {
    let mut args = std::env::args().skip(1).peekable();
    let mut parsed = CliArgs {
        query: String::new(),
        corpus_dir: None,
        max_depth: 1,
        top_k: 3,
        web_search: true,
        provider: ProviderKind::Ollama,
        model: None,
        retrieval: RetrievalFamily::Text,
        personality: None,
        seed: None,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return None,
            "--corpus" => parsed.corpus_dir = args.next().map(PathBuf::from),
            "--depth" => {
                parsed.max_depth = args.next().and_then(|v| v.parse().ok()).unwrap_or(1);
            }
            "--top-k" => {
                parsed.top_k = args.next().and_then(|v| v.parse().ok()).unwrap_or(3);
            }
            "--no-web" => parsed.web_search = false,
            "--provider" => {
                let Some(kind) = args.next().and_then(|v| ProviderKind::parse(&v)) else {
                    eprintln!("unknown provider");
                    return None;
                };
                parsed.provider = kind;
            }
            "--model" => parsed.model = args.next(),
            "--retrieval" => {
                let Some(family) = args.next().and_then(|v| RetrievalFamily::parse(&v)) else {
                    eprintln!("unknown retrieval family");
                    return None;
                };
                parsed.retrieval = family;
            }
            "--personality" => parsed.personality = args.next(),
            "--seed" => parsed.seed = args.next().and_then(|v| v.parse().ok()),
            other if parsed.query.is_empty() && !other.starts_with('-') => {
                parsed.query = other.to_string();
            }
            other => {
                eprintln!("unrecognized argument: {}", other);
                return None;
            }
        }
    }

    if parsed.query.is_empty() {
        return None;
    }
    Some(parsed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let Some(args) = parse_args() else {
        print_usage();
        std::process::exit(2);
    };

    let config: SessionConfig = config::load_config();

    let http_client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()?;

    let embedder = StaticTextEmbedder::load(&config::model2vec_model_id()).await?;
    let llm = LlmManager::from_kind(
        http_client.clone(),
        args.provider,
        args.model.clone(),
        args.personality.clone(),
    )?;
    let engines = EngineManager::from_config(http_client.clone(), &config);
    let fetcher = HttpFetcher::new(http_client, config.web_concurrency);

    let deps = SessionDeps {
        embedder: Arc::new(embedder),
        ocr: None,
        llm: Arc::new(llm),
        engines: Arc::new(engines),
        fetcher: Arc::new(fetcher),
        family: args.retrieval,
        corpus_dir: args.corpus_dir,
        max_depth: args.max_depth,
        top_k: args.top_k,
        web_search_enabled: args.web_search,
        rng_seed: args.seed,
        progress: None,
    };

    let mut session = SearchSession::new(&args.query, config, deps).await?;
    info!("session {} created", session.query_id());

    match session.run().await {
        Ok(final_answer) => {
            let report_path = session.save_report(&final_answer)?;
            println!("{}", final_answer);
            println!("\nreport saved to: {}", report_path.display());
            Ok(())
        }
        Err(e) => {
            error!("session failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
