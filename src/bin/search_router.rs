//! CLI binary for search-router.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use search_router::gateway::USE_CACHE_PARAM;
use search_router::{Router, RouterConfig, RouterResponse, SearchParams};
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Route a search query across providers with automatic fallback.
#[derive(Parser)]
#[command(name = "search-router", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tavily API key. Overrides the configuration file.
    #[arg(long, env = "TAVILY_API_KEY", hide_env_values = true)]
    tavily_api_key: Option<String>,

    /// Jina API key. Overrides the configuration file.
    #[arg(long, env = "JINA_API_KEY", hide_env_values = true)]
    jina_api_key: Option<String>,

    /// Minimum confidence for a result to be accepted.
    #[arg(long, env = "MIN_CONFIDENCE")]
    min_confidence: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search for a query.
    Search {
        /// Query words; joined with spaces.
        #[arg(required = true)]
        query: Vec<String>,

        /// Client identifier used for rate limiting.
        #[arg(long, default_value = "cli")]
        client_id: String,

        /// Maximum number of results per provider.
        #[arg(long)]
        max_results: Option<usize>,

        /// Tavily search depth: basic or advanced.
        #[arg(long)]
        search_depth: Option<String>,

        /// Output format.
        #[arg(long, value_enum, default_value_t = Format::Markdown)]
        format: Format,

        /// Print statistics after the search.
        #[arg(long)]
        stats: bool,

        /// Skip the result cache for this search.
        #[arg(long)]
        no_cache: bool,
    },

    /// Print the health report.
    Health,

    /// Write the default configuration to a file.
    InitConfig {
        /// Destination path.
        path: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Markdown,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("search_router=info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => RouterConfig::from_file(path)?,
        None => RouterConfig::default(),
    };
    if cli.tavily_api_key.is_some() {
        config.tools.tavily_api_key = cli.tavily_api_key;
    }
    if cli.jina_api_key.is_some() {
        config.tools.jina_api_key = cli.jina_api_key;
    }
    if let Some(min_confidence) = cli.min_confidence {
        config.engine.min_confidence = min_confidence;
    }

    match cli.command {
        Command::Search {
            query,
            client_id,
            max_results,
            search_depth,
            format,
            stats,
            no_cache,
        } => {
            let router = Router::from_config(config)?;
            let mut params = SearchParams::new();
            if let Some(n) = max_results {
                params.insert("max_results".to_owned(), json!(n));
            }
            if let Some(depth) = search_depth {
                params.insert("search_depth".to_owned(), json!(depth));
            }
            if no_cache {
                params.insert(USE_CACHE_PARAM.to_owned(), json!(false));
            }

            let response = router
                .process_request(&query.join(" "), &client_id, &params)
                .await?;
            match format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&response)?),
                Format::Markdown => print!("{}", render_markdown(&response)),
            }
            if stats {
                println!("{}", serde_json::to_string_pretty(&router.statistics().await)?);
            }
            if !response.success {
                std::process::exit(1);
            }
        }
        Command::Health => {
            let router = Router::from_config(config)?;
            println!("{}", serde_json::to_string_pretty(&router.health().await)?);
        }
        Command::InitConfig { path } => {
            config.validate()?;
            // Keys passed on the command line are not written to disk.
            config.tools.tavily_api_key = None;
            config.tools.jina_api_key = None;
            config.save_to_file(&path)?;
            eprintln!("Wrote default configuration to {}", path.display());
        }
    }
    Ok(())
}

fn render_markdown(response: &RouterResponse) -> String {
    let mut out = String::from("# Search Results\n\n");
    out.push_str(&response.feedback);
    out.push_str("\n\n");

    if let Some(payload) = response.payload.as_ref().filter(|_| response.success) {
        if !payload.answer.trim().is_empty() {
            out.push_str("## Answer\n\n");
            out.push_str(&payload.answer);
            out.push_str("\n\n");
        }
        out.push_str("## Sources\n\n");
        for (i, hit) in payload.results.iter().enumerate() {
            let title = if hit.title.is_empty() { "Untitled" } else { &hit.title };
            out.push_str(&format!("### {}. {title}\n\n", i + 1));
            out.push_str(&format!("**URL:** {}\n\n", hit.url));
            if !hit.content.is_empty() {
                out.push_str(&hit.content);
                out.push_str("\n\n");
            }
        }
    }

    out.push_str(&format!(
        "---\nconfidence: {:.2} | source: {} | cached: {} | {}ms\n",
        response.confidence,
        response.source_tool.as_deref().unwrap_or("-"),
        response.cached,
        response.duration_ms
    ));
    out
}
