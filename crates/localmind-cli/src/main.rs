// ============================================================================
// localmind-mem - inspect and manage the LocalMind memory database
// ============================================================================
// Usage:
//   localmind-mem stats                         Show database statistics
//   localmind-mem list [--role ROLE]            List remembered turns
//   localmind-mem remember --role user TEXT     Store a turn
//   localmind-mem recall QUERY                  Print the context block for a query
//   localmind-mem search QUERY [--top-k N]      Rank memories with scores
//   localmind-mem export --format json          Export all memories as JSON
//   localmind-mem clear --yes                   Delete every memory
// ============================================================================

use anyhow::Result;
use chrono::{Local, TimeZone, Utc};
use clap::{Parser, Subcommand};
use localmind_core::memory::{Document, MemoryService, Role};
use localmind_core::MemoryConfig;
use std::path::PathBuf;

/// LocalMind memory inspection tool
#[derive(Parser)]
#[command(name = "localmind-mem", version, about = "Inspect and manage LocalMind's long-term memory")]
struct Cli {
    /// Path to the database file (default: ~/.localmind/memory.redb)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show database statistics (counts per role, model and dimension)
    Stats,

    /// List remembered turns, newest first
    List {
        /// Only show turns by this role: user, assistant
        #[arg(long)]
        role: Option<Role>,

        /// Maximum number of turns to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Embed and store a single turn
    Remember {
        /// Speaker of the turn: user, assistant
        #[arg(long, default_value = "user")]
        role: Role,

        /// Text of the turn
        text: String,
    },

    /// Print the context block that would be added to the system prompt
    Recall {
        query: String,
    },

    /// Rank memories against a query, ignoring the relevance threshold
    Search {
        query: String,

        /// Number of results
        #[arg(long, default_value = "3")]
        top_k: usize,
    },

    /// Export all memories
    Export {
        /// Output format (currently only json is supported)
        #[arg(long, default_value = "json")]
        format: String,

        /// Include embedding vectors in the output
        #[arg(long)]
        with_embeddings: bool,
    },

    /// Delete every memory
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

fn format_timestamp(ts_ms: i64) -> String {
    Utc.timestamp_millis_opt(ts_ms)
        .single()
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts_ms))
}

fn preview(text: &str, max: usize) -> String {
    let mut line: String = text.replace('\n', " ").chars().take(max).collect();
    if text.chars().count() > max {
        line.push_str("...");
    }
    line
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal; the environment alone is enough
    dotenvy::dotenv().ok();

    // Logs go to stderr so exports on stdout stay clean
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("localmind_core=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = MemoryConfig::from_env()?;
    if let Some(path) = cli.db_path {
        config.db_path = path;
    }
    let service = MemoryService::from_config(&config);

    match cli.command {
        Commands::Stats => cmd_stats(&service).await,
        Commands::List { role, limit } => cmd_list(&service, role, limit).await,
        Commands::Remember { role, text } => cmd_remember(&service, role, &text).await,
        Commands::Recall { query } => cmd_recall(&service, &query).await,
        Commands::Search { query, top_k } => cmd_search(&service, &query, top_k).await,
        Commands::Export {
            format,
            with_embeddings,
        } => cmd_export(&service, &format, with_embeddings).await,
        Commands::Clear { yes } => cmd_clear(&service, yes).await,
    }
}

async fn cmd_stats(service: &MemoryService) -> Result<()> {
    // Loads the embedding provider too, so the status shows whether it is reachable
    let init = service.init().await;
    let stats = service.store().stats().await?;

    println!("=== LocalMind Memory Stats ===");
    println!("Database:        {}", service.store().path().display());
    println!("Schema version:  {}", stats.schema_version);
    println!("Embedding model: {}", service.embedding_model());
    println!("Status:          {}", service.status().display_name());
    if let Err(e) = init {
        println!("  {}", e);
    }
    println!();
    println!("Memories: {} total", stats.total_documents);
    for (role, count) in &stats.role_counts {
        println!("  {:12} {}", role, count);
    }
    println!("Models:");
    for (model, count) in &stats.model_counts {
        println!("  {:24} {}", model, count);
    }
    println!("Dimensions:");
    for (dim, count) in &stats.dimensions {
        println!("  {:<12} {}", dim, count);
    }

    Ok(())
}

async fn cmd_list(service: &MemoryService, role: Option<Role>, limit: usize) -> Result<()> {
    let mut docs: Vec<Document> = service
        .store()
        .get_all()
        .await?
        .into_iter()
        .filter(|d| role.map_or(true, |r| d.metadata.role == r))
        .collect();

    if docs.is_empty() {
        println!("No memories found.");
        return Ok(());
    }

    docs.sort_by(|a, b| b.metadata.timestamp.cmp(&a.metadata.timestamp));
    let total = docs.len();

    println!(
        "{:<36}  {:<10}  {:<20}  {}",
        "ID", "ROLE", "CREATED", "CONTENT"
    );
    println!("{}", "-".repeat(100));

    for doc in docs.iter().take(limit) {
        println!(
            "{:<36}  {:<10}  {:<20}  {}",
            doc.id,
            doc.metadata.role,
            format_timestamp(doc.metadata.timestamp),
            preview(&doc.content, 40)
        );
    }

    println!("\nShowing {} of {} memories", total.min(limit), total);
    Ok(())
}

async fn cmd_remember(service: &MemoryService, role: Role, text: &str) -> Result<()> {
    service.init().await?;

    match service.add_memory(text, role).await {
        Some(id) => {
            println!("Stored {} turn {}", role, id);
            Ok(())
        }
        None => anyhow::bail!("Failed to store memory (see log above)"),
    }
}

async fn cmd_recall(service: &MemoryService, query: &str) -> Result<()> {
    service.init().await?;

    let context = service.retrieve_context(query).await;
    if context.is_empty() {
        println!(
            "No memories above relevance threshold {}.",
            service.policy().relevance_threshold
        );
    } else {
        print!("{}", context);
    }

    Ok(())
}

async fn cmd_search(service: &MemoryService, query: &str, top_k: usize) -> Result<()> {
    let results = service.search_memories(query, top_k).await?;

    if results.is_empty() {
        println!("No memories found.");
        return Ok(());
    }

    let threshold = service.policy().relevance_threshold;
    println!("{:<8}  {:<10}  {:<20}  {}", "SCORE", "ROLE", "CREATED", "CONTENT");
    println!("{}", "-".repeat(90));

    for result in &results {
        let marker = if result.score > threshold { "*" } else { " " };
        println!(
            "{:<7.4}{}  {:<10}  {:<20}  {}",
            result.score,
            marker,
            result.document.metadata.role,
            format_timestamp(result.document.metadata.timestamp),
            preview(&result.document.content, 40)
        );
    }

    println!("\n* above relevance threshold {}", threshold);
    Ok(())
}

async fn cmd_export(service: &MemoryService, format: &str, with_embeddings: bool) -> Result<()> {
    if format != "json" {
        anyhow::bail!("Unsupported format '{}'. Only 'json' is supported.", format);
    }

    let stats = service.store().stats().await?;
    let docs = service.store().get_all().await?;

    let mut memories = Vec::with_capacity(docs.len());
    for doc in &docs {
        let mut value = serde_json::to_value(doc)?;
        if !with_embeddings {
            if let Some(obj) = value.as_object_mut() {
                obj.remove("embedding");
            }
        }
        memories.push(value);
    }

    let export = serde_json::json!({
        "exported_at": Utc::now().to_rfc3339(),
        "database": service.store().path().display().to_string(),
        "stats": stats,
        "memories": memories,
    });

    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}

async fn cmd_clear(service: &MemoryService, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!("Refusing to delete all memories without --yes");
    }

    let removed = service.clear_memory().await?;
    println!("Deleted {} memories", removed);
    Ok(())
}
