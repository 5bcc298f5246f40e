use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use feedgator::config::Config;
use feedgator::models::NewFeed;
use feedgator::{run_ingestion_loop, FileStore, HttpFetcher, Store};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gator")]
#[command(about = "Polls RSS feeds and stores their posts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one feed per interval (e.g. 30s, 1m, 1h30m) until interrupted
    Agg {
        interval: String,
    },
    /// Register a feed owned by the current user
    AddFeed {
        name: String,
        url: String,
    },
    /// List registered feeds
    Feeds,
    /// Show the newest posts from the current user's feeds
    Browse {
        #[arg(short, long, default_value_t = 2)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let data_dir = config.data_dir();
    let store = FileStore::open(&data_dir)
        .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?;

    match cli.command {
        Commands::Agg { interval } => {
            let fetcher = HttpFetcher::new(&config.user_agent)?;
            let (shutdown_tx, shutdown_rx) = watch::channel(false);

            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, shutting down");
                    let _ = shutdown_tx.send(true);
                }
            });

            println!("Collecting feeds every {}", interval);
            run_ingestion_loop(&interval, store, fetcher, config.fetch_timeout(), shutdown_rx).await?;
        }
        Commands::AddFeed { name, url } => {
            with_current_user(&config, |user| add_feed(&store, user, name, url))?;
        }
        Commands::Feeds => {
            let feeds = store.list_feeds()?;
            if feeds.is_empty() {
                println!("No feeds registered");
            }
            for feed in feeds {
                let fetched = feed
                    .last_fetched_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!("* {} ({}) added by {}, last fetched {}", feed.name, feed.url, feed.user_name, fetched);
            }
        }
        Commands::Browse { limit } => {
            with_current_user(&config, |user| browse(&store, user, limit))?;
        }
    }

    Ok(())
}

/// Resolves the configured user and hands it to `handler`.
fn with_current_user<T>(config: &Config, handler: impl FnOnce(&str) -> Result<T>) -> Result<T> {
    let user = config.current_user_name.trim();
    if user.is_empty() {
        bail!("No current user configured; set current_user_name in ~/.gatorconfig.json");
    }
    handler(user)
}

fn add_feed(store: &FileStore, user: &str, name: String, url: String) -> Result<()> {
    reqwest::Url::parse(&url).with_context(|| format!("Not a valid feed URL: {}", url))?;

    let feed = store.create_feed(NewFeed {
        name,
        url,
        user_name: user.to_string(),
    })?;

    println!("Added feed {} ({}) with id {}", feed.name, feed.url, feed.id);
    Ok(())
}

fn browse(store: &FileStore, user: &str, limit: usize) -> Result<()> {
    let posts = store.list_posts_for_user(user, limit)?;
    if posts.is_empty() {
        println!("No posts yet; run `gator agg 1m` to collect some");
    }

    for post in posts {
        println!("{} ({})", post.title, post.published_at.format("%Y-%m-%d %H:%M"));
        println!("  {}", post.url);
        if let Some(description) = post.description {
            let text = html2text::from_read(description.as_bytes(), 78);
            for line in text.lines().filter(|line| !line.trim().is_empty()) {
                println!("  {}", line);
            }
        }
        println!();
    }

    Ok(())
}
