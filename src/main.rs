//! opds-covers entry point.

use clap::Parser;
use opds_covers::{
    config::{CacheCommand, Cli, Command, Config},
    covers::{ContentSource, Cover, CoverOptions, CoverStore, CoverVariant},
    db::Database,
    server,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `cover` can write JPEG bytes to stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "opds_covers=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Init writes the config rather than reading it
    if let Some(Command::Init { force }) = cli.command {
        let path = cli.config.unwrap_or_else(|| PathBuf::from("config.toml"));
        return cmd_init(&path, force).await;
    }

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    match cli.command {
        Some(Command::Init { .. }) => Ok(()),
        Some(Command::Cover { id, info: true, .. }) => cmd_cover_info(&config, id).await,
        Some(Command::Cover {
            id, thumb, output, ..
        }) => cmd_cover(&config, id, thumb, output).await,
        Some(Command::Cache { action }) => cmd_cache(action, &config).await,
        Some(Command::Serve { bind }) => cmd_serve(config, bind).await,
        None => cmd_serve(config, None).await,
    }
}

/// Initialize config and database.
async fn cmd_init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    let config = Config::write_default(config_path, force)?;
    println!("Created config file: {}", config_path.display());

    if let Some(parent) = config.database.path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let _db = Database::open(&config.database.path)?;
    println!("Initialized database: {}", config.database.path.display());

    println!(
        "\nEdit {} to point at your catalog and cover cache.",
        config_path.display()
    );
    println!("Then run: opds-covers serve");

    Ok(())
}

fn cover_store(config: &Config, db: Database) -> CoverStore {
    CoverStore::new(
        Arc::new(db),
        ContentSource::new(&config.archive),
        CoverOptions::from_config(&config.cache),
    )
}

/// Run the pipeline for one book and write the JPEG out.
async fn cmd_cover(
    config: &Config,
    id: i64,
    thumb: bool,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let store = cover_store(config, db);
    let variant = CoverVariant::from_thumb_flag(thumb);

    let cover = store.get_cover(id, variant).await;
    if cover.is_placeholder() {
        eprintln!("No cover for book {}, writing placeholder", id);
    }

    let data = match cover {
        Cover::Cached(path) => tokio::fs::read(&path).await?,
        Cover::Placeholder(data) => data,
    };

    match output {
        Some(path) => {
            std::fs::write(&path, &data)?;
            eprintln!("Wrote {} bytes to {}", data.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
    }

    Ok(())
}

/// Print extraction diagnostics for one book.
async fn cmd_cover_info(config: &Config, id: i64) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let store = cover_store(config, db);

    let info = store.inspect(id).await?;
    println!("{}", serde_json::to_string_pretty(&info)?);

    Ok(())
}

/// Cover cache commands.
async fn cmd_cache(action: CacheCommand, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let store = cover_store(config, db);

    match action {
        CacheCommand::Stats => {
            let stats = store.stats();
            println!("Cache directory: {}", stats.covers_dir);
            if !stats.exists {
                println!("  (not created yet)");
                return Ok(());
            }
            println!("{:<12} {}", "Full:", stats.full_covers);
            println!("{:<12} {}", "Thumbnails:", stats.thumbnails);
            println!("{:<12} {} bytes", "Total:", stats.total_bytes);
        }

        CacheCommand::Clear => {
            let removed = store.clear()?;
            println!("Removed {} cached covers", removed);
        }
    }

    Ok(())
}

/// Start the server.
async fn cmd_serve(mut config: Config, bind: Option<std::net::SocketAddr>) -> anyhow::Result<()> {
    if let Some(addr) = bind {
        config.server.bind = addr;
    }

    let db = Database::open(&config.database.path)?;

    tracing::info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        covers = %config.cache.covers_dir.display(),
        books = db.book_count().unwrap_or(0),
        "Starting opds-covers server"
    );

    let state = server::AppState::new_with_db(&config, db);
    let app = server::create_router(state);

    let listener = TcpListener::bind(config.server.bind).await?;
    tracing::info!(address = %config.server.bind, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
