//! 🚀 cinesync-cli — the front door, the bouncer, the maitre d' of cinesync.
//!
//! 📦 This binary crate is the thin CLI wrapper that loads config,
//! sets up logging, and then lets the real code do the heavy lifting.
//! Like a manager. 🦆

use anyhow::{Context, Result};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Resolve the config path (argv[1], or the ol' reliable default)
/// 3. Load config (the moment of truth)
/// 4. Run the pipeline (send it and pray 🙏)
/// 5. Handle errors (cry, but with context)
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let path_arg = args.get(1).map(String::as_str).unwrap_or("cinesync.toml");

    // 🔒 Validate the config file exists before we get too emotionally attached.
    let config_file = std::path::Path::new(path_arg);
    let config_file_path = match config_file.try_exists()
        .context(format!("💀 Configuration file may not exist, couldn't find it. Double check that it exists, or maybe it's an issue with pwd/cwd and relative paths. In that case, use an absolute path, to be absolutely certain. Was checking here: '{}'", config_file.display()))?
    {
        true => Some(config_file),
        false => None, // env-vars-only mode — valid, if you've set all of them
    };

    let app_config = cinesync::app_config::load_config(config_file_path)
        .context("💀 Couldn't load the config. Take a look at the file and the CINESYNC_* environment, make sure you didn't forget something obvious")?;

    // 🚀 SEND IT. This loop is the product: it only comes back on failure.
    let result = cinesync::run(app_config).await;

    if let Err(err) = result {
        error!("💀 error: {}", err);
        // 🧅 peel the onion of sadness, one layer at a time
        let mut looks_like_connection_trouble = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
            {
                looks_like_connection_trouble = true;
            }
        }

        // 📡 if it smells like a connection problem, it's probably a connection problem
        if looks_like_connection_trouble {
            error!(
                "🔧 hint: looks like a service isn't reachable. \
                Double-check that the backing services (Postgres, Redis, Elasticsearch) \
                are actually running. If you're using Docker, try: \
                `docker ps` to see what's up, or `docker compose up -d` to resurrect them. \
                Even databases need a nudge sometimes. ☕"
            );
        }

        std::process::exit(1);
    }

    Ok(())
}
