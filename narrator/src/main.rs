//! Narrator console.
//!
//! Reads player actions from stdin, one per line, and prints the rendered
//! reply. Stands in for a chat transport during development.
//!
//! ```bash
//! cargo run -p narrator -- --session mesa-1 --player Aria --lang es
//! ```

mod console;

use console::ConsoleConfig;
use narrator_core::{Pipeline, PipelineConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "narrator=info,narrator_core=info,srd=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let config = PipelineConfig::from_env();
    tracing::info!(
        srd = %config.srd.base_url,
        state_dir = ?config.state_dir,
        genre = %config.genre,
        "starting narrator"
    );

    let pipeline = Pipeline::from_config(config)?;
    console::run(&pipeline, ConsoleConfig::from_args(&args)).await?;
    Ok(())
}

fn print_help() {
    println!("Narrator console");
    println!();
    println!("Usage: narrator [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --session <ID>   Session id (default: local)");
    println!("  --player <NAME>  Player id (default: player)");
    println!("  --lang <es|en>   Input language (default: es)");
    println!("  -h, --help       Show this help");
    println!();
    println!("Environment:");
    println!("  NARRATOR_SRD_URL, NARRATOR_SRD_TIMEOUT_SECS, NARRATOR_CACHE_TTL_SECS,");
    println!("  NARRATOR_RESULT_LIMIT, NARRATOR_STATE_DIR, NARRATOR_MAX_MESSAGE_LEN,");
    println!("  NARRATOR_SHOW_DICE, NARRATOR_ENGINE_TIMEOUT_SECS, NARRATOR_SAVE_TIMEOUT_SECS,");
    println!("  NARRATOR_GENRE, RUST_LOG");
}
