//! Binary entrypoint for The Life engine CLI.
//!
//! Commands:
//! - `init` - create a starter `config.toml` and an empty local ledger
//! - `simulate --player <id>` - run a short scripted session against the
//!   local ledger, with background polls and the display ticker running
//! - `status --player <id>` - print a player snapshot and the leaderboard
//!
//! See the library crate docs for module-level details: `thelife::`.
use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};

use thelife::catalog::Catalog;
use thelife::config::Config;
use thelife::engine::{DisplayTicker, EconomySimulator, Poller};
use thelife::ledger::{Ledger, SledLedger};
use thelife::metrics;

#[derive(Parser)]
#[command(name = "thelife")]
#[command(about = "Player-economy simulation engine for The Life")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration and local ledger
    Init,
    /// Run a scripted local session
    Simulate {
        /// Player id (chat-platform identity)
        #[arg(short, long)]
        player: String,

        /// Display name for first-time creation
        #[arg(short, long, default_value = "Drifter")]
        name: String,

        /// Number of crime attempts to script
        #[arg(short = 'a', long, default_value_t = 5)]
        attempts: u32,
    },
    /// Show a player snapshot and the leaderboard
    Status {
        /// Player id
        #[arg(short, long)]
        player: String,
    },
}

fn init_logging(verbose: u8, config_level: &str) {
    let level = match verbose {
        0 => config_level.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let mut builder = env_logger::Builder::from_default_env();
    builder.parse_filters(&level);
    let _ = builder.try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Init) {
        init_logging(cli.verbose, "info");
        Config::create_default(&cli.config).await?;
        let config = Config::load(&cli.config).await?;
        SledLedger::open(&config.ledger.data_dir)?;
        info!(
            "wrote {} and opened ledger at {}",
            cli.config, config.ledger.data_dir
        );
        return Ok(());
    }

    let config = Config::load(&cli.config).await?;
    init_logging(cli.verbose, &config.logging.level);

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Simulate {
            player,
            name,
            attempts,
        } => simulate(config, &player, &name, attempts).await,
        Commands::Status { player } => status(config, &player),
    }
}

async fn simulate(config: Config, player_id: &str, name: &str, attempts: u32) -> Result<()> {
    let ledger: Arc<dyn Ledger> = Arc::new(SledLedger::open(&config.ledger.data_dir)?);
    let catalog = Arc::new(Catalog::standard());
    let polling = config.polling.clone();
    let simulator = EconomySimulator::start(
        Arc::clone(&ledger),
        Arc::clone(&catalog),
        config,
        player_id,
        name,
    )?;
    let simulator = Arc::new(Mutex::new(simulator));

    let poller = Poller::spawn(
        Arc::clone(&simulator),
        Arc::clone(&ledger),
        polling,
        player_id.to_string(),
    );
    let (ticker, mut ticks) = DisplayTicker::spawn();

    {
        let mut sim = simulator.lock().expect("simulator lock poisoned");
        match sim.claim_daily_bonus() {
            Ok(outcome) => println!("{}", outcome.text),
            Err(e) => info!("daily bonus: {}", e),
        }
        if let Ok(outcome) = sim.refill_stamina() {
            println!("{}", outcome.text);
        }
    }

    let crime_ids: Vec<String> = catalog.crimes().map(|c| c.id.clone()).collect();
    let mut done = 0u32;
    while done < attempts {
        // Let the ticker drive transition checks between attempts, the way
        // the UI loop would.
        if let Some(now) = ticks.recv().await {
            let mut sim = simulator.lock().expect("simulator lock poisoned");
            for event in sim.tick(now) {
                println!("{}", event.text);
            }
            let crime_id = &crime_ids[done as usize % crime_ids.len()];
            match sim.preview_crime(crime_id) {
                Ok(preview) => println!(
                    "{} at {:.0}% for ${}-${}",
                    crime_id, preview.chance, preview.base_reward, preview.max_reward
                ),
                Err(e) => warn!("preview failed: {}", e),
            }
            match sim.attempt_crime(crime_id) {
                Ok(report) => println!("{}", report.message.text),
                Err(e) => println!("blocked: {}", e),
            }
            done += 1;
        }
    }

    ticker.stop();
    poller.stop();

    let sim = simulator.lock().expect("simulator lock poisoned");
    let view = sim.view(chrono::Utc::now());
    println!(
        "{} - level {} | hp {}/{} | stamina {}/{} | ${} cash, ${} banked | {}",
        view.player.display_name,
        view.player.level,
        view.player.hp,
        view.player.max_hp,
        view.player.stamina,
        view.player.max_stamina,
        view.player.cash,
        view.player.bank_balance,
        view.state.label(),
    );
    for (kind, left) in &view.countdowns {
        println!("  {} in {}s", kind.label(), left.num_seconds());
    }
    let stats = metrics::snapshot();
    println!(
        "attempts {} | successes {} | polls applied {} / discarded {} | fallback writes {}",
        stats.crime_attempts,
        stats.crime_successes,
        stats.polls_applied,
        stats.polls_discarded,
        stats.fallback_writes,
    );
    Ok(())
}

fn status(config: Config, player_id: &str) -> Result<()> {
    let ledger = SledLedger::open(&config.ledger.data_dir)?;
    let player = ledger.fetch_player(player_id)?;
    println!(
        "{} ({}) - level {} | ${} cash, ${} banked | {} robberies ({} clean) | pvp {}-{}",
        player.display_name,
        player.id,
        player.level,
        player.cash,
        player.bank_balance,
        player.total_robberies,
        player.successful_robberies,
        player.pvp_wins,
        player.pvp_losses,
    );
    println!("-- leaderboard --");
    for (rank, entry) in ledger.leaderboard_page(0, 10)?.iter().enumerate() {
        println!(
            "{:>2}. {} (level {}) ${}",
            rank + 1,
            entry.display_name,
            entry.level,
            entry.total_wealth
        );
    }
    Ok(())
}
