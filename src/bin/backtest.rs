//! Replay a recorded event file through the decision engine and print
//! the resulting trades.

use anyhow::Context;
use clap::Parser;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::sync::Arc;

use scalpex::engine::{
    CollectingReporter, Engine, ExecutionGateway, ReplayDriver, ReplayFeed, Reporter, SimGateway,
};
use scalpex::{logging, AppConfig, PositionState};

#[derive(Parser, Debug)]
#[command(name = "backtest", about = "Deterministic historical replay")]
struct Args {
    /// Path to a TOML config file (defaults to config/default.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Newline-delimited JSON event file to replay
    #[arg(long)]
    events: PathBuf,

    /// Starting account equity in quote currency
    #[arg(long, default_value = "10000")]
    equity: Decimal,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref()).context("loading configuration")?;
    logging::init(&config.logging);

    let mut feed = ReplayFeed::from_jsonl(&args.events).context("loading event file")?;
    let sim = Arc::new(SimGateway::new());
    let reporter = Arc::new(CollectingReporter::new());

    let engine = Engine::new(
        config,
        args.equity,
        sim.clone() as Arc<dyn ExecutionGateway>,
        reporter.clone() as Arc<dyn Reporter>,
    );
    let mut driver = ReplayDriver::new(engine, sim);
    driver.run(&mut feed).await?;

    println!("=== Replay summary ===");
    println!("realized PnL:   {}", driver.engine().realized_pnl());
    println!("open positions: {}", driver.engine().open_positions());
    println!("final exposure: {}", driver.engine().ledger().aggregate());

    let mut closures = 0;
    for event in reporter.lifecycle_events() {
        if let PositionState::Closed(reason) = event.to {
            closures += 1;
            println!(
                "{}  {}  {} -> closed({})",
                event.timestamp, event.symbol, event.from, reason
            );
        }
    }
    println!("closed positions: {closures}");

    let rejections = reporter.rejections();
    if !rejections.is_empty() {
        println!("rejections:");
        for (symbol, reason) in rejections {
            println!("  {symbol}: {reason}");
        }
    }

    // A replay that opened nothing usually means the config and the
    // recording disagree on symbols; make that obvious.
    if closures == 0 && driver.engine().open_positions() == 0 && driver.engine().realized_pnl() == dec!(0) {
        eprintln!("note: no positions were opened during this replay");
    }
    Ok(())
}
