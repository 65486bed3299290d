//! sim-runner: headless dataset generator for campaign-sim.
//!
//! Usage:
//!   sim-runner
//!   sim-runner --seed 42 --variant tuned --out tuned.csv
//!   sim-runner --config data/tuned.json --sqlite run.db

use anyhow::{bail, Result};
use campaign_sim_core::{
    config::SimConfig,
    engine::{RunSummary, SimEngine},
    sink::{CsvSink, DatasetSink, SqliteSink},
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let variant = flag_value(&args, "--variant").unwrap_or("baseline");
    let config_path = flag_value(&args, "--config");
    let sqlite_path = flag_value(&args, "--sqlite");

    let config = match config_path {
        Some(path) => SimConfig::load(path)?,
        None => match variant {
            "baseline" => SimConfig::baseline(),
            "tuned" => SimConfig::tuned(),
            other => bail!("Unknown variant '{other}' (expected baseline or tuned)"),
        },
    };
    let out = flag_value(&args, "--out")
        .map(str::to_string)
        .unwrap_or_else(|| config.output.file_name.clone());

    println!("campaign-sim — sim-runner");
    println!("  seed:      {seed}");
    println!("  config:    {}", config_path.unwrap_or(variant));
    println!("  out:       {out}");
    if let Some(db) = sqlite_path {
        println!("  sqlite:    {db}");
    }
    println!();

    let run_id = format!("run-{seed}-{}", chrono::Utc::now().format("%Y%m%d%H%M%S"));
    let engine = SimEngine::new(run_id.clone(), seed, config)?;

    let mut sinks: Vec<Box<dyn DatasetSink>> = vec![Box::new(CsvSink::new(&out))];
    if let Some(db) = sqlite_path {
        sinks.push(Box::new(SqliteSink::open(
            db,
            run_id,
            seed,
            env!("CARGO_PKG_VERSION"),
        )));
    }

    let output = engine.run_to_sinks(&mut sinks)?;
    print_summary(&output.summary);
    println!();
    println!("Dataset saved as {out}");
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("=== RUN SUMMARY ===");
    println!("  run_id:         {}", summary.run_id);
    println!("  stores:         {}", summary.stores);
    println!("  customers:      {}", summary.customers);
    println!("  rows:           {}", summary.total_rows);
    println!("  revenue:        {:.2}", summary.total_revenue);
    println!();
    println!("=== WEEKS ===");
    for w in &summary.weeks {
        println!(
            "  week {} | rows: {} / {} | revenue: {:.2} | discount: {} | gift: {} | loyalty: {} | new: {}",
            w.week,
            w.transactions,
            w.candidates,
            w.revenue,
            w.discounted,
            w.gifted,
            w.loyalty,
            w.new_customers
        );
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    flag_value(args, flag)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
