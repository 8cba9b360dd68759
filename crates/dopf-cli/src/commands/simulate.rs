use std::path::Path;

use anyhow::Result;
use dopf_sim::{SimulationConfig, Simulator};
use tracing::info;

pub fn handle(
    input_dir: &Path,
    config: Option<&Path>,
    days: Option<u32>,
    json: bool,
) -> Result<()> {
    let mut config = match config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    config.input_dir = input_dir.to_path_buf();
    if let Some(days) = days {
        config.horizon_days = days;
    }

    info!(
        "simulating {} day(s) from {}",
        config.horizon_days,
        input_dir.display()
    );
    let mut simulator = Simulator::initialize(config)?;
    let summary = simulator.run()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "events: {} (fast {}, slow {}, infeasible {})",
            summary.events, summary.fast_controls, summary.slow_controls, summary.infeasible
        );
        println!("end time: {:.1} min", summary.end_time);
        println!("objective: {:.6}", summary.objective);
    }
    Ok(())
}
