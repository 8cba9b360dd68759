use std::path::Path;

use anyhow::Result;
use dopf_sim::SimulationConfig;
use tracing::info;

pub fn handle(out: Option<&Path>) -> Result<()> {
    let config = SimulationConfig::default();
    match out {
        Some(path) => {
            config.save(path)?;
            info!("wrote default configuration to {}", path.display());
        }
        None => print!("{}", config.to_toml()?),
    }
    Ok(())
}
