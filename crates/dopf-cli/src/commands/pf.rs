use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use dopf_algo::power_flow::{solve_model, summarize, PowerFlowSummary, SweepSettings};
use dopf_core::GridConventions;
use dopf_io::{read_load_file, read_network, LoadFileOptions};
use dopf_sim::{fetch_real_time_data, FutureData};
use tabwriter::TabWriter;
use tracing::info;

pub struct PfArgs<'a> {
    pub network: &'a Path,
    pub loads: Option<&'a Path>,
    pub time: f64,
    pub settings: SweepSettings,
    pub json: bool,
}

pub fn handle(args: PfArgs<'_>) -> Result<()> {
    let mut model = read_network(args.network)?;

    if let Some(path) = args.loads {
        let file = read_load_file(path, &model, LoadFileOptions::default())?;
        let mut data = FutureData::new();
        for profile in file.profiles {
            data.extend(&profile.load.name, profile.samples);
            model.add_load(profile.load)?;
        }
        fetch_real_time_data(&mut model, &mut data, args.time, args.time);
        info!(loads = model.loads().count(), time = args.time, "attached loads");
    }

    let report = solve_model(&mut model, &GridConventions::default(), &args.settings)?;
    let summary = summarize(&model, report);

    if args.json {
        let stdout = io::stdout();
        serde_json::to_writer_pretty(stdout.lock(), &summary)?;
        println!();
    } else {
        print_table(&summary)?;
    }
    Ok(())
}

fn print_table(summary: &PowerFlowSummary) -> Result<()> {
    let mut tw = TabWriter::new(io::stdout());
    writeln!(tw, "bus\tphase\t|V| (pu)")?;
    for bus in &summary.buses {
        let magnitudes: Vec<String> = bus.magnitudes.iter().map(|v| format!("{:.6}", v)).collect();
        writeln!(tw, "{}\t{}\t{}", bus.name, bus.phase, magnitudes.join(" "))?;
    }
    tw.flush().context("writing voltage table")?;

    let injection: Vec<String> = summary
        .substation_power
        .iter()
        .map(|(p, q)| format!("{:.6}{:+.6}j", p, q))
        .collect();
    println!("substation injection: {}", injection.join(", "));
    println!(
        "sweep: {:?} after {} iteration(s), last update {:.3e}",
        summary.report.status, summary.report.iterations, summary.report.max_update
    );
    Ok(())
}
