use clap::Parser;
use dopf_algo::power_flow::SweepSettings;
use dopf_cli::{Cli, Commands};
use tracing::error;
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::pf::PfArgs;

fn main() {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let result = match &cli.command {
        Commands::Pf {
            network,
            loads,
            time,
            max_iterations,
            tolerance,
            json,
        } => commands::pf::handle(PfArgs {
            network,
            loads: loads.as_deref(),
            time: *time,
            settings: SweepSettings::default()
                .with_max_iterations(*max_iterations)
                .with_tolerance(*tolerance),
            json: *json,
        }),
        Commands::Simulate {
            input_dir,
            config,
            days,
            json,
        } => commands::simulate::handle(input_dir, config.as_deref(), *days, *json),
        Commands::Config { out } => commands::config::handle(out.as_deref()),
    };

    if let Err(err) = result {
        error!("{:#}", err);
        std::process::exit(1);
    }
}
