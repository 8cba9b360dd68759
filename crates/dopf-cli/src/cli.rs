use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dopf", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Solve the power flow of a feeder
    Pf {
        /// Path to network.txt
        #[arg(value_hint = ValueHint::FilePath)]
        network: PathBuf,
        /// Load file whose base loads and panels are attached before solving
        #[arg(long, value_hint = ValueHint::FilePath)]
        loads: Option<PathBuf>,
        /// Sample time in minutes used with --loads
        #[arg(long, default_value_t = 0.0)]
        time: f64,
        /// Maximum sweep iterations
        #[arg(long, default_value_t = 15)]
        max_iterations: usize,
        /// Convergence threshold on the squared update norm
        #[arg(long, default_value_t = 1e-6)]
        tolerance: f64,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Run the event-driven control simulation over an input folder
    Simulate {
        /// Folder with network.txt, info.txt and loadOnDayK.txt
        #[arg(value_hint = ValueHint::DirPath)]
        input_dir: PathBuf,
        /// TOML configuration file
        #[arg(long, value_hint = ValueHint::FilePath)]
        config: Option<PathBuf>,
        /// Override the simulation horizon in days
        #[arg(long)]
        days: Option<u32>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the default configuration
    Config {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}
