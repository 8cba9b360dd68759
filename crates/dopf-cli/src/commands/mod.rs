pub mod config;
pub mod pf;
pub mod simulate;
