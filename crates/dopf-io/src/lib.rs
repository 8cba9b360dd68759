//! # dopf-io: Feeder and Load Data Input
//!
//! Readers for the tag-based text files that describe a distribution feeder
//! and the loads connected to it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use dopf_io::{read_info, read_load_file, read_network, LoadFileOptions};
//!
//! fn main() -> anyhow::Result<()> {
//!     let model = read_network(Path::new("data/network.txt"))?;
//!     let info = read_info(Path::new("data/info.txt"))?;
//!     let day = read_load_file(
//!         Path::new("data/loadOnDay1.txt"),
//!         &model,
//!         LoadFileOptions::default(),
//!     )?;
//!
//!     println!("Buses: {}", model.num_buses());
//!     println!("Profiles: {} every {} min", day.profiles.len(), info.slot_length_minutes);
//!     Ok(())
//! }
//! ```
//!
//! ## Files
//!
//! | File | Root tag | Reader |
//! |------|----------|--------|
//! | `network.txt` | `<network>` | [`read_network`] |
//! | `loadOnDayK.txt` | `<LoadFile>` | [`read_load_file`] |
//! | `info.txt` | `<info>` | [`read_info`] |
//!
//! All three share the element tree in [`grammar`]; values inside a tag are
//! whitespace separated and matrices are given row-major.

pub mod grammar;
pub mod info;
pub mod loads;
pub mod network;

pub use grammar::{parse_document, Element, GrammarError};
pub use info::{parse_info, read_info, LoadFileInfo};
pub use loads::{
    base_load_value, parse_load_file, read_load_file, LoadFile, LoadFileOptions, LoadProfile,
    LoadSample, SampleValue,
};
pub use network::{parse_network, read_network};
