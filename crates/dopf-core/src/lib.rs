//! # dopf-core: Radial Distribution Network Model
//!
//! Data structures for multi-phase radial distribution feeders: phase sets,
//! nalgebra-backed per-phase linear algebra, buses, lines, and the controllable
//! devices attached to them.
//!
//! ## Design Philosophy
//!
//! Feeders are modeled as **trees rooted at a single substation**:
//! - **Buses** hold a phase set (`"a"`, `"bc"`, `"abc"`, ...) and per-phase state
//! - **Lines** connect a parent bus to a child bus and carry the child's phase set
//! - **Loads** attach to a bus on a subset of its phases
//!
//! Elements live in arenas addressed by newtype handles. Sorting the network
//! breadth-first puts the substation at index 0 and every parent before its
//! children, which is the order the sweep and gradient passes rely on.
//!
//! ## Quick Start
//!
//! ```rust
//! use dopf_core::*;
//!
//! let mut model = NetworkModel::new();
//! let sub = model
//!     .add_bus(Bus::new("sub", PhaseSet::abc(), BusKind::Substation))
//!     .unwrap();
//! let house = model
//!     .add_bus(Bus::new("house", "b".parse().unwrap(), BusKind::House))
//!     .unwrap();
//! let z = SquareMatrix::diagonal(&[C64::new(0.01, 0.02)]);
//! model
//!     .add_line(Line::new("l1", "b".parse().unwrap(), LineKind::Line, sub, house, z))
//!     .unwrap();
//! model.sort_by_breadth_first_search().unwrap();
//!
//! assert_eq!(model.bus(BusId::new(1)).phase_indices_in_parent(), &[1]);
//! ```

use serde::{Deserialize, Serialize};

pub mod conventions;
pub mod device;
pub mod error;
pub mod graph_utils;
pub mod linalg;
pub mod load_value;
pub mod network;
pub mod phase;

pub use conventions::GridConventions;
pub use device::{DeviceKind, ElectricVehicle, Load, LoadType};
pub use error::{DopfError, DopfResult};
pub use graph_utils::{ensure_radial, feeder_graph, feeder_stats, FeederStats};
pub use linalg::{norm, ColumnVector, Scalar, SquareMatrix, C64};
pub use load_value::LoadValue;
pub use network::{Bus, BusKind, Line, LineKind, NetworkModel};
pub use phase::{is_valid_phase, PhaseSet};

// Newtype wrappers for arena handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadId(usize);

impl BusId {
    #[inline]
    pub fn new(value: usize) -> Self {
        BusId(value)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl LineId {
    #[inline]
    pub fn new(value: usize) -> Self {
        LineId(value)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl LoadId {
    #[inline]
    pub fn new(value: usize) -> Self {
        LoadId(value)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

/// Plot position of a bus.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}
