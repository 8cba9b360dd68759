//! Gradient-Based Optimal Power Flow
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`types`] | Modes, settings, bounds and run reports |
//! | [`gradient`] | Barrier objective and its gradient per slot |
//! | [`devices`] | Photovoltaic and electric-vehicle updates with their projections |
//! | [`controller`] | [`NetworkControl`]: initialization, outer and inner loops, write-back |

pub mod controller;
pub mod devices;
pub mod gradient;
pub mod types;

pub use controller::{ControlSlot, NetworkControl};
pub use devices::{
    photovoltaic_reactive_power, project_charging_profile, ChargingWindow, LoadController,
};
pub use gradient::{
    compute_gradient, marginal_price, objective, voltage_extremes, voltage_violation,
    BarrierProblem, GradientState, PhaseGeometry,
};
pub use types::{
    BarrierWeights, ControlMode, ControlOutcome, ControlReport, ControlSettings, EnabledKinds,
    InnerReport, InnerStatus, ObjectiveCoefficients, VoltageBounds,
};
