//! Discrete-event driver tying the model, the controller and the load data
//! together.
//!
//! ```text
//! t = 0     FastControl, SlowControl, UpdateToTime
//! t = 1440 − window·60   LoadFutureData (then every 1440)
//! plug-in   AddLoad        deadline   DeleteLoad
//! ```
//!
//! Whenever an event lies later than the current time the model first
//! advances to it, taking fresh samples for base loads and panels and
//! crediting vehicles with the energy delivered in between.

use anyhow::{Context, Result};
use dopf_algo::opf::{ControlMode, ControlReport, NetworkControl};
use dopf_algo::power_flow::{initialize_model_voltages, solve_model};
use dopf_core::{Load, LoadId, NetworkModel};
use dopf_io::{read_info, read_load_file, read_network, LoadFile, LoadFileInfo, LoadFileOptions};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SimulationConfig;
use crate::events::{Action, Event, EventQueue};
use crate::future_data::{fetch_real_time_data, FutureData};
use crate::predictor::make_prediction;

/// Minutes per day.
const DAY: f64 = 1440.0;
/// Number of distinct day files, used round-robin.
const DAY_FILES: usize = 3;

/// What a caller should do after an event ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventOutcome {
    NoAction,
    /// Time advanced or a control acted; views of the model are stale
    NeedsRefresh,
    QueueEmpty,
}

/// Totals of a finished run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationSummary {
    pub events: usize,
    pub fast_controls: usize,
    pub slow_controls: usize,
    /// Control actions that could not reach a feasible start
    pub infeasible: usize,
    pub end_time: f64,
    pub objective: f64,
}

pub struct Simulator {
    config: SimulationConfig,
    model: NetworkModel,
    control: NetworkControl,
    future_data: FutureData,
    events: EventQueue,
    info: LoadFileInfo,
    current_time: f64,
    /// Day file read by the next `LoadFutureData`, in 1..=3
    next_day_file: usize,
    summary: SimulationSummary,
    last_report: Option<ControlReport>,
}

fn day_file_name(day: usize) -> String {
    format!("loadOnDay{}.txt", day)
}

impl Simulator {
    /// Read the input folder and schedule the first events.
    pub fn initialize(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let dir = config.input_dir.clone();

        let mut model = read_network(&dir.join("network.txt"))?;
        model.substation_voltage = config.grid.substation_voltage;
        let info = read_info(&dir.join("info.txt"))?;

        let mut events = EventQueue::new(config.end_time());
        let mut future_data = FutureData::new();
        let day = read_load_file(&dir.join(day_file_name(1)), &model, Self::load_options(&config, 0.0))?;
        let LoadFile { profiles, vehicles } = day;
        for profile in profiles {
            future_data.extend(&profile.load.name, profile.samples);
            model
                .add_load(profile.load)
                .context("attaching load from day 1")?;
        }
        schedule_vehicles(&mut events, vehicles);

        // loads start from their samples at time zero
        fetch_real_time_data(&mut model, &mut future_data, 0.0, 0.0);

        let control = NetworkControl::new(&model, config.num_slots(), config.slow.period_minutes)?
            .with_settings(config.control.clone())
            .with_conventions(config.grid.clone())
            .with_objective(config.objective)
            .with_enabled_kinds(ControlMode::Fast, config.enabled_kinds(ControlMode::Fast))
            .with_enabled_kinds(ControlMode::Slow, config.enabled_kinds(ControlMode::Slow));

        if config.fast.enabled {
            events.push(Event::new(0.0, Action::FastControl));
        }
        if config.slow.enabled {
            events.push(Event::new(0.0, Action::SlowControl));
        }
        events.push(Event::new(0.0, Action::UpdateToTime));
        events.push(Event::new(
            DAY - config.slow.prediction_window_hours * 60.0,
            Action::LoadFutureData,
        ));

        initialize_model_voltages(&mut model, &config.grid);
        info!(
            buses = model.num_buses(),
            slots = control.num_slots(),
            events = events.len(),
            "simulation initialized"
        );

        Ok(Self {
            config,
            model,
            control,
            future_data,
            events,
            info,
            current_time: 0.0,
            next_day_file: 2,
            summary: SimulationSummary::default(),
            last_report: None,
        })
    }

    fn load_options(config: &SimulationConfig, offset_minutes: f64) -> LoadFileOptions {
        LoadFileOptions {
            offset_minutes,
            slow_period_minutes: config.slow.period_minutes,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn model(&self) -> &NetworkModel {
        &self.model
    }

    pub fn control(&self) -> &NetworkControl {
        &self.control
    }

    pub fn future_data(&self) -> &FutureData {
        &self.future_data
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub fn info(&self) -> &LoadFileInfo {
        &self.info
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Report of the most recent fast or slow control action.
    pub fn last_report(&self) -> Option<&ControlReport> {
        self.last_report.as_ref()
    }

    /// Sum over phases of the squared real substation injection.
    pub fn objective_value(&self) -> f64 {
        self.model
            .buses()
            .first()
            .map_or(0.0, |root| {
                root.aggregate_load
                    .power
                    .iter()
                    .map(|s| s.re * s.re)
                    .sum()
            })
    }

    /// Pop and run the earliest event.
    pub fn execute_event(&mut self) -> Result<EventOutcome> {
        let Some(event) = self.events.pop() else {
            self.future_data.clear();
            return Ok(EventOutcome::QueueEmpty);
        };
        debug!(time = event.time, action = %event.action, "executing event");
        self.summary.events += 1;

        let mut outcome = if event.time > self.current_time {
            self.update_to_time(event.time);
            EventOutcome::NeedsRefresh
        } else {
            EventOutcome::NoAction
        };

        let time = event.time;
        match event.action {
            Action::FastControl => {
                let report = self.control.fast_control(&mut self.model)?;
                self.record(report);
                self.summary.fast_controls += 1;
                self.solve()?;
                self.events.push(Event::new(
                    time + self.config.fast.period_seconds / 60.0,
                    Action::FastControl,
                ));
                outcome = EventOutcome::NeedsRefresh;
            }
            Action::SlowControl => {
                make_prediction(
                    &self.model,
                    &mut self.control,
                    &self.future_data,
                    time,
                    self.config.slow.period_minutes,
                );
                let report = self.control.slow_control(&mut self.model, time)?;
                self.record(report);
                self.summary.slow_controls += 1;
                self.solve()?;
                self.events.push(Event::new(
                    time + self.config.slow.period_minutes,
                    Action::SlowControl,
                ));
                outcome = EventOutcome::NeedsRefresh;
            }
            Action::UpdateToTime => {
                self.solve()?;
                self.events.push(Event::new(
                    time + self.info.slot_length_minutes,
                    Action::UpdateToTime,
                ));
            }
            Action::AddLoad(load) => {
                let name = load.name.clone();
                let id = self
                    .model
                    .add_load(*load)
                    .with_context(|| format!("plugging in '{}'", name))?;
                if let Some(load) = self.model.load(id) {
                    self.control.add_load(id, load);
                }
                debug!(load = %name, time, "vehicle plugged in");
            }
            Action::DeleteLoad { name } => match self.vehicle_leaving(&name, time) {
                Some(id) => {
                    self.model.delete_load(id);
                    self.control.delete_load(id);
                    debug!(load = %name, time, "vehicle left");
                }
                None => warn!(load = %name, time, "load to delete is not attached"),
            },
            Action::LoadFutureData => {
                self.add_load_data()?;
                self.events
                    .push(Event::new(time + DAY, Action::LoadFutureData));
            }
        }
        Ok(outcome)
    }

    /// Run every remaining event.
    pub fn run(&mut self) -> Result<SimulationSummary> {
        while self.execute_event()? != EventOutcome::QueueEmpty {}
        self.summary.end_time = self.current_time;
        self.summary.objective = self.objective_value();
        info!(
            events = self.summary.events,
            objective = self.summary.objective,
            "simulation finished"
        );
        Ok(self.summary.clone())
    }

    fn record(&mut self, report: ControlReport) {
        if report.is_optimized() {
            debug!(mode = %report.mode, objective = report.objective, "control applied");
        } else {
            self.summary.infeasible += 1;
        }
        self.last_report = Some(report);
    }

    fn update_to_time(&mut self, time: f64) {
        fetch_real_time_data(&mut self.model, &mut self.future_data, self.current_time, time);
        self.current_time = time;
    }

    fn solve(&mut self) -> Result<()> {
        solve_model(&mut self.model, &self.config.grid, &self.config.control.sweep)?;
        Ok(())
    }

    /// The vehicle named `name` whose deadline is `time`, or any load of that name.
    fn vehicle_leaving(&self, name: &str, time: f64) -> Option<LoadId> {
        self.model
            .loads()
            .find(|(_, load)| {
                load.name == name
                    && load
                        .electric_vehicle()
                        .map_or(false, |ev| ev.deadline == time)
            })
            .map(|(id, _)| id)
            .or_else(|| self.model.load_id(name))
    }

    /// Read the next day file, shifted to the day after the current one.
    fn add_load_data(&mut self) -> Result<()> {
        let day_index = (self.current_time / DAY) as usize + 1;
        let offset = DAY * day_index as f64;
        let path = self.config.input_dir.join(day_file_name(self.next_day_file));
        let day = read_load_file(&path, &self.model, Self::load_options(&self.config, offset))?;
        self.next_day_file = self.next_day_file % DAY_FILES + 1;

        for profile in day.profiles {
            self.future_data
                .extend(&profile.load.name, profile.samples);
        }
        schedule_vehicles(&mut self.events, day.vehicles);
        info!(path = %path.display(), offset, "loaded future data");
        Ok(())
    }
}

fn schedule_vehicles(events: &mut EventQueue, vehicles: Vec<Load>) {
    for vehicle in vehicles {
        let Some(ev) = vehicle.electric_vehicle() else {
            continue;
        };
        let (plug_in, deadline) = (ev.plug_in_time, ev.deadline);
        events.push(Event::new(
            deadline,
            Action::DeleteLoad {
                name: vehicle.name.clone(),
            },
        ));
        events.push(Event::new(plug_in, Action::AddLoad(Box::new(vehicle))));
    }
}
