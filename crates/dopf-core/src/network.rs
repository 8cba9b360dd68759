//! Arena-backed radial network model.
//!
//! Buses, lines and loads live in vectors and refer to each other through the
//! newtype handles [`BusId`], [`LineId`] and [`LoadId`]. After
//! [`NetworkModel::sort_by_breadth_first_search`] the arenas are physically in
//! BFS order:
//!
//! ```text
//!   bus 0 = substation
//!   line k feeds bus k + 1
//!   every parent bus precedes its children
//! ```
//!
//! so backward passes iterate buses from last to 1 and forward passes from 1
//! to last.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::device::Load;
use crate::error::{DopfError, DopfResult};
use crate::graph_utils;
use crate::linalg::{ColumnVector, SquareMatrix, C64};
use crate::load_value::LoadValue;
use crate::phase::PhaseSet;
use crate::{BusId, Coordinate, LineId, LoadId};

/// Role of a bus in the feeder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusKind {
    /// Root of the tree; exactly one per network
    Substation,
    /// Customer bus with voltage box constraints
    House,
    /// Intermediate junction
    Bus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Line,
    Transformer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bus {
    pub name: String,
    pub phase: PhaseSet,
    pub kind: BusKind,
    pub coordinate: Coordinate,
    pub shunt: SquareMatrix<C64>,
    pub aggregate_load: LoadValue,
    pub voltage: ColumnVector<C64>,
    from_line: Option<LineId>,
    to_lines: Vec<LineId>,
    loads: Vec<LoadId>,
    phase_indices_in_parent: Vec<usize>,
}

impl Bus {
    pub fn new(name: impl Into<String>, phase: PhaseSet, kind: BusKind) -> Self {
        Self {
            name: name.into(),
            shunt: SquareMatrix::new(&phase),
            aggregate_load: LoadValue::new(&phase),
            voltage: ColumnVector::new(&phase),
            phase,
            kind,
            coordinate: Coordinate::default(),
            from_line: None,
            to_lines: Vec::new(),
            loads: Vec::new(),
            phase_indices_in_parent: Vec::new(),
        }
    }

    pub fn with_shunt(mut self, shunt: SquareMatrix<C64>) -> Self {
        self.shunt = shunt;
        self
    }

    pub fn with_coordinate(mut self, coordinate: Coordinate) -> Self {
        self.coordinate = coordinate;
        self
    }

    /// Upstream line; `None` for the substation.
    pub fn from_line(&self) -> Option<LineId> {
        self.from_line
    }

    pub fn to_lines(&self) -> &[LineId] {
        &self.to_lines
    }

    pub fn loads(&self) -> &[LoadId] {
        &self.loads
    }

    pub fn phase_indices_in_parent(&self) -> &[usize] {
        &self.phase_indices_in_parent
    }

    /// House buses carry voltage box constraints.
    pub fn is_voltage_constrained(&self) -> bool {
        self.kind == BusKind::House
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub name: String,
    pub phase: PhaseSet,
    pub kind: LineKind,
    pub impedance: SquareMatrix<C64>,
    pub current: ColumnVector<C64>,
    pub from: BusId,
    pub to: BusId,
    phase_indices_in_from_bus: Vec<usize>,
}

impl Line {
    pub fn new(
        name: impl Into<String>,
        phase: PhaseSet,
        kind: LineKind,
        from: BusId,
        to: BusId,
        impedance: SquareMatrix<C64>,
    ) -> Self {
        Self {
            name: name.into(),
            current: ColumnVector::new(&phase),
            phase,
            kind,
            impedance,
            from,
            to,
            phase_indices_in_from_bus: Vec::new(),
        }
    }

    pub fn phase_indices_in_from_bus(&self) -> &[usize] {
        &self.phase_indices_in_from_bus
    }
}

/// Radial multi-phase distribution network.
#[derive(Debug, Clone, Default)]
pub struct NetworkModel {
    buses: Vec<Bus>,
    lines: Vec<Line>,
    loads: Vec<Option<Load>>,
    bus_names: HashMap<String, BusId>,
    /// Substation voltage magnitude in per unit.
    pub substation_voltage: f64,
    sorted: bool,
}

impl NetworkModel {
    pub fn new() -> Self {
        Self {
            substation_voltage: 1.0,
            ..Self::default()
        }
    }

    pub fn add_bus(&mut self, bus: Bus) -> DopfResult<BusId> {
        if self.bus_names.contains_key(&bus.name) {
            return Err(DopfError::Validation(format!(
                "duplicate bus name '{}'",
                bus.name
            )));
        }
        let id = BusId::new(self.buses.len());
        self.bus_names.insert(bus.name.clone(), id);
        self.buses.push(bus);
        self.sorted = false;
        Ok(id)
    }

    pub fn add_line(&mut self, line: Line) -> DopfResult<LineId> {
        for end in [line.from, line.to] {
            if end.value() >= self.buses.len() {
                return Err(DopfError::Validation(format!(
                    "line '{}' refers to unknown bus {}",
                    line.name,
                    end.value()
                )));
            }
        }
        let id = LineId::new(self.lines.len());
        self.lines.push(line);
        self.sorted = false;
        Ok(id)
    }

    /// Attach a load to its location bus, reusing a freed arena slot when one exists.
    pub fn add_load(&mut self, mut load: Load) -> DopfResult<LoadId> {
        let bus = self.buses.get_mut(load.location.value()).ok_or_else(|| {
            DopfError::Validation(format!(
                "load '{}' refers to unknown bus {}",
                load.name,
                load.location.value()
            ))
        })?;
        load.phase_indices_in_location_bus = load.phase.indices_in(&bus.phase)?;

        let id = match self.loads.iter().position(Option::is_none) {
            Some(free) => {
                self.loads[free] = Some(load);
                LoadId::new(free)
            }
            None => {
                self.loads.push(Some(load));
                LoadId::new(self.loads.len() - 1)
            }
        };
        bus.loads.push(id);
        Ok(id)
    }

    /// Detach and return a load. Returns `None` for a handle that is not live.
    pub fn delete_load(&mut self, id: LoadId) -> Option<Load> {
        let load = self.loads.get_mut(id.value())?.take()?;
        let bus = &mut self.buses[load.location.value()];
        match bus.loads.iter().position(|&attached| attached == id) {
            Some(position) => {
                bus.loads.remove(position);
            }
            None => warn!(load = %load.name, bus = %bus.name, "load to delete is not attached to its bus"),
        }
        Some(load)
    }

    pub fn bus_id(&self, name: &str) -> Option<BusId> {
        self.bus_names.get(name).copied()
    }

    pub fn load_id(&self, name: &str) -> Option<LoadId> {
        self.loads
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|load| load.name == name))
            .map(LoadId::new)
    }

    #[inline]
    pub fn num_buses(&self) -> usize {
        self.buses.len()
    }

    #[inline]
    pub fn num_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn bus(&self, id: BusId) -> &Bus {
        &self.buses[id.value()]
    }

    pub fn bus_mut(&mut self, id: BusId) -> &mut Bus {
        &mut self.buses[id.value()]
    }

    pub fn line(&self, id: LineId) -> &Line {
        &self.lines[id.value()]
    }

    pub fn line_mut(&mut self, id: LineId) -> &mut Line {
        &mut self.lines[id.value()]
    }

    pub fn load(&self, id: LoadId) -> Option<&Load> {
        self.loads.get(id.value()).and_then(Option::as_ref)
    }

    pub fn load_mut(&mut self, id: LoadId) -> Option<&mut Load> {
        self.loads.get_mut(id.value()).and_then(Option::as_mut)
    }

    /// Live loads with their handles.
    pub fn loads(&self) -> impl Iterator<Item = (LoadId, &Load)> {
        self.loads
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|load| (LoadId::new(index), load)))
    }

    pub fn loads_mut(&mut self) -> impl Iterator<Item = (LoadId, &mut Load)> {
        self.loads
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_mut().map(|load| (LoadId::new(index), load)))
    }

    /// Size of the load arena including freed slots.
    pub fn load_capacity(&self) -> usize {
        self.loads.len()
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// The substation of a sorted network.
    pub fn substation(&self) -> DopfResult<&Bus> {
        if !self.sorted {
            return Err(DopfError::Topology(
                "network must be sorted before locating the substation".into(),
            ));
        }
        self.buses
            .first()
            .ok_or_else(|| DopfError::Topology("network has no buses".into()))
    }

    /// Shunt plus the phase-aligned sum of every load attached to `id`.
    pub fn aggregate_load_on_bus(&self, id: BusId) -> LoadValue {
        let bus = &self.buses[id.value()];
        let mut aggregate = LoadValue {
            admittance: bus.shunt.clone(),
            power: ColumnVector::new(&bus.phase),
        };
        for load in bus.loads.iter().filter_map(|&load| self.load(load)) {
            aggregate.add_to_indices(&load.value, &load.phase_indices_in_location_bus);
        }
        aggregate
    }

    /// Recompute the aggregate load of every non-substation bus.
    pub fn compute_aggregate_loads(&mut self) {
        for index in 1..self.buses.len() {
            self.buses[index].aggregate_load = self.aggregate_load_on_bus(BusId::new(index));
        }
    }

    /// Reorder buses and lines breadth-first from the unique substation.
    ///
    /// Lines are reoriented so `from` is the upstream bus, then every
    /// handle (line ends, parent/child links, load locations, the name map)
    /// is remapped to the new order and all phase-index mappings are
    /// recomputed.
    pub fn sort_by_breadth_first_search(&mut self) -> DopfResult<()> {
        let substations: Vec<usize> = self
            .buses
            .iter()
            .enumerate()
            .filter(|(_, bus)| bus.kind == BusKind::Substation)
            .map(|(index, _)| index)
            .collect();
        if substations.len() != 1 {
            return Err(DopfError::Topology(format!(
                "expected exactly one substation, found {}",
                substations.len()
            )));
        }
        graph_utils::ensure_radial(self)?;

        let root = substations[0];
        let mut bus_order = vec![root];
        let mut line_order = Vec::with_capacity(self.lines.len());
        let mut remaining: Vec<usize> = (0..self.lines.len()).collect();
        let mut queue = VecDeque::from([root]);

        while let Some(bus) = queue.pop_front() {
            let mut unvisited = Vec::with_capacity(remaining.len());
            for index in remaining {
                let line = &mut self.lines[index];
                if line.to.value() == bus {
                    std::mem::swap(&mut line.from, &mut line.to);
                }
                if line.from.value() == bus {
                    let next = line.to.value();
                    line_order.push(index);
                    bus_order.push(next);
                    queue.push_back(next);
                } else {
                    unvisited.push(index);
                }
            }
            remaining = unvisited;
        }

        if bus_order.len() != self.buses.len() || !remaining.is_empty() {
            let mut reached = vec![false; self.buses.len()];
            bus_order.iter().for_each(|&index| reached[index] = true);
            let stranded: Vec<&str> = self
                .buses
                .iter()
                .zip(&reached)
                .filter(|(_, &hit)| !hit)
                .map(|(bus, _)| bus.name.as_str())
                .collect();
            return Err(DopfError::Disconnected(format!(
                "{} buses and {} lines unreachable from the substation: {:?}",
                stranded.len(),
                remaining.len(),
                stranded
            )));
        }

        let mut new_index = vec![0usize; self.buses.len()];
        for (position, &old) in bus_order.iter().enumerate() {
            new_index[old] = position;
        }

        self.buses = reorder(std::mem::take(&mut self.buses), &bus_order)?;
        self.lines = reorder(std::mem::take(&mut self.lines), &line_order)?;
        for line in &mut self.lines {
            line.from = BusId::new(new_index[line.from.value()]);
            line.to = BusId::new(new_index[line.to.value()]);
        }
        for load in self.loads.iter_mut().flatten() {
            load.location = BusId::new(new_index[load.location.value()]);
        }
        self.bus_names = self
            .buses
            .iter()
            .enumerate()
            .map(|(index, bus)| (bus.name.clone(), BusId::new(index)))
            .collect();

        self.link_and_map_phases()?;
        self.sorted = true;
        debug!(
            buses = self.buses.len(),
            lines = self.lines.len(),
            "network sorted breadth-first"
        );
        Ok(())
    }

    fn link_and_map_phases(&mut self) -> DopfResult<()> {
        for bus in &mut self.buses {
            bus.from_line = None;
            bus.to_lines.clear();
            bus.phase_indices_in_parent.clear();
        }
        for index in 0..self.lines.len() {
            let id = LineId::new(index);
            let (from, to) = (self.lines[index].from.value(), self.lines[index].to.value());
            let from_phase = self.buses[from].phase.clone();
            let line = &mut self.lines[index];
            if line.phase != self.buses[to].phase {
                return Err(DopfError::PhaseMismatch(format!(
                    "line '{}' has phase '{}' but feeds bus '{}' with phase '{}'",
                    line.name, line.phase, self.buses[to].name, self.buses[to].phase
                )));
            }
            line.phase_indices_in_from_bus = line.phase.indices_in(&from_phase)?;

            self.buses[from].to_lines.push(id);
            let child = &mut self.buses[to];
            child.from_line = Some(id);
            child.phase_indices_in_parent = child.phase.indices_in(&from_phase)?;
        }
        for load in self.loads.iter_mut().flatten() {
            load.phase_indices_in_location_bus =
                load.phase.indices_in(&self.buses[load.location.value()].phase)?;
        }
        Ok(())
    }
}

fn reorder<T>(items: Vec<T>, order: &[usize]) -> DopfResult<Vec<T>> {
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    order
        .iter()
        .map(|&index| {
            slots[index]
                .take()
                .ok_or_else(|| DopfError::Topology(format!("element {index} visited twice")))
        })
        .collect()
}
