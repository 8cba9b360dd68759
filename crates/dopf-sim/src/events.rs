//! Time-ordered queue of simulation actions.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

use dopf_core::Load;

/// What to do when an event fires.
///
/// Events at the same time run in the order of [`Action::code`].
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Detach the named electric vehicle at its deadline
    DeleteLoad { name: String },
    /// Attach an electric vehicle at its plug-in time
    AddLoad(Box<Load>),
    /// Read the next day's load file
    LoadFutureData,
    SlowControl,
    FastControl,
    /// Refresh the model to the next load-file sample
    UpdateToTime,
}

impl Action {
    pub fn code(&self) -> u8 {
        match self {
            Action::DeleteLoad { .. } => 0,
            Action::AddLoad(_) => 1,
            Action::LoadFutureData => 2,
            Action::SlowControl => 3,
            Action::FastControl => 4,
            Action::UpdateToTime => 5,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::DeleteLoad { name } => write!(f, "delete_load({})", name),
            Action::AddLoad(load) => write!(f, "add_load({})", load.name),
            Action::LoadFutureData => write!(f, "load_future_data"),
            Action::SlowControl => write!(f, "slow_control"),
            Action::FastControl => write!(f, "fast_control"),
            Action::UpdateToTime => write!(f, "update_to_time"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Minutes since the start of the simulation
    pub time: f64,
    pub action: Action,
}

impl Event {
    pub fn new(time: f64, action: Action) -> Self {
        Self { time, action }
    }
}

/// Heap entry ordered so the earliest event is the greatest.
#[derive(Debug)]
struct Pending(Event);

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .time
            .total_cmp(&self.0.time)
            .then_with(|| other.0.action.code().cmp(&self.0.action.code()))
    }
}

/// Min-heap of events that drops anything scheduled at or after `end_time`.
#[derive(Debug)]
pub struct EventQueue {
    heap: BinaryHeap<Pending>,
    end_time: f64,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(f64::INFINITY)
    }
}

impl EventQueue {
    pub fn new(end_time: f64) -> Self {
        Self {
            heap: BinaryHeap::new(),
            end_time,
        }
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn set_end_time(&mut self, end_time: f64) {
        self.end_time = end_time;
    }

    /// Returns false when the event falls outside the horizon.
    pub fn push(&mut self, event: Event) -> bool {
        if event.time < self.end_time {
            self.heap.push(Pending(event));
            true
        } else {
            false
        }
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop().map(|pending| pending.0)
    }

    pub fn peek(&self) -> Option<&Event> {
        self.heap.peek().map(|pending| &pending.0)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pops_by_time_then_code() {
        let mut queue = EventQueue::new(100.0);
        queue.push(Event::new(5.0, Action::UpdateToTime));
        queue.push(Event::new(0.0, Action::UpdateToTime));
        queue.push(Event::new(0.0, Action::FastControl));
        queue.push(Event::new(0.0, Action::SlowControl));
        queue.push(Event::new(
            5.0,
            Action::DeleteLoad {
                name: "ev1".into(),
            },
        ));

        let order: Vec<(f64, u8)> = std::iter::from_fn(|| queue.pop())
            .map(|event| (event.time, event.action.code()))
            .collect();
        assert_eq!(order, vec![(0.0, 3), (0.0, 4), (0.0, 5), (5.0, 0), (5.0, 5)]);
    }

    #[test]
    fn test_drops_events_past_end() {
        let mut queue = EventQueue::new(1440.0);
        assert!(queue.push(Event::new(1439.0, Action::FastControl)));
        assert!(!queue.push(Event::new(1440.0, Action::FastControl)));
        assert_eq!(queue.len(), 1);
    }
}
