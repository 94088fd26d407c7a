use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use bitmask_enum::bitmask;

use crate::cache::AccessOutcome;

#[derive(Default, Clone, Copy)]
pub struct RunStep {
    step: Option<usize>,
}

impl RunStep {
    pub fn new(step: Option<usize>) -> Self {
        Self { step }
    }

    pub fn get_step(&self) -> usize {
        self.step.unwrap_or(1)
    }
}

#[derive(Default, Clone, Copy)]
pub enum ExecuteMode {
    #[default]
    Run,
    RunStep(RunStep),
}

impl fmt::Display for ExecuteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecuteMode::Run => write!(f, "running simply"),
            ExecuteMode::RunStep(r) => {
                write!(f, "step execution by {}", r.get_step())
            }
        }
    }
}

/// what an access to a watched set may trigger on.
#[bitmask(u8)]
pub enum EventKind {
    Hit,
    Miss,
    Eviction,
}

impl From<AccessOutcome> for EventKind {
    fn from(o: AccessOutcome) -> Self {
        match o {
            AccessOutcome::Hit => EventKind::Hit,
            AccessOutcome::Miss => EventKind::Miss,
            AccessOutcome::MissWithEviction { .. } => EventKind::Miss | EventKind::Eviction,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (EventKind::Hit, "hit"),
            (EventKind::Miss, "miss"),
            (EventKind::Eviction, "eviction"),
        ];
        let mut first = true;
        for (k, name) in names {
            if self.contains(k) {
                if !first {
                    write!(f, "/")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        if first {
            write!(f, "nothing")?;
        }
        Ok(())
    }
}

/// options steering `Simulator::run`.
#[derive(Default)]
pub struct SimulationOption {
    /// report every record's outcome
    pub do_trace: bool,
    pub mode: ExecuteMode,
    /// stop before executing the record with this index
    pub breakpoints: BTreeSet<usize>,
    /// stop after an access to the set raised one of the events
    pub watchings: BTreeMap<usize, EventKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_from_outcome() {
        let e: EventKind = AccessOutcome::Hit.into();
        assert!(e == EventKind::Hit);
        let e: EventKind = AccessOutcome::MissWithEviction { evicted: 3 }.into();
        assert!(e.contains(EventKind::Miss));
        assert!(e.contains(EventKind::Eviction));
        assert!(!e.contains(EventKind::Hit));
    }
    #[test]
    fn test_event_kind_display() {
        assert_eq!("miss/eviction", (EventKind::Miss | EventKind::Eviction).to_string());
        assert_eq!("nothing", EventKind::none().to_string());
    }
}
