use std::fmt;

use anyhow::Result;

use crate::{
    cache::{AccessEvent, AccessKind, AccessOutcome, Cache, Counters},
    common::{EventKind, ExecuteMode, SimulationOption},
    config::CacheConfig,
    trace::{OpKind, TraceError, TraceRecord},
};

#[cfg(feature = "stat")]
use crate::stat::{AddStats, Stats};

/// accesses made on behalf of one trace record, in order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecordOutcome {
    events: [Option<AccessEvent>; 2],
}

impl RecordOutcome {
    fn push(&mut self, event: AccessEvent) {
        if let Some(slot) = self.events.iter_mut().find(|e| e.is_none()) {
            *slot = Some(event);
        }
    }
    pub fn events(&self) -> impl Iterator<Item = &AccessEvent> {
        self.events.iter().flatten()
    }
    pub fn outcomes(&self) -> impl Iterator<Item = AccessOutcome> + '_ {
        self.events().map(|e| e.outcome)
    }
    /// true for records that never reached the cache.
    pub fn is_empty(&self) -> bool {
        self.events[0].is_none()
    }
}

impl fmt::Display for RecordOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, o) in self.outcomes().enumerate() {
            if i != 0 {
                write!(f, " ")?;
            }
            write!(f, "{o}")?;
        }
        Ok(())
    }
}

pub enum BreakReason {
    StepEnded,
    BreakPoint(usize),
    Watch {
        record_index: usize,
        set_index: usize,
        event: EventKind,
    },
}

pub enum ControlFlow {
    Break(BreakReason),
    /// the trace is exhausted.
    Exit,
}

pub struct Simulator {
    cache: Cache,
    record_index: usize,
    /// breakpoint the last run stopped at, passed over when resuming.
    last_break: Option<usize>,
    #[cfg(feature = "stat")]
    record_stat: stat::RecordStat,
}

impl Simulator {
    pub fn new(config: CacheConfig) -> Result<Self> {
        log::info!("cache config: {config}");
        Ok(Self {
            cache: Cache::new(config)?,
            record_index: 0,
            last_break: None,
            #[cfg(feature = "stat")]
            record_stat: Default::default(),
        })
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }
    pub fn counters(&self) -> Counters {
        self.cache.counters()
    }
    /// index of the next record to execute.
    pub fn record_index(&self) -> usize {
        self.record_index
    }

    /// applies one record to the cache.
    ///
    /// a modify is a load followed by a store of the same address; the store
    /// sees the line the load just brought in and therefore always hits.
    pub fn step(&mut self, record: &TraceRecord) -> RecordOutcome {
        self.record_index += 1;
        self.count(Some(record.kind));
        let mut outcome = RecordOutcome::default();
        let addr = record.addr;
        match record.kind {
            OpKind::Instruction => {}
            OpKind::Load => outcome.push(self.cache.access_detailed(addr, AccessKind::Load)),
            OpKind::Store => outcome.push(self.cache.access_detailed(addr, AccessKind::Store)),
            OpKind::Modify => {
                outcome.push(self.cache.access_detailed(addr, AccessKind::Load));
                outcome.push(self.cache.access_detailed(addr, AccessKind::Store));
            }
        }
        outcome
    }

    /// executes records until the trace ends or `opt` asks to stop.
    ///
    /// malformed records are skipped; a read error ends the run with `Err`.
    pub fn run<I>(
        &mut self,
        records: &mut I,
        opt: &SimulationOption,
        mut on_record: impl FnMut(usize, &TraceRecord, &RecordOutcome),
    ) -> Result<ControlFlow>
    where
        I: Iterator<Item = Result<TraceRecord, TraceError>>,
    {
        let mut executed = 0;
        loop {
            if executed != 0 {
                if let ExecuteMode::RunStep(s) = opt.mode {
                    if executed >= s.get_step() {
                        break Ok(ControlFlow::Break(BreakReason::StepEnded));
                    }
                }
            }
            let at = self.record_index;
            if opt.breakpoints.contains(&at) && (executed != 0 || self.last_break != Some(at)) {
                self.last_break = Some(at);
                break Ok(ControlFlow::Break(BreakReason::BreakPoint(at)));
            }
            let record = match records.next() {
                None => break Ok(ControlFlow::Exit),
                Some(Ok(record)) => record,
                Some(Err(e)) if !e.is_fatal() => {
                    self.skip(&e);
                    continue;
                }
                Some(Err(e)) => break Err(e.into()),
            };
            let index = self.record_index;
            let outcome = self.step(&record);
            executed += 1;
            on_record(index, &record, &outcome);
            if let Some(reason) = watched(opt, index, &outcome) {
                break Ok(ControlFlow::Break(reason));
            }
        }
    }

    /// replays a whole trace and returns the final counters.
    pub fn replay<I>(
        &mut self,
        records: I,
        on_record: impl FnMut(usize, &TraceRecord, &RecordOutcome),
    ) -> Result<Counters>
    where
        I: IntoIterator<Item = Result<TraceRecord, TraceError>>,
    {
        let mut records = records.into_iter();
        let opt = SimulationOption::default();
        self.run(&mut records, &opt, on_record)?;
        let counters = self.counters();
        log::info!("replayed {} records: {counters}", self.record_index);
        Ok(counters)
    }

    fn skip(&mut self, e: &TraceError) {
        log::warn!("skipping record: {e}");
        self.count(None);
    }

    fn count(&mut self, kind: Option<OpKind>) {
        cfg_if::cfg_if! {
            if #[cfg(feature = "stat")] {
                self.record_stat.count(kind);
            } else {
                let _ = kind;
            }
        }
    }

    #[cfg(feature = "stat")]
    pub fn collect_stat(&self) -> Stats {
        let mut ss = Stats::default();
        self.add_stats(&mut ss);
        ss
    }
}

fn watched(opt: &SimulationOption, record_index: usize, outcome: &RecordOutcome) -> Option<BreakReason> {
    outcome.events().find_map(|e| {
        let watching = opt.watchings.get(&e.set_index)?;
        let event = *watching & EventKind::from(e.outcome);
        if event.is_none() {
            return None;
        }
        Some(BreakReason::Watch {
            record_index,
            set_index: e.set_index,
            event,
        })
    })
}

#[cfg(feature = "stat")]
impl AddStats for Simulator {
    fn add_stats(&self, buf: &mut Stats) {
        self.cache.add_stats(buf);
        buf.push(Box::new(self.record_stat));
    }
}

#[cfg(feature = "stat")]
mod stat {
    use std::fmt;

    use crate::{stat::*, trace::OpKind};

    #[derive(Default, Clone, Copy)]
    pub struct RecordStat {
        load: usize,
        store: usize,
        modify: usize,
        instruction: usize,
        skipped: usize,
    }

    impl RecordStat {
        /// `None` counts a skipped malformed record.
        pub fn count(&mut self, kind: Option<OpKind>) {
            match kind {
                Some(OpKind::Load) => self.load += 1,
                Some(OpKind::Store) => self.store += 1,
                Some(OpKind::Modify) => self.modify += 1,
                Some(OpKind::Instruction) => self.instruction += 1,
                None => self.skipped += 1,
            }
        }
    }

    impl Stat for RecordStat {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(RecordStatView { stat: self })
        }
    }

    pub struct RecordStatView<'a> {
        stat: &'a RecordStat,
    }

    impl StatView for RecordStatView<'_> {
        fn header(&self) -> &'static str {
            "trace records (format: `count (share of records)`)"
        }
        fn width(&self) -> usize {
            40
        }
    }

    impl fmt::Display for RecordStatView<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let s = self.stat;
            let total = s.load + s.store + s.modify + s.instruction + s.skipped;
            macro_rules! output {
                ($kind:ident => $name:expr) => {{
                    let n = s.$kind;
                    let pct = percent(n, total);
                    writeln!(f, "  {:>11}: {n:>10} ({pct:>10}%)", $name)
                }};
            }
            output!(load => "load")?;
            output!(store => "store")?;
            output!(modify => "modify")?;
            output!(instruction => "instruction")?;
            let n = s.skipped;
            write!(f, "  {:>11}: {n:>10}", "skipped")
        }
    }
}
