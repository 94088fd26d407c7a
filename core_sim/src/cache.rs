use std::{collections::TryReserveError, fmt};

use serde::Serialize;
use thiserror::Error;

use crate::{
    addr::{Addr, AddressDecoder},
    config::CacheConfig,
    set::{CacheSet, Lookup},
};

#[cfg(feature = "stat")]
use crate::stat::{AddStats, Stats};

#[derive(Error, Debug)]
pub enum CacheAllocError {
    #[error("cannot allocate table of {num_sets} sets")]
    SetTable {
        num_sets: usize,
        #[source]
        source: TryReserveError,
    },
    #[error("cannot allocate {associativity} lines for set {set_index}")]
    Lines {
        set_index: usize,
        associativity: usize,
        #[source]
        source: TryReserveError,
    },
}

/// kind of a single cache access. both behave the same for occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Load,
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    Hit,
    Miss,
    MissWithEviction { evicted: u64 },
}

impl fmt::Display for AccessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessOutcome::Hit => write!(f, "hit"),
            AccessOutcome::Miss => write!(f, "miss"),
            AccessOutcome::MissWithEviction { .. } => write!(f, "miss eviction"),
        }
    }
}

/// outcome of one access together with where it landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessEvent {
    pub kind: AccessKind,
    pub addr: Addr,
    pub set_index: usize,
    pub tag: u64,
    pub outcome: AccessOutcome,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub hits: usize,
    pub misses: usize,
    pub evictions: usize,
}

impl Counters {
    pub fn accesses(&self) -> usize {
        self.hits + self.misses
    }
    fn record(&mut self, outcome: AccessOutcome) {
        match outcome {
            AccessOutcome::Hit => self.hits += 1,
            AccessOutcome::Miss => self.misses += 1,
            AccessOutcome::MissWithEviction { .. } => {
                self.misses += 1;
                self.evictions += 1;
            }
        }
    }
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits:{} misses:{} evictions:{}",
            self.hits, self.misses, self.evictions
        )
    }
}

pub struct Cache {
    config: CacheConfig,
    decoder: AddressDecoder,
    sets: Vec<CacheSet>,
    counters: Counters,
}

impl Cache {
    pub fn new(config: CacheConfig) -> Result<Self, CacheAllocError> {
        let num_sets = config.num_sets();
        let associativity = config.associativity();
        let mut sets = Vec::new();
        sets.try_reserve_exact(num_sets)
            .map_err(|source| CacheAllocError::SetTable { num_sets, source })?;
        for set_index in 0..num_sets {
            let set = CacheSet::new(associativity).map_err(|source| CacheAllocError::Lines {
                set_index,
                associativity,
                source,
            })?;
            sets.push(set);
        }
        log::debug!("allocated cache: {config}");
        Ok(Self {
            config,
            decoder: AddressDecoder::from_config(&config),
            sets,
            counters: Counters::default(),
        })
    }

    pub fn access(&mut self, addr: Addr, kind: AccessKind) -> AccessOutcome {
        self.access_detailed(addr, kind).outcome
    }

    pub fn access_detailed(&mut self, addr: Addr, kind: AccessKind) -> AccessEvent {
        let d = self.decoder.decode(addr);
        let set = &mut self.sets[d.set_index];
        let outcome = match set.lookup(d.tag) {
            Lookup::Hit(way) => {
                set.promote(way);
                AccessOutcome::Hit
            }
            Lookup::Miss => match set.insert(d.tag) {
                Some(evicted) => {
                    log::trace!("set {}: tag {evicted:#x} evicted by {:#x}", d.set_index, d.tag);
                    AccessOutcome::MissWithEviction { evicted }
                }
                None => AccessOutcome::Miss,
            },
        };
        self.counters.record(outcome);
        AccessEvent {
            kind,
            addr,
            set_index: d.set_index,
            tag: d.tag,
            outcome,
        }
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
    pub fn decoder(&self) -> &AddressDecoder {
        &self.decoder
    }
    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }
    pub fn set(&self, set_index: usize) -> Option<&CacheSet> {
        self.sets.get(set_index)
    }
    pub fn set_view(&self, set_index: usize) -> Option<SetView<'_>> {
        let set = self.sets.get(set_index)?;
        Some(SetView {
            set_index,
            set,
            decoder: &self.decoder,
        })
    }
    /// number of valid lines over all sets.
    pub fn occupancy(&self) -> usize {
        self.sets.iter().map(CacheSet::len).sum()
    }
}

/// dump of one set, MRU first.
pub struct SetView<'a> {
    set_index: usize,
    set: &'a CacheSet,
    decoder: &'a AddressDecoder,
}

impl fmt::Display for SetView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "set {} ({}/{} lines):",
            self.set_index,
            self.set.len(),
            self.set.capacity()
        )?;
        if self.set.is_empty() {
            return write!(f, " empty");
        }
        for (i, line) in self.set.iter().enumerate() {
            if i != 0 {
                write!(f, " ->")?;
            }
            let base = self.decoder.block_base(line.tag, self.set_index);
            write!(f, " tag {:#x} ({base:#x})", line.tag)?;
        }
        Ok(())
    }
}

#[cfg(feature = "stat")]
impl AddStats for Cache {
    fn add_stats(&self, buf: &mut Stats) {
        buf.push(Box::new(stat::CacheStat {
            counters: self.counters,
            occupancy: self.occupancy(),
            capacity: self.num_sets() * self.config.associativity(),
        }));
    }
}

#[cfg(feature = "stat")]
mod stat {
    use std::fmt;

    use super::Counters;
    use crate::stat::*;

    #[derive(Clone, Copy)]
    pub struct CacheStat {
        pub counters: Counters,
        pub occupancy: usize,
        pub capacity: usize,
    }

    impl Stat for CacheStat {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(CacheStatView::new(self))
        }
    }

    pub struct CacheStatView<'a> {
        stat: &'a CacheStat,
    }

    impl<'a> CacheStatView<'a> {
        pub fn new(stat: &'a CacheStat) -> Self {
            Self { stat }
        }
    }

    impl StatView for CacheStatView<'_> {
        fn header(&self) -> &'static str {
            "cache stat"
        }
        fn width(&self) -> usize {
            36
        }
    }

    impl fmt::Display for CacheStatView<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let Counters {
                hits,
                misses,
                evictions,
            } = self.stat.counters;
            let total = self.stat.counters.accesses();
            let hit_pct = percent(hits, total);
            let miss_pct = percent(misses, total);
            let occ_pct = percent(self.stat.occupancy, self.stat.capacity);
            writeln!(f, "       hit: {hits:>10} ({hit_pct:>10}%)")?;
            writeln!(f, "      miss: {misses:>10} ({miss_pct:>10}%)")?;
            writeln!(f, "  eviction: {evictions:>10}")?;
            write!(
                f,
                " occupancy: {:>10} ({occ_pct:>10}%)",
                self.stat.occupancy
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(s: u32, e: usize, b: u32) -> Cache {
        Cache::new(CacheConfig::new(s, e, b).unwrap()).unwrap()
    }

    /// address with the given tag and set index, block offset 0.
    fn addr(c: &Cache, tag: u64, set_index: usize) -> Addr {
        c.decoder().block_base(tag, set_index)
    }

    #[test]
    fn test_cold_start_miss() {
        for (s, e, b) in [(1, 1, 1), (4, 2, 4), (5, 8, 6)] {
            let mut c = cache(s, e, b);
            assert_eq!(AccessOutcome::Miss, c.access(Addr::new(0), AccessKind::Load));
            let mut c = cache(s, e, b);
            assert_eq!(
                AccessOutcome::Miss,
                c.access(Addr::new(0xdead_beef), AccessKind::Store)
            );
            assert_eq!(0, c.counters().evictions);
        }
    }
    #[test]
    fn test_immediate_reaccess_hits() {
        let mut c = cache(4, 1, 4);
        assert_eq!(AccessOutcome::Miss, c.access(Addr::new(0x10), AccessKind::Load));
        assert_eq!(AccessOutcome::Hit, c.access(Addr::new(0x10), AccessKind::Load));
        // same block, different offset
        assert_eq!(AccessOutcome::Hit, c.access(Addr::new(0x1f), AccessKind::Store));
        assert_eq!(
            Counters {
                hits: 2,
                misses: 1,
                evictions: 0
            },
            c.counters()
        );
    }
    #[test]
    fn test_direct_mapped_conflict() {
        let mut c = cache(2, 1, 2);
        let a = addr(&c, 1, 3);
        let b = addr(&c, 2, 3);
        assert_eq!(AccessOutcome::Miss, c.access(a, AccessKind::Load));
        assert_eq!(
            AccessOutcome::MissWithEviction { evicted: 1 },
            c.access(b, AccessKind::Load)
        );
        assert_eq!(1, c.set(3).unwrap().len());
        assert!(c.set(3).unwrap().contains(2));
        assert_eq!(
            AccessOutcome::MissWithEviction { evicted: 2 },
            c.access(a, AccessKind::Load)
        );
        assert_eq!(2, c.counters().evictions);
    }
    #[test]
    fn test_lru_order() {
        let mut c = cache(1, 2, 1);
        let [a, b, cc] = [0xA, 0xB, 0xC].map(|t| addr(&c, t, 1));
        let outcomes: Vec<_> = [a, b, a, cc]
            .into_iter()
            .map(|x| c.access(x, AccessKind::Load))
            .collect();
        assert_eq!(
            vec![
                AccessOutcome::Miss,
                AccessOutcome::Miss,
                AccessOutcome::Hit,
                AccessOutcome::MissWithEviction { evicted: 0xB },
            ],
            outcomes
        );
        assert_eq!(AccessOutcome::Hit, c.access(a, AccessKind::Load));
    }
    #[test]
    fn test_sets_are_independent() {
        let mut c = cache(1, 1, 1);
        let a = addr(&c, 5, 0);
        let b = addr(&c, 5, 1);
        c.access(a, AccessKind::Load);
        c.access(b, AccessKind::Load);
        assert_eq!(AccessOutcome::Hit, c.access(a, AccessKind::Load));
        assert_eq!(AccessOutcome::Hit, c.access(b, AccessKind::Load));
        assert_eq!(0, c.counters().evictions);
        assert_eq!(2, c.occupancy());
    }
    #[test]
    fn test_event_location() {
        let mut c = cache(4, 1, 4);
        let e = c.access_detailed(Addr::new(0x12345), AccessKind::Store);
        assert_eq!((0x123, 0x4), (e.tag, e.set_index));
        assert_eq!(AccessKind::Store, e.kind);
    }
    #[test]
    fn test_set_view() {
        let mut c = cache(1, 2, 4);
        assert_eq!("set 1 (0/2 lines): empty", c.set_view(1).unwrap().to_string());
        c.access(Addr::new(0x10), AccessKind::Load);
        c.access(Addr::new(0x30), AccessKind::Load);
        assert_eq!(
            "set 1 (2/2 lines): tag 0x1 (0x30) -> tag 0x0 (0x10)",
            c.set_view(1).unwrap().to_string()
        );
        assert!(c.set_view(2).is_none());
    }
    #[test]
    fn test_allocates_every_set() {
        let c = Cache::new(CacheConfig::new(16, 2, 4).unwrap()).unwrap();
        assert_eq!(1 << 16, c.num_sets());
        assert!(c.set((1 << 16) - 1).unwrap().is_empty());
        assert!(c.set(1 << 16).is_none());
    }
    #[test]
    fn test_summary_format() {
        let c = Counters {
            hits: 4,
            misses: 5,
            evictions: 3,
        };
        assert_eq!("hits:4 misses:5 evictions:3", c.to_string());
    }
}
