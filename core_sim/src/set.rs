use std::collections::TryReserveError;

/// a resident block. a line with `valid == false` is empty whatever its tag.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheLine {
    pub tag: u64,
    pub valid: bool,
}

/// handle to a line inside one set, handed out by [`CacheSet::lookup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Way(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit(Way),
    Miss,
}

#[derive(Debug, Default, Clone, Copy)]
struct Slot {
    line: CacheLine,
    prev: Option<usize>,
    next: Option<usize>,
}

/// lines of one set kept in recency order, MRU first.
///
/// the lines live in an arena of `E` slots allocated up front; recency is an
/// index-linked list threaded through the slots, so move-to-front and
/// evict-tail only relink. slots `0..len` are in use, the rest are empty.
#[derive(Debug, Clone)]
pub struct CacheSet {
    slots: Vec<Slot>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl CacheSet {
    pub fn new(capacity: usize) -> Result<Self, TryReserveError> {
        debug_assert!(capacity > 0);
        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity)?;
        slots.resize(capacity, Slot::default());
        Ok(Self {
            slots,
            head: None,
            tail: None,
            len: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// finds the valid line holding `tag`. ordering is left untouched.
    pub fn lookup(&self, tag: u64) -> Lookup {
        match self
            .slots
            .iter()
            .position(|s| s.line.valid && s.line.tag == tag)
        {
            Some(i) => Lookup::Hit(Way(i)),
            None => Lookup::Miss,
        }
    }

    pub fn contains(&self, tag: u64) -> bool {
        matches!(self.lookup(tag), Lookup::Hit(_))
    }

    /// makes `way` the most recently used line.
    pub fn promote(&mut self, way: Way) {
        let i = way.0;
        if self.head == Some(i) {
            return;
        }
        self.unlink(i);
        self.push_front(i);
    }

    /// places `tag` at MRU. when the set is full the LRU line is dropped first
    /// and its tag returned.
    pub fn insert(&mut self, tag: u64) -> Option<u64> {
        let (i, evicted) = match self.tail {
            Some(lru) if self.is_full() => {
                self.unlink(lru);
                (lru, Some(self.slots[lru].line.tag))
            }
            _ => {
                let i = self.len;
                self.len += 1;
                (i, None)
            }
        };
        self.slots[i].line = CacheLine { tag, valid: true };
        self.push_front(i);
        evicted
    }

    /// walks the resident lines from MRU to LRU.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            set: self,
            cursor: self.head,
        }
    }

    fn unlink(&mut self, i: usize) {
        let Slot { prev, next, .. } = self.slots[i];
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        self.slots[i].prev = None;
        self.slots[i].next = None;
    }

    fn push_front(&mut self, i: usize) {
        self.slots[i].prev = None;
        self.slots[i].next = self.head;
        match self.head {
            Some(h) => self.slots[h].prev = Some(i),
            None => self.tail = Some(i),
        }
        self.head = Some(i);
    }
}

pub struct Iter<'a> {
    set: &'a CacheSet,
    cursor: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a CacheLine;

    fn next(&mut self) -> Option<Self::Item> {
        let i = self.cursor?;
        let slot = &self.set.slots[i];
        self.cursor = slot.next;
        Some(&slot.line)
    }
}

impl<'a> IntoIterator for &'a CacheSet {
    type Item = &'a CacheLine;

    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(set: &CacheSet) -> Vec<u64> {
        set.iter().map(|l| l.tag).collect()
    }

    #[test]
    fn test_empty_set_misses() {
        let set = CacheSet::new(4).unwrap();
        // empty slots carry tag 0, which must not count as resident
        assert_eq!(Lookup::Miss, set.lookup(0));
        assert!(set.is_empty());
        assert_eq!(0, set.iter().count());
    }
    #[test]
    fn test_insert_until_full() {
        let mut set = CacheSet::new(3).unwrap();
        assert_eq!(None, set.insert(1));
        assert_eq!(None, set.insert(2));
        assert_eq!(None, set.insert(3));
        assert!(set.is_full());
        assert_eq!(vec![3, 2, 1], tags(&set));
        assert_eq!(Some(1), set.insert(4));
        assert_eq!(3, set.len());
        assert_eq!(vec![4, 3, 2], tags(&set));
        assert!(!set.contains(1));
    }
    #[test]
    fn test_promote_keeps_relative_order() {
        let mut set = CacheSet::new(4).unwrap();
        for t in [10, 20, 30, 40] {
            set.insert(t);
        }
        // MRU..LRU: 40 30 20 10
        let Lookup::Hit(w) = set.lookup(20) else {
            panic!("20 should be resident");
        };
        set.promote(w);
        assert_eq!(vec![20, 40, 30, 10], tags(&set));
        let Lookup::Hit(w) = set.lookup(10) else {
            panic!("10 should be resident");
        };
        set.promote(w);
        assert_eq!(vec![10, 20, 40, 30], tags(&set));
    }
    #[test]
    fn test_oversized_set_fails_to_allocate() {
        assert!(CacheSet::new(usize::MAX).is_err());
    }
    #[test]
    fn test_promote_head_is_noop() {
        let mut set = CacheSet::new(2).unwrap();
        set.insert(1);
        set.insert(2);
        let Lookup::Hit(w) = set.lookup(2) else {
            panic!("2 should be resident");
        };
        set.promote(w);
        assert_eq!(vec![2, 1], tags(&set));
    }
    #[test]
    fn test_evicts_least_recent_after_promotion() {
        let mut set = CacheSet::new(2).unwrap();
        set.insert(0xA);
        set.insert(0xB);
        if let Lookup::Hit(w) = set.lookup(0xA) {
            set.promote(w);
        }
        assert_eq!(Some(0xB), set.insert(0xC));
        assert_eq!(vec![0xC, 0xA], tags(&set));
    }
    #[test]
    fn test_single_way() {
        let mut set = CacheSet::new(1).unwrap();
        assert_eq!(None, set.insert(7));
        assert_eq!(Some(7), set.insert(8));
        assert_eq!(Some(8), set.insert(7));
        assert_eq!(vec![7], tags(&set));
    }
}
