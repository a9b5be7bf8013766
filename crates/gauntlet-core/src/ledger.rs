//! Thread-safe result ledger keyed by unordered engine pairs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::stats::Stats;

/// Unordered pair of engine names. `PairKey::new("a", "b")` and
/// `PairKey::new("b", "a")` compare equal and hash identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
    lo: String,
    hi: String,
}

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            PairKey {
                lo: a.to_string(),
                hi: b.to_string(),
            }
        } else {
            PairKey {
                lo: b.to_string(),
                hi: a.to_string(),
            }
        }
    }
}

/// Per-pair record. `first` is the perspective the stored stats are
/// expressed in: the first name the pair was ever reported under.
#[derive(Debug, Clone)]
struct PairEntry {
    first: String,
    stats: Stats,
}

/// Cumulative per-pair statistics shared across workers.
///
/// The outer map lock is only held long enough to fetch or insert an entry
/// handle; concurrent updates to the same pair serialize on that entry's
/// own lock, so a progress report for one pair never blocks updates to
/// another.
#[derive(Default)]
pub struct ResultLedger {
    entries: Mutex<HashMap<PairKey, Arc<Mutex<PairEntry>>>>,
}

impl ResultLedger {
    pub fn new() -> Self {
        ResultLedger::default()
    }

    fn entry(&self, first: &str, second: &str) -> Arc<Mutex<PairEntry>> {
        let key = PairKey::new(first, second);
        let mut entries = self.entries.lock().unwrap();
        Arc::clone(entries.entry(key).or_insert_with(|| {
            Arc::new(Mutex::new(PairEntry {
                first: first.to_string(),
                stats: Stats::default(),
            }))
        }))
    }

    /// Adds `stats`, given in `first`'s perspective, to the pair's record.
    pub fn update(&self, first: &str, second: &str, stats: Stats) {
        let entry = self.entry(first, second);
        let mut entry = entry.lock().unwrap();
        if entry.first == first {
            entry.stats += stats;
        } else {
            entry.stats += !stats;
        }
    }

    /// Point-in-time copy of the pair's record, oriented so that `wins`
    /// counts wins of `first`.
    pub fn snapshot(&self, first: &str, second: &str) -> Stats {
        let entry = self.entry(first, second);
        let entry = entry.lock().unwrap();
        if entry.first == first {
            entry.stats
        } else {
            !entry.stats
        }
    }

    /// All pairs seen so far as `(first, second, stats)` in the stored
    /// perspective, sorted for stable reporting.
    pub fn pairs(&self) -> Vec<(String, String, Stats)> {
        let entries = self.entries.lock().unwrap();
        let mut out: Vec<_> = entries
            .iter()
            .map(|(key, entry)| {
                let entry = entry.lock().unwrap();
                let second = if entry.first == key.lo {
                    key.hi.clone()
                } else {
                    key.lo.clone()
                };
                (entry.first.clone(), second, entry.stats)
            })
            .collect();
        out.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn pair_key_is_unordered() {
        assert_eq!(PairKey::new("a", "b"), PairKey::new("b", "a"));
        assert_ne!(PairKey::new("a", "b"), PairKey::new("a", "c"));
    }

    #[test]
    fn updates_reorient_to_first_perspective() {
        let ledger = ResultLedger::new();
        ledger.update("alpha", "beta", Stats::win());
        // Reported from beta's side: a beta loss is an alpha win.
        ledger.update("beta", "alpha", Stats::loss());

        let snap = ledger.snapshot("alpha", "beta");
        assert_eq!(snap.wins, 2);
        assert_eq!(snap.losses, 0);

        let flipped = ledger.snapshot("beta", "alpha");
        assert_eq!(flipped.wins, 0);
        assert_eq!(flipped.losses, 2);
    }

    #[test]
    fn concurrent_updates_all_land() {
        let ledger = Arc::new(ResultLedger::new());
        let mut handles = Vec::new();
        for t in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    if t % 2 == 0 {
                        ledger.update("a", "b", Stats::win());
                    } else {
                        ledger.update("b", "a", Stats::win());
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let snap = ledger.snapshot("a", "b");
        assert_eq!(snap.sum(), 800);
        assert_eq!(snap.wins, 400);
        assert_eq!(snap.losses, 400);
    }

    #[test]
    fn pairs_lists_every_key_once() {
        let ledger = ResultLedger::new();
        ledger.update("a", "b", Stats::draw());
        ledger.update("c", "a", Stats::win());
        ledger.update("b", "a", Stats::draw());

        let pairs = ledger.pairs();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, "a");
        assert_eq!(pairs[0].2.draws, 2);
    }
}
