//! Per-rebuild phase timing (spec §4.F).
//!
//! A fixed sequence of named phases, each stamped once as the tree walker
//! passes through it. Two phases are terminal: `drop_old` (normal path) and
//! `insert` (append-only / snapshot path) both also set `finish`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The fixed phase ordering a single table rebuild passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Start,
    Connect,
    Select,
    CreateTemp,
    Process,
    Csv,
    S3,
    Insert,
    CleanCsv,
    Tests,
    ReplaceOld,
    DropOld,
    MakeSnapshot,
    Finish,
}

impl Phase {
    /// Phases that also imply `Finish` when logged (spec §4.F).
    fn also_finishes(self) -> bool {
        matches!(self, Phase::DropOld | Phase::Insert)
    }
}

/// Unix-epoch-second timestamps for each phase of one rebuild.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timestamps {
    entries: BTreeMap<Phase, i64>,
}

impl Timestamps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `phase` as having occurred at `now`. `drop_old` and `insert`
    /// additionally stamp `finish` at the same instant, since they are the
    /// last phase on their respective paths.
    pub fn log(&mut self, phase: Phase, now: i64) {
        self.entries.insert(phase, now);
        if phase.also_finishes() {
            self.entries.insert(Phase::Finish, now);
        }
    }

    pub fn get(&self, phase: Phase) -> Option<i64> {
        self.entries.get(&phase).copied()
    }

    /// Total duration in seconds, defined only once both `start` and
    /// `finish` are present (spec §4.F).
    pub fn duration(&self) -> Option<f64> {
        let start = self.get(Phase::Start)?;
        let finish = self.get(Phase::Finish)?;
        Some((finish - start) as f64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Phase, i64)> + '_ {
        self.entries.iter().map(|(p, t)| (*p, *t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_absent_until_both_ends_logged() {
        let mut ts = Timestamps::new();
        assert!(ts.duration().is_none());
        ts.log(Phase::Start, 1_000);
        assert!(ts.duration().is_none());
    }

    #[test]
    fn drop_old_implies_finish() {
        let mut ts = Timestamps::new();
        ts.log(Phase::Start, 1_000);
        ts.log(Phase::DropOld, 1_045);
        assert_eq!(ts.duration(), Some(45.0));
    }

    #[test]
    fn insert_implies_finish_on_snapshot_path() {
        let mut ts = Timestamps::new();
        ts.log(Phase::Start, 1_000);
        ts.log(Phase::Insert, 1_012);
        assert_eq!(ts.get(Phase::Finish), Some(1_012));
        assert_eq!(ts.duration(), Some(12.0));
    }

    #[test]
    fn phases_do_not_imply_finish() {
        let mut ts = Timestamps::new();
        ts.log(Phase::Start, 1_000);
        ts.log(Phase::Select, 1_005);
        assert!(ts.get(Phase::Finish).is_none());
    }
}
