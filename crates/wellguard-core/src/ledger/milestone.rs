//! Usage milestones.
//!
//! Each monitored package walks `Fresh -> 30% -> 70% -> 100%`. The walk is
//! monotonic: a threshold, once fired, stays fired until the package is reset.
//! 100% is the terminal blocked transition and is reported by the caller as a
//! block, not as an ordinary milestone.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Milestone {
    ThirtyPercent,
    SeventyPercent,
    Limit,
}

impl Milestone {
    /// Every milestone in ascending order.
    pub const ALL: [Milestone; 3] = [
        Milestone::ThirtyPercent,
        Milestone::SeventyPercent,
        Milestone::Limit,
    ];

    pub fn percent(self) -> u8 {
        match self {
            Milestone::ThirtyPercent => 30,
            Milestone::SeventyPercent => 70,
            Milestone::Limit => 100,
        }
    }

    pub fn from_percent(percent: u8) -> Option<Self> {
        match percent {
            30 => Some(Milestone::ThirtyPercent),
            70 => Some(Milestone::SeventyPercent),
            100 => Some(Milestone::Limit),
            _ => None,
        }
    }

    pub fn is_limit(self) -> bool {
        self == Milestone::Limit
    }
}

impl From<Milestone> for u8 {
    fn from(m: Milestone) -> u8 {
        m.percent()
    }
}

impl TryFrom<u8> for Milestone {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Milestone::from_percent(value).ok_or_else(|| format!("{value} is not a milestone"))
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

/// Whole-percent usage, `None` when the package has no limit.
pub fn percentage(usage_seconds: u64, limit_seconds: u64) -> Option<u64> {
    if limit_seconds == 0 {
        return None;
    }
    let pct = u128::from(usage_seconds) * 100 / u128::from(limit_seconds);
    Some(u64::try_from(pct).unwrap_or(u64::MAX))
}

/// Thresholds already fired for the current cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MilestoneSet(BTreeSet<Milestone>);

impl MilestoneSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, milestone: Milestone) -> bool {
        self.0.contains(&milestone)
    }

    pub fn insert(&mut self, milestone: Milestone) -> bool {
        self.0.insert(milestone)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Milestone> + '_ {
        self.0.iter().copied()
    }

    /// Mark every threshold at or below `percentage` as fired and return the
    /// newly crossed ones in ascending order.
    pub fn advance(&mut self, percentage: u64) -> Vec<Milestone> {
        Milestone::ALL
            .into_iter()
            .filter(|m| percentage >= u64::from(m.percent()))
            .filter(|m| self.0.insert(*m))
            .collect()
    }
}

impl FromIterator<Milestone> for MilestoneSet {
    fn from_iter<I: IntoIterator<Item = Milestone>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_floors() {
        assert_eq!(percentage(29, 100), Some(29));
        assert_eq!(percentage(1, 3), Some(33));
        assert_eq!(percentage(59, 60), Some(98));
        assert_eq!(percentage(10, 0), None);
    }

    #[test]
    fn percentage_does_not_overflow() {
        assert_eq!(percentage(u64::MAX, u64::MAX), Some(100));
    }

    #[test]
    fn advance_fires_each_threshold_once() {
        let mut set = MilestoneSet::new();
        assert!(set.advance(10).is_empty());
        assert_eq!(set.advance(31), vec![Milestone::ThirtyPercent]);
        assert!(set.advance(50).is_empty());
        assert_eq!(set.advance(70), vec![Milestone::SeventyPercent]);
        assert!(set.advance(70).is_empty());
    }

    #[test]
    fn advance_reports_every_crossed_threshold_on_a_jump() {
        let mut set = MilestoneSet::new();
        assert_eq!(
            set.advance(140),
            vec![
                Milestone::ThirtyPercent,
                Milestone::SeventyPercent,
                Milestone::Limit
            ]
        );
    }

    #[test]
    fn serializes_as_plain_percentages() {
        let set: MilestoneSet = [Milestone::SeventyPercent, Milestone::ThirtyPercent]
            .into_iter()
            .collect();
        assert_eq!(serde_json::to_string(&set).unwrap(), "[30,70]");

        let parsed: MilestoneSet = serde_json::from_str("[100,30]").unwrap();
        assert!(parsed.contains(Milestone::Limit));
        assert!(parsed.contains(Milestone::ThirtyPercent));
        assert!(serde_json::from_str::<MilestoneSet>("[50]").is_err());
    }
}
