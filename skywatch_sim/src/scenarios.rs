//! Simulation scenarios for the map engine.

use std::fmt;
use std::str::FromStr;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SKY-001: two live ticks with disjoint snapshots
    TwoTicks,

    /// SKY-002: Kathmandu to Bangkok route overlay, then back to live
    RouteSearch,

    /// SKY-003: poll result arriving after teardown
    StaleTeardown,

    /// SKY-004: feed outages keep the previous markers
    FeedOutage,

    /// SKY-005: fetches slower than the poll interval
    SlowFeed,

    /// SKY-006: selected aircraft leaving the feed
    SelectionChurn,

    /// SKY-007: rapid live/route switching with fetches in flight
    ModeSwitch,

    /// SKY-008: duplicates, missing positions and noise in every snapshot
    DirtyFeed,

    /// SKY-009: long run with steady churn
    LongHaul,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::TwoTicks,
            ScenarioId::RouteSearch,
            ScenarioId::StaleTeardown,
            ScenarioId::FeedOutage,
            ScenarioId::SlowFeed,
            ScenarioId::SelectionChurn,
            ScenarioId::ModeSwitch,
            ScenarioId::DirtyFeed,
            ScenarioId::LongHaul,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::TwoTicks => "two_ticks",
            ScenarioId::RouteSearch => "route_search",
            ScenarioId::StaleTeardown => "stale_teardown",
            ScenarioId::FeedOutage => "feed_outage",
            ScenarioId::SlowFeed => "slow_feed",
            ScenarioId::SelectionChurn => "selection_churn",
            ScenarioId::ModeSwitch => "mode_switch",
            ScenarioId::DirtyFeed => "dirty_feed",
            ScenarioId::LongHaul => "long_haul",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::TwoTicks => "Snapshot {A} then {B}: A removed, B added, nothing updated",
            ScenarioId::RouteSearch => "KTM-BKK overlay fits both endpoints and is cleared on leaving",
            ScenarioId::StaleTeardown => "Result delivered after teardown makes zero surface calls",
            ScenarioId::FeedOutage => "Failed fetches keep markers and polling resumes",
            ScenarioId::SlowFeed => "30s fetches on a 10s interval never overlap",
            ScenarioId::SelectionChurn => "Selection auto-clears when its aircraft departs",
            ScenarioId::ModeSwitch => "In-flight polls from a left live mode are dropped",
            ScenarioId::DirtyFeed => "Rendered set equals positioned, de-duplicated ids",
            ScenarioId::LongHaul => "Rendered set tracks the fleet for the whole run",
        }
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        ScenarioId::all()
            .into_iter()
            .find(|id| id.name() == wanted)
            .ok_or_else(|| format!("Unknown scenario: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>().unwrap(), id);
            assert!(!id.description().is_empty());
        }
    }

    #[test]
    fn test_parse_is_lenient() {
        assert_eq!("Slow-Feed".parse::<ScenarioId>().unwrap(), ScenarioId::SlowFeed);
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
