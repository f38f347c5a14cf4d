use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::events::{ChallengeEvent, ChallengeEventBus};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubsystemId(pub String);

impl SubsystemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubsystemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubsystemRecord {
    pub subsystem_id: SubsystemId,
    pub repaired: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregatorError {
    #[error("subsystem '{0}' is not registered")]
    UnknownSubsystem(SubsystemId),
    #[error("subsystem '{0}' is already registered")]
    DuplicateSubsystem(SubsystemId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportOutcome {
    pub all_repaired: bool,
    /// This report flipped the subsystem from broken to repaired.
    pub newly_repaired: bool,
    /// This report completed the whole set; true at most once per aggregator.
    pub completed_now: bool,
}

/// Tracks repair flags for a fixed set of subsystems and announces the
/// all-repaired transition once.
///
/// Flags latch: a `repaired = false` report for an already repaired
/// subsystem is ignored, so completion can never be withdrawn and re-fired.
#[derive(Debug, Clone, Default)]
pub struct SubsystemAggregator {
    records: Vec<SubsystemRecord>,
    index_by_id: HashMap<SubsystemId, usize>,
    all_repaired_fired: bool,
    events: ChallengeEventBus,
}

impl SubsystemAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subsystems<I>(ids: I) -> Result<Self, AggregatorError>
    where
        I: IntoIterator<Item = SubsystemId>,
    {
        let mut aggregator = Self::new();
        for id in ids {
            aggregator.register(id)?;
        }
        Ok(aggregator)
    }

    pub fn register(&mut self, subsystem_id: SubsystemId) -> Result<(), AggregatorError> {
        if self.index_by_id.contains_key(&subsystem_id) {
            return Err(AggregatorError::DuplicateSubsystem(subsystem_id));
        }
        debug!(subsystem = %subsystem_id, "subsystem_registered");
        self.index_by_id
            .insert(subsystem_id.clone(), self.records.len());
        self.records.push(SubsystemRecord {
            subsystem_id,
            repaired: false,
        });
        Ok(())
    }

    pub fn report(
        &mut self,
        subsystem_id: &SubsystemId,
        repaired: bool,
    ) -> Result<ReportOutcome, AggregatorError> {
        let index = *self
            .index_by_id
            .get(subsystem_id)
            .ok_or_else(|| AggregatorError::UnknownSubsystem(subsystem_id.clone()))?;

        let record = &mut self.records[index];
        let newly_repaired = repaired && !record.repaired;
        if newly_repaired {
            record.repaired = true;
            info!(subsystem = %subsystem_id, "subsystem_repaired");
            self.events.emit(ChallengeEvent::SubsystemRepaired {
                subsystem_id: subsystem_id.clone(),
            });
        }

        let all_repaired = self.is_all_repaired();
        let completed_now = all_repaired && !self.all_repaired_fired;
        if completed_now {
            self.all_repaired_fired = true;
            info!(subsystems = self.records.len(), "all_subsystems_repaired");
            self.events.emit(ChallengeEvent::AllSubsystemsRepaired);
        }

        Ok(ReportOutcome {
            all_repaired,
            newly_repaired,
            completed_now,
        })
    }

    /// False while nothing is registered.
    pub fn is_all_repaired(&self) -> bool {
        !self.records.is_empty() && self.records.iter().all(|record| record.repaired)
    }

    pub fn is_registered(&self, subsystem_id: &SubsystemId) -> bool {
        self.index_by_id.contains_key(subsystem_id)
    }

    pub fn is_repaired(&self, subsystem_id: &SubsystemId) -> Option<bool> {
        self.index_by_id
            .get(subsystem_id)
            .map(|index| self.records[*index].repaired)
    }

    pub fn repaired_count(&self) -> usize {
        self.records.iter().filter(|record| record.repaired).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[SubsystemRecord] {
        &self.records
    }

    pub fn events(&self) -> &ChallengeEventBus {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<ChallengeEvent> {
        self.events.drain()
    }
}
