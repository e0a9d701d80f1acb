// 11.0: every provisioning or wiring step produces an event. used for the audit trail
// in the run summary. observational only, nothing reads events back to make decisions.

use serde::{Deserialize, Serialize};

use crate::component::Artifact;
use crate::types::{Address, Authority, Timestamp, TxHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployEvent {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl DeployEvent {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    // Provisioning events
    ComponentCreated(ComponentCreatedEvent),
    ComponentAdopted(ComponentBoundEvent),
    ComponentBound(ComponentBoundEvent),
    StageCompleted(StageCompletedEvent),

    // Wiring events
    WiringApplied(WiringAppliedEvent),
    WiringVerified(WiringVerifiedEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentCreatedEvent {
    pub name: String,
    pub artifact: Artifact,
    pub address: Address,
    pub tx_hash: TxHash,
    // init calls issued right after creation (mints, keeper grants)
    pub init_calls: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentBoundEvent {
    pub name: String,
    pub artifact: Artifact,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCompletedEvent {
    pub stage: String,
    pub created: usize,
    pub reused: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiringAppliedEvent {
    pub index: usize,
    pub action: String,
    pub authority: Authority,
    pub tx_hash: TxHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiringVerifiedEvent {
    pub actions: usize,
}

/// Append-only event sink shared by the stage runner and the wiring engine.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<DeployEvent>,
    next_event_id: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            next_event_id: 1,
        }
    }

    pub fn emit(&mut self, payload: EventPayload) {
        // Default leaves the counter at 0
        let id = self.next_event_id.max(1);
        self.events.push(DeployEvent::new(EventId(id), Timestamp::now(), payload));
        self.next_event_id = id + 1;
    }

    pub fn events(&self) -> &[DeployEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<DeployEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential_from_one() {
        let mut log = EventLog::default();
        for stage in ["tokens", "broker"] {
            log.emit(EventPayload::StageCompleted(StageCompletedEvent {
                stage: stage.to_string(),
                created: 1,
                reused: 0,
            }));
        }

        let ids: Vec<u64> = log.events().iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn events_serialize() {
        let mut log = EventLog::new();
        log.emit(EventPayload::WiringApplied(WiringAppliedEvent {
            index: 0,
            action: "DAIAddr.approve(RewardAddr) as treasury".to_string(),
            authority: Authority::Treasury,
            tx_hash: TxHash("0xabc".to_string()),
        }));

        let json = serde_json::to_string(log.events()).unwrap();
        assert!(json.contains("WiringApplied"));
        assert!(json.contains("\"treasury\""));
    }
}
