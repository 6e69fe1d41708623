use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::command::{Command, CommandSource};

pub const DEFAULT_MAX_EVENTS: usize = 2000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub timestamp: u64,
    pub source: CommandSource,
    pub command: Command,
    pub description: String,
}

/// Ring buffer of recent host mutations, queried through `get_events`
pub struct EventLog {
    events: VecDeque<Event>,
    next_id: u64,
    max_events: usize,
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_EVENTS)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            next_id: 1,
            max_events: max_events.max(1),
        }
    }

    /// Record a host mutation
    pub fn record(&mut self, command: Command, source: CommandSource) -> u64 {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let id = self.next_id;
        self.next_id += 1;
        self.events.push_back(Event {
            id,
            timestamp,
            source,
            description: command.description(),
            command,
        });

        while self.events.len() > self.max_events {
            self.events.pop_front();
        }
        id
    }

    /// Get all events since a given ID
    pub fn events_since(&self, since_id: u64) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| e.id > since_id)
            .cloned()
            .collect()
    }

    /// Get the latest event ID
    pub fn latest_id(&self) -> u64 {
        self.events.back().map(|e| e.id).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
