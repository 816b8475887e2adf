/*
    rebind.rs - Deferred, coalesced re-registration

    A rebind request records the sequence number that exposed the desync
    and arms a randomized timer if none is pending. When the timer fires
    every recorded key is handed back at once; the coordinator then
    re-registers only those subscriptions whose sequence still differs
    from the recorded one.

    Requests for the same key inside the window collapse into one entry,
    keeping the latest recorded sequence.
*/

use super::backoff::JitterWindow;
use crate::core_view::model::SubscriptionKey;
use std::collections::HashMap;
use tokio::time::Instant;

#[derive(Debug)]
pub struct RebindScheduler {
    window: JitterWindow,
    pending: HashMap<SubscriptionKey, Option<u64>>,
    deadline: Option<Instant>,
}

impl RebindScheduler {
    pub fn new(window: JitterWindow) -> Self {
        Self { window, pending: HashMap::new(), deadline: None }
    }

    /// Record a rebind; returns true when this arms the timer
    pub fn request(&mut self, key: SubscriptionKey, sequence: Option<u64>, now: Instant) -> bool {
        self.pending.insert(key, sequence);
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now + self.window.sample());
        true
    }

    /// Drop every pending rebind and disarm the timer
    pub fn clear(&mut self) {
        self.pending.clear();
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Take every pending rebind if the timer has expired
    pub fn take_due(&mut self, now: Instant) -> Vec<(SubscriptionKey, Option<u64>)> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                self.pending.drain().collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
