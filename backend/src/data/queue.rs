//! Queue: ordered wait-list of unsatisfied seize requests
//!
//! Entries are kept sorted by the queue's order rule at insertion time, so
//! the vector order is the scan order. Ties always fall back to arrival
//! order. A bounded queue rejects entries when full; the Seize decides
//! whether the entity balks or blocks, and blocked entries wait in an
//! overflow list until space frees.

use crate::allocation::AllocationRequest;
use crate::components::ComponentId;
use crate::models::entity::EntityId;
use crate::stats::{StatisticsCollector, TimeWeighted};
use std::collections::VecDeque;

/// Ranking applied when an entry joins the queue
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OrderRule {
    #[default]
    Fifo,
    Lifo,
    /// Higher entity priority first
    Priority,
    /// Higher value of the named entity attribute first
    HighestValue(String),
    /// Lower value of the named entity attribute first
    LowestValue(String),
}

impl OrderRule {
    /// Stable integer code used by persistence records
    pub fn code(&self) -> i64 {
        match self {
            OrderRule::Fifo => 0,
            OrderRule::Lifo => 1,
            OrderRule::Priority => 2,
            OrderRule::HighestValue(_) => 3,
            OrderRule::LowestValue(_) => 4,
        }
    }

    pub fn from_code(code: i64, attribute: &str) -> Option<OrderRule> {
        match code {
            0 => Some(OrderRule::Fifo),
            1 => Some(OrderRule::Lifo),
            2 => Some(OrderRule::Priority),
            3 => Some(OrderRule::HighestValue(attribute.to_string())),
            4 => Some(OrderRule::LowestValue(attribute.to_string())),
            _ => None,
        }
    }

    /// Entity attribute the rule ranks by, if any
    pub fn attribute(&self) -> Option<&str> {
        match self {
            OrderRule::HighestValue(attr) | OrderRule::LowestValue(attr) => Some(attr),
            _ => None,
        }
    }
}

/// One waiting entity and the concrete requests it is waiting for
#[derive(Debug, Clone, PartialEq)]
pub struct Waiting {
    pub entity: EntityId,
    /// Seize that queued the entity (allocation forwards from it)
    pub seize: ComponentId,
    pub requests: Vec<AllocationRequest>,
    pub entered_at: f64,
    pub priority: i32,
    /// Attribute value for value-ranked queues
    pub rank: f64,
}

#[derive(Debug, Clone)]
pub struct Queue {
    name: String,
    order: OrderRule,
    capacity: Option<usize>,
    persistent: bool,
    entries: Vec<Waiting>,
    blocked: VecDeque<Waiting>,

    time_in_queue: StatisticsCollector,
    number_in_queue: TimeWeighted,
}

impl Queue {
    pub fn new(name: impl Into<String>, order: OrderRule) -> Self {
        Self {
            name: name.into(),
            order,
            capacity: None,
            persistent: false,
            entries: Vec::new(),
            blocked: VecDeque::new(),
            time_in_queue: StatisticsCollector::new(),
            number_in_queue: TimeWeighted::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> &OrderRule {
        &self.order
    }

    pub fn set_order(&mut self, order: OrderRule) {
        self.order = order;
    }

    /// Maximum number of waiting entries (`None` = unbounded)
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: Option<usize>) {
        self.capacity = capacity;
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn set_persistent(&mut self, persistent: bool) {
        self.persistent = persistent;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.capacity.is_some_and(|cap| self.entries.len() >= cap)
    }

    /// Waiting entries in scan order
    pub fn entries(&self) -> &[Waiting] {
        &self.entries
    }

    /// Entries held back because the queue was full
    pub fn blocked(&self) -> impl Iterator<Item = &Waiting> {
        self.blocked.iter()
    }

    pub fn position_of(&self, entity: EntityId) -> Option<usize> {
        self.entries.iter().position(|w| w.entity == entity)
    }

    /// True when the entity waits here, in the queue or blocked
    pub fn holds(&self, entity: EntityId) -> bool {
        self.position_of(entity).is_some() || self.blocked.iter().any(|w| w.entity == entity)
    }

    /// Insert by order rule, returning the position taken
    ///
    /// A full queue hands the entry back untouched.
    pub fn insert(&mut self, waiting: Waiting, now: f64) -> Result<usize, Waiting> {
        if self.is_full() {
            return Err(waiting);
        }
        debug_assert!(!self.holds(waiting.entity), "entity queued twice");
        let position = self.insert_position(&waiting);
        self.entries.insert(position, waiting);
        self.number_in_queue.update(self.entries.len() as f64, now);
        Ok(position)
    }

    fn insert_position(&self, waiting: &Waiting) -> usize {
        let after = |keep_before: &dyn Fn(&Waiting) -> bool| {
            self.entries
                .iter()
                .position(|w| !keep_before(w))
                .unwrap_or(self.entries.len())
        };
        match &self.order {
            OrderRule::Fifo => self.entries.len(),
            OrderRule::Lifo => 0,
            OrderRule::Priority => after(&|w| w.priority >= waiting.priority),
            OrderRule::HighestValue(_) => after(&|w| w.rank >= waiting.rank),
            OrderRule::LowestValue(_) => after(&|w| w.rank <= waiting.rank),
        }
    }

    /// Park an entry that found the queue full
    pub fn block(&mut self, waiting: Waiting) {
        self.blocked.push_back(waiting);
    }

    /// Take the entry at `index` out of the queue
    ///
    /// Records its time in queue and lets the oldest blocked entry in.
    pub fn remove(&mut self, index: usize, now: f64) -> Option<Waiting> {
        if index >= self.entries.len() {
            return None;
        }
        let waiting = self.entries.remove(index);
        self.time_in_queue.collect(now - waiting.entered_at);
        self.number_in_queue.update(self.entries.len() as f64, now);

        if !self.is_full() {
            if let Some(next) = self.blocked.pop_front() {
                if let Err(back) = self.insert(next, now) {
                    self.blocked.push_front(back);
                }
            }
        }
        Some(waiting)
    }

    /// Start a replication
    ///
    /// A persistent queue keeps its entries, restamped to `now`; any other
    /// queue is emptied. Returns the entities dropped.
    pub fn reset(&mut self, now: f64) -> Vec<EntityId> {
        let mut dropped = Vec::new();
        if self.persistent {
            for w in self.entries.iter_mut().chain(self.blocked.iter_mut()) {
                w.entered_at = now;
            }
        } else {
            dropped.extend(self.entries.drain(..).map(|w| w.entity));
            dropped.extend(self.blocked.drain(..).map(|w| w.entity));
        }
        self.clear_statistics(now);
        dropped
    }

    /// Discard statistics, keeping entries (end of warm-up)
    pub fn clear_statistics(&mut self, now: f64) {
        self.time_in_queue.clear();
        self.number_in_queue = TimeWeighted::new(self.entries.len() as f64, now);
    }

    pub fn set_confidence_level(&mut self, level: f64) {
        self.time_in_queue.set_confidence_level(level);
    }

    pub fn time_in_queue(&self) -> &StatisticsCollector {
        &self.time_in_queue
    }

    pub fn number_in_queue(&self) -> &TimeWeighted {
        &self.number_in_queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiting(entity: u64, priority: i32, rank: f64, at: f64) -> Waiting {
        Waiting {
            entity: EntityId::new(entity),
            seize: ComponentId::new(0),
            requests: Vec::new(),
            entered_at: at,
            priority,
            rank,
        }
    }

    fn order(queue: &Queue) -> Vec<u64> {
        queue.entries().iter().map(|w| w.entity.raw()).collect()
    }

    #[test]
    fn test_fifo_and_lifo() {
        let mut fifo = Queue::new("Q", OrderRule::Fifo);
        let mut lifo = Queue::new("Q", OrderRule::Lifo);
        for id in 1..=3 {
            fifo.insert(waiting(id, 0, 0.0, 0.0), 0.0).unwrap();
            lifo.insert(waiting(id, 0, 0.0, 0.0), 0.0).unwrap();
        }
        assert_eq!(order(&fifo), vec![1, 2, 3]);
        assert_eq!(order(&lifo), vec![3, 2, 1]);
    }

    #[test]
    fn test_priority_keeps_fifo_among_equals() {
        let mut queue = Queue::new("Q", OrderRule::Priority);
        queue.insert(waiting(1, 0, 0.0, 0.0), 0.0).unwrap();
        queue.insert(waiting(2, 5, 0.0, 0.0), 0.0).unwrap();
        queue.insert(waiting(3, 5, 0.0, 0.0), 0.0).unwrap();
        queue.insert(waiting(4, 1, 0.0, 0.0), 0.0).unwrap();
        assert_eq!(order(&queue), vec![2, 3, 4, 1]);
    }

    #[test]
    fn test_value_rules() {
        let mut high = Queue::new("Q", OrderRule::HighestValue("size".into()));
        let mut low = Queue::new("Q", OrderRule::LowestValue("size".into()));
        for (id, rank) in [(1, 2.0), (2, 7.0), (3, 2.0)] {
            high.insert(waiting(id, 0, rank, 0.0), 0.0).unwrap();
            low.insert(waiting(id, 0, rank, 0.0), 0.0).unwrap();
        }
        assert_eq!(order(&high), vec![2, 1, 3]);
        assert_eq!(order(&low), vec![1, 3, 2]);
    }

    #[test]
    fn test_remove_records_time_in_queue() {
        let mut queue = Queue::new("Q", OrderRule::Fifo);
        queue.insert(waiting(1, 0, 0.0, 2.0), 2.0).unwrap();
        let w = queue.remove(0, 5.0).unwrap();
        assert_eq!(w.entity, EntityId::new(1));
        assert_eq!(queue.time_in_queue().average(), 3.0);
        assert!(queue.remove(0, 5.0).is_none());
    }

    #[test]
    fn test_full_queue_rejects_and_blocked_entry_moves_in() {
        let mut queue = Queue::new("Q", OrderRule::Fifo);
        queue.set_capacity(Some(1));
        queue.insert(waiting(1, 0, 0.0, 0.0), 0.0).unwrap();
        let rejected = queue.insert(waiting(2, 0, 0.0, 1.0), 1.0).unwrap_err();
        queue.block(rejected);
        assert!(queue.holds(EntityId::new(2)));
        assert_eq!(queue.len(), 1);

        queue.remove(0, 3.0);
        assert_eq!(order(&queue), vec![2]);
        assert_eq!(queue.blocked().count(), 0);
    }

    #[test]
    fn test_reset_respects_persistence() {
        let mut plain = Queue::new("Q", OrderRule::Fifo);
        plain.insert(waiting(1, 0, 0.0, 0.0), 0.0).unwrap();
        assert_eq!(plain.reset(0.0), vec![EntityId::new(1)]);
        assert!(plain.is_empty());

        let mut kept = Queue::new("Q", OrderRule::Fifo);
        kept.set_persistent(true);
        kept.insert(waiting(1, 0, 0.0, 7.0), 7.0).unwrap();
        assert!(kept.reset(0.0).is_empty());
        assert_eq!(kept.entries()[0].entered_at, 0.0);
    }
}
