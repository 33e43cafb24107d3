//! Resource: a named pool of identical capacity units
//!
//! # Release window
//!
//! Releasing units opens a window that stays open while the freed capacity
//! is offered to waiting requests and is closed by [`Resource::settle`].
//! Inside the window, a `Transfer` allocation takes freed units over
//! directly; those units never count as idle. A `Direct` allocation takes
//! them through the idle state, which shows up as a zero-duration dip in the
//! busy level and in the units-idled counter. Final occupancy is the same
//! either way.

use crate::components::ComponentId;
use crate::stats::{Counter, TimeWeighted};

/// A Seize interested in this resource's releases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscriber {
    pub seize: ComponentId,
    /// Higher value = scanned first
    pub priority: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ReleaseWindow {
    /// Lowest busy count reached by releases in this window
    floor: u32,
    released: u32,
    /// Freed units not yet taken by any allocation
    pending: u32,
    transferred: u32,
}

#[derive(Debug, Clone)]
pub struct Resource {
    name: String,
    capacity: u32,
    persistent: bool,
    busy: u32,
    window: Option<ReleaseWindow>,
    subscribers: Vec<Subscriber>,

    busy_level: TimeWeighted,
    seized_units: Counter,
    released_units: Counter,
    idled_units: Counter,
    transferred_units: Counter,
}

impl Resource {
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            capacity,
            persistent: false,
            busy: 0,
            window: None,
            subscribers: Vec::new(),
            busy_level: TimeWeighted::default(),
            seized_units: Counter::new(),
            released_units: Counter::new(),
            idled_units: Counter::new(),
            transferred_units: Counter::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: u32) {
        self.capacity = capacity;
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn set_persistent(&mut self, persistent: bool) {
        self.persistent = persistent;
    }

    pub fn busy(&self) -> u32 {
        self.busy
    }

    pub fn idle(&self) -> u32 {
        self.capacity.saturating_sub(self.busy)
    }

    pub fn in_release_window(&self) -> bool {
        self.window.is_some()
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    pub fn subscribers(&self) -> &[Subscriber] {
        &self.subscribers
    }

    /// Register a Seize; order is priority descending, then registration order
    pub fn subscribe(&mut self, seize: ComponentId, priority: i32) {
        if self.subscribers.iter().any(|s| s.seize == seize) {
            return;
        }
        self.subscribers.push(Subscriber { seize, priority });
        self.subscribers.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    pub fn clear_subscribers(&mut self) {
        self.subscribers.clear();
    }

    // ------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------

    /// Grant `quantity` units; the caller has checked `quantity <= idle()`
    ///
    /// Returns how many units were handed over directly from a release.
    pub fn allocate(&mut self, quantity: u32, transfer: bool, now: f64) -> u32 {
        self.busy += quantity;
        self.seized_units.increment(quantity as i64);

        let Some(window) = self.window.as_mut() else {
            self.busy_level.update(self.busy as f64, now);
            return 0;
        };
        let from_pending = quantity.min(window.pending);
        window.pending -= from_pending;
        if transfer {
            window.transferred += from_pending;
            self.transferred_units.increment(from_pending as i64);
            from_pending
        } else {
            0
        }
    }

    /// Give back `quantity` units and open (or extend) the release window
    ///
    /// Returns false, changing nothing, when fewer units are busy.
    pub fn release(&mut self, quantity: u32) -> bool {
        if quantity > self.busy {
            return false;
        }
        self.busy -= quantity;
        self.released_units.increment(quantity as i64);
        let window = self.window.get_or_insert(ReleaseWindow {
            floor: self.busy,
            ..ReleaseWindow::default()
        });
        window.floor = window.floor.min(self.busy);
        window.released += quantity;
        window.pending += quantity;
        true
    }

    /// Close the release window and record what the busy level went through
    pub fn settle(&mut self, now: f64) {
        let Some(window) = self.window.take() else {
            return;
        };
        let dip = window.floor + window.transferred;
        if dip != self.busy {
            self.busy_level.update(dip as f64, now);
        }
        self.busy_level.update(self.busy as f64, now);
        self.idled_units
            .increment((window.released - window.transferred) as i64);
    }

    // ------------------------------------------------------------------
    // Replication boundaries
    // ------------------------------------------------------------------

    /// Start a replication with `busy` units already held
    pub fn reset(&mut self, busy: u32, now: f64) {
        self.busy = busy.min(self.capacity);
        self.window = None;
        self.busy_level = TimeWeighted::new(self.busy as f64, now);
        self.clear_counters();
    }

    /// Discard statistics, keeping state (end of warm-up)
    pub fn clear_statistics(&mut self, now: f64) {
        self.busy_level = TimeWeighted::new(self.busy as f64, now);
        self.clear_counters();
    }

    fn clear_counters(&mut self) {
        self.seized_units.clear();
        self.released_units.clear();
        self.idled_units.clear();
        self.transferred_units.clear();
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    pub fn busy_level(&self) -> &TimeWeighted {
        &self.busy_level
    }

    /// Average fraction of capacity in use up to `now`
    pub fn utilization(&self, now: f64) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.busy_level.average(now) / self.capacity as f64
        }
    }

    pub fn seized_units(&self) -> i64 {
        self.seized_units.value()
    }

    pub fn released_units(&self) -> i64 {
        self.released_units.value()
    }

    pub fn idled_units(&self) -> i64 {
        self.idled_units.value()
    }

    pub fn transferred_units(&self) -> i64 {
        self.transferred_units.value()
    }
}
