//! Scheduling of per-drive callbacks.
//!
//! The controller never blocks.  When a drive needs to do something
//! later (the next byte arrives under the head, or a seek completes)
//! it asks the [`Scheduler`] to call it back.  The host's run loop
//! decides how simulated time advances; [`PollQueue`] is the
//! scheduler we supply for hosts which do not have their own.
use std::fmt::Debug;
use std::time::Duration;

use tracing::{event, Level};

use base::collections::pq::KeyedReversePriorityQueue;

use super::context::Context;

/// Identifies a drive by its position in the controller's list of
/// units.
pub type UnitId = usize;

pub trait Scheduler {
    /// Arrange for `unit` to be serviced `delay` after the current
    /// simulated time.  Replaces any earlier request for the unit.
    fn schedule(&mut self, ctx: &Context, unit: UnitId, delay: Duration);

    /// Withdraw any pending request for `unit`.
    fn cancel(&mut self, unit: UnitId);
}

#[derive(Debug, Default)]
pub struct PollQueue {
    items: KeyedReversePriorityQueue<UnitId, Duration>,
}

impl PollQueue {
    #[must_use]
    pub fn new() -> PollQueue {
        PollQueue {
            items: KeyedReversePriorityQueue::new(),
        }
    }

    /// The unit which is due soonest, and when.
    #[must_use]
    pub fn peek(&self) -> Option<(&UnitId, &Duration)> {
        self.items.peek()
    }

    pub fn pop(&mut self) -> Option<(UnitId, Duration)> {
        self.items.pop()
    }

    /// Pop the earliest item if it is due at or before `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<(UnitId, Duration)> {
        match self.items.peek() {
            Some((_, due)) if *due <= now => self.items.pop(),
            _ => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Scheduler for PollQueue {
    fn schedule(&mut self, ctx: &Context, unit: UnitId, delay: Duration) {
        let due = ctx.simulated_time + delay;
        if let Some(prev) = self.items.push(unit, due) {
            if prev < due {
                event!(
                    Level::WARN,
                    "unit {} poll time pushed back from {:?} to {:?}",
                    unit,
                    prev,
                    due
                );
            }
        }
    }

    fn cancel(&mut self, unit: UnitId) {
        if let Some(due) = self.items.remove(&unit) {
            event!(
                Level::TRACE,
                "cancelled callback for unit {} which was due at {:?}",
                unit,
                due
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_at_us(n: u64) -> Context {
        Context::at(Duration::from_micros(n))
    }

    #[test]
    fn test_pollqueue_empty() {
        let mut q = PollQueue::new();
        assert!(q.is_empty());
        assert_eq!(0, q.len());
        assert_eq!(q.peek(), None);
        assert_eq!(q.pop(), None);
        assert_eq!(q.pop_due(Duration::MAX), None);
    }

    #[test]
    fn test_pollqueue_reschedule() {
        let mut q = PollQueue::new();
        q.schedule(&ctx_at_us(100), 0, Duration::from_micros(100));
        q.schedule(&ctx_at_us(100), 0, Duration::from_micros(300));
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop(), Some((0, Duration::from_micros(400))));
        assert!(q.is_empty());
    }

    #[test]
    fn test_pollqueue_due_order_and_cancel() {
        let mut q = PollQueue::new();
        let ctx = ctx_at_us(0);
        q.schedule(&ctx, 3, Duration::from_micros(50));
        q.schedule(&ctx, 1, Duration::from_micros(20));
        q.schedule(&ctx, 2, Duration::from_micros(90));
        q.cancel(1);
        q.cancel(7);
        assert_eq!(q.pop_due(Duration::from_micros(49)), None);
        assert_eq!(
            q.pop_due(Duration::from_micros(60)),
            Some((3, Duration::from_micros(50)))
        );
        assert_eq!(q.pop_due(Duration::from_micros(60)), None);
        assert_eq!(q.peek(), Some((&2, &Duration::from_micros(90))));
    }
}
