//! The logical clock and the event queue every component schedules onto.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::units::Nanosecs;

identifier!(EventId, u64);

/// A min-ordered queue of timestamped events.
///
/// Events scheduled for the same instant are dispatched in the order they were scheduled, so two
/// runs fed identical inputs produce identical dispatch sequences.
#[derive(Debug)]
pub struct EventQueue<E> {
    now: Nanosecs,
    next_seq: u64,
    heap: BinaryHeap<Scheduled<E>>,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventQueue<E> {
    /// Creates an empty queue with the clock at time zero.
    pub fn new() -> Self {
        Self {
            now: Nanosecs::ZERO,
            next_seq: 0,
            heap: BinaryHeap::new(),
        }
    }

    /// The current logical time.
    pub fn now(&self) -> Nanosecs {
        self.now
    }

    /// Schedules `event` to fire at `time`.
    ///
    /// Returns an error if `time` is earlier than the current time.
    pub fn schedule(&mut self, time: Nanosecs, event: E) -> Result<EventId, ScheduleError> {
        if time < self.now {
            return Err(ScheduleError::InPast {
                time,
                now: self.now,
            });
        }
        let id = EventId::new(self.next_seq);
        self.next_seq += 1;
        self.heap.push(Scheduled { time, id, event });
        Ok(id)
    }

    /// Schedules `event` to fire `delay` after the current time.
    pub fn schedule_in(&mut self, delay: Nanosecs, event: E) -> EventId {
        let time = self.now.saturating_add(delay);
        let id = EventId::new(self.next_seq);
        self.next_seq += 1;
        self.heap.push(Scheduled { time, id, event });
        id
    }

    /// The timestamp of the earliest pending event.
    pub fn peek_time(&self) -> Option<Nanosecs> {
        self.heap.peek().map(|s| s.time)
    }

    /// Removes the earliest event if it fires no later than `stop`, advancing the clock to its
    /// timestamp.
    pub fn pop_until(&mut self, stop: Nanosecs) -> Option<(Nanosecs, EventId, E)> {
        if self.peek_time()? > stop {
            return None;
        }
        let Scheduled { time, id, event } = self.heap.pop()?;
        self.now = time;
        Some((time, id, event))
    }

    /// Dispatches events in timestamp order until the queue is empty or the next event fires
    /// after `stop`. The handler may schedule further events. Returns the number of events
    /// dispatched.
    pub fn run_until<F>(&mut self, stop: Nanosecs, mut handler: F) -> usize
    where
        F: FnMut(&mut Self, Nanosecs, E),
    {
        let mut nr_dispatched = 0;
        while let Some((time, _, event)) = self.pop_until(stop) {
            handler(self, time, event);
            nr_dispatched += 1;
        }
        nr_dispatched
    }

    /// Drops every pending event without dispatching it.
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    delegate::delegate! {
        to self.heap {
            /// The number of pending events.
            pub fn len(&self) -> usize;

            /// Returns true if no events are pending.
            pub fn is_empty(&self) -> bool;
        }
    }
}

#[derive(Debug)]
struct Scheduled<E> {
    time: Nanosecs,
    id: EventId,
    event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    // `BinaryHeap` is a max-heap, so both keys are reversed.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// An event or application could not be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    /// The requested time precedes the current time.
    #[error("cannot schedule at {time}, the clock is already at {now}")]
    InPast {
        /// The requested time.
        time: Nanosecs,
        /// The current time.
        now: Nanosecs,
    },

    /// An application would stop before (or when) it starts.
    #[error("stop time {stop} is not after start time {start}")]
    EmptyDuration {
        /// The start time.
        start: Nanosecs,
        /// The stop time.
        stop: Nanosecs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatch_order(schedule: &[(u64, u32)], stop: u64) -> Vec<(u64, u32)> {
        let mut queue = EventQueue::new();
        for &(t, tag) in schedule {
            queue.schedule(Nanosecs::new(t), tag).unwrap();
        }
        let mut seen = Vec::new();
        queue.run_until(Nanosecs::new(stop), |_, t, tag| {
            seen.push((t.into_u64(), tag))
        });
        seen
    }

    #[test]
    fn dispatches_in_timestamp_order() {
        let seen = dispatch_order(&[(30, 0), (10, 1), (20, 2), (10, 3), (0, 4)], 100);
        assert_eq!(seen, vec![(0, 4), (10, 1), (10, 3), (20, 2), (30, 0)]);
    }

    #[test]
    fn equal_timestamps_are_fifo() {
        let schedule = (0..50).map(|i| (7, i)).collect::<Vec<_>>();
        let seen = dispatch_order(&schedule, 7);
        assert_eq!(seen, schedule);
    }

    #[test]
    fn dispatch_is_reproducible() {
        let schedule = (0..200u32)
            .map(|i| (((i * 7919) % 13) as u64, i))
            .collect::<Vec<_>>();
        let first = dispatch_order(&schedule, 1000);
        let second = dispatch_order(&schedule, 1000);
        assert_eq!(first, second);
        assert!(first.windows(2).all(|w| w[0].0 <= w[1].0));
        assert!(first
            .windows(2)
            .filter(|w| w[0].0 == w[1].0)
            .all(|w| w[0].1 < w[1].1));
    }

    #[test]
    fn events_after_stop_stay_queued() {
        let mut queue = EventQueue::new();
        queue.schedule(Nanosecs::new(5), 'a').unwrap();
        queue.schedule(Nanosecs::new(15), 'b').unwrap();
        let n = queue.run_until(Nanosecs::new(10), |_, _, _| {});
        assert_eq!(n, 1);
        assert_eq!(queue.now(), Nanosecs::new(5));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek_time(), Some(Nanosecs::new(15)));
    }

    #[test]
    fn scheduling_in_past_fails() {
        let mut queue = EventQueue::new();
        queue.schedule(Nanosecs::new(10), ()).unwrap();
        queue.run_until(Nanosecs::MAX, |_, _, _| {});
        assert!(matches!(
            queue.schedule(Nanosecs::new(9), ()),
            Err(ScheduleError::InPast { .. })
        ));
        // The current instant is still schedulable.
        assert!(queue.schedule(Nanosecs::new(10), ()).is_ok());
    }

    #[test]
    fn handler_can_schedule_followups() {
        let mut queue = EventQueue::new();
        queue.schedule(Nanosecs::ZERO, 0u32).unwrap();
        let mut seen = Vec::new();
        queue.run_until(Nanosecs::new(35), |q, t, n| {
            seen.push((t.into_u64(), n));
            q.schedule_in(Nanosecs::new(10), n + 1);
        });
        assert_eq!(seen, vec![(0, 0), (10, 1), (20, 2), (30, 3)]);
        assert_eq!(queue.len(), 1);
    }
}
