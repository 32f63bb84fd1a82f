use std::{cell::RefCell, collections::BTreeMap, fmt, rc::Rc};

use tracing::trace;

/// Shared handle to the timer.
pub type TimerRef = Rc<dyn Timer>;

/// Work run on every interval firing.
pub type TickTask = Box<dyn FnMut() -> TickOutcome>;

/// What a task wants after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Fire again after the next period.
    Continue,
    /// Remove the interval; it never fires again.
    Done,
}

/// Identifies one installed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IntervalId(u64);

impl fmt::Display for IntervalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interval#{}", self.0)
    }
}

/// A periodic-callback facility.
///
/// Tasks must not be run from inside `set_interval`; the first firing happens
/// one full period after installation.
pub trait Timer {
    fn set_interval(&self, period_ms: u32, task: TickTask) -> IntervalId;

    /// Cancel an interval. Unknown or finished ids are ignored.
    fn clear_interval(&self, id: IntervalId);
}

struct Scheduled {
    period_ms: u64,
    next_due_ms: u64,
    /// `None` while the task is running.
    task: Option<TickTask>,
    cancelled: bool,
}

#[derive(Default)]
struct ClockState {
    now_ms: u64,
    next_id: u64,
    intervals: BTreeMap<IntervalId, Scheduled>,
}

/// A deterministic timer: time only moves when [`ManualClock::advance`] is called.
///
/// Due tasks fire in order of due time, then installation order. A task may
/// install or clear intervals (including its own) while it runs.
#[derive(Default)]
pub struct ManualClock {
    state: RefCell<ClockState>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.state.borrow().now_ms
    }

    /// Number of intervals still installed.
    pub fn pending(&self) -> usize {
        self.state
            .borrow()
            .intervals
            .values()
            .filter(|s| !s.cancelled)
            .count()
    }

    /// Move time forward by `ms`, firing every task that falls due.
    ///
    /// Returns the number of task firings.
    pub fn advance(&self, ms: u64) -> usize {
        let target = self.state.borrow().now_ms + ms;
        let mut fired = 0;

        while let Some((id, mut task)) = self.take_next_due(target) {
            let outcome = task();
            fired += 1;

            let mut state = self.state.borrow_mut();
            let finished = match state.intervals.get_mut(&id) {
                Some(slot) if !slot.cancelled && outcome == TickOutcome::Continue => {
                    slot.next_due_ms += slot.period_ms;
                    slot.task = Some(task);
                    false
                }
                _ => true,
            };
            if finished {
                state.intervals.remove(&id);
                trace!(%id, "interval finished");
            }
        }

        self.state.borrow_mut().now_ms = target;
        fired
    }

    /// Advance by whole periods of `period_ms`, `count` times.
    pub fn advance_ticks(&self, period_ms: u32, count: u32) -> usize {
        (0..count).map(|_| self.advance(u64::from(period_ms))).sum()
    }

    fn take_next_due(&self, target: u64) -> Option<(IntervalId, TickTask)> {
        let mut state = self.state.borrow_mut();
        let (id, due) = state
            .intervals
            .iter()
            .filter(|(_, s)| !s.cancelled && s.task.is_some() && s.next_due_ms <= target)
            .map(|(id, s)| (*id, s.next_due_ms))
            .min_by_key(|&(id, due)| (due, id))?;

        state.now_ms = due;
        let task = state.intervals.get_mut(&id)?.task.take()?;
        Some((id, task))
    }
}

impl Timer for ManualClock {
    fn set_interval(&self, period_ms: u32, task: TickTask) -> IntervalId {
        let mut state = self.state.borrow_mut();
        let id = IntervalId(state.next_id);
        state.next_id += 1;
        let period_ms = u64::from(period_ms.max(1));
        let next_due_ms = state.now_ms + period_ms;
        state.intervals.insert(
            id,
            Scheduled {
                period_ms,
                next_due_ms,
                task: Some(task),
                cancelled: false,
            },
        );
        trace!(%id, period_ms, "interval installed");
        id
    }

    fn clear_interval(&self, id: IntervalId) {
        let mut state = self.state.borrow_mut();
        let running = match state.intervals.get_mut(&id) {
            Some(slot) if slot.task.is_none() => {
                // Running right now; advance() drops it once the task returns.
                slot.cancelled = true;
                true
            }
            Some(_) => false,
            None => return,
        };
        if !running {
            state.intervals.remove(&id);
        }
        trace!(%id, "interval cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter_task(counter: &Rc<Cell<u32>>, limit: u32) -> TickTask {
        let counter = Rc::clone(counter);
        Box::new(move || {
            counter.set(counter.get() + 1);
            if counter.get() >= limit {
                TickOutcome::Done
            } else {
                TickOutcome::Continue
            }
        })
    }

    #[test]
    fn fires_once_per_period() {
        let clock = ManualClock::new();
        let count = Rc::new(Cell::new(0));
        clock.set_interval(20, counter_task(&count, u32::MAX));

        clock.advance(19);
        assert_eq!(count.get(), 0);
        clock.advance(1);
        assert_eq!(count.get(), 1);
        clock.advance(100);
        assert_eq!(count.get(), 6);
        assert_eq!(clock.now_ms(), 120);
    }

    #[test]
    fn done_removes_interval() {
        let clock = ManualClock::new();
        let count = Rc::new(Cell::new(0));
        clock.set_interval(20, counter_task(&count, 3));

        clock.advance(1_000);
        assert_eq!(count.get(), 3);
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn cleared_interval_never_fires() {
        let clock = ManualClock::new();
        let count = Rc::new(Cell::new(0));
        let id = clock.set_interval(20, counter_task(&count, u32::MAX));

        clock.advance(40);
        clock.clear_interval(id);
        clock.advance(200);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn same_due_time_fires_in_installation_order() {
        let clock = ManualClock::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let log = Rc::clone(&log);
            clock.set_interval(
                20,
                Box::new(move || {
                    log.borrow_mut().push(tag);
                    TickOutcome::Done
                }),
            );
        }

        clock.advance(20);
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn task_may_clear_itself() {
        let clock = Rc::new(ManualClock::new());
        let count = Rc::new(Cell::new(0));
        let own_id: Rc<Cell<Option<IntervalId>>> = Rc::new(Cell::new(None));

        let task = {
            let clock = Rc::clone(&clock);
            let count = Rc::clone(&count);
            let own_id = Rc::clone(&own_id);
            Box::new(move || {
                count.set(count.get() + 1);
                if let Some(id) = own_id.get() {
                    clock.clear_interval(id);
                }
                TickOutcome::Continue
            })
        };
        own_id.set(Some(clock.set_interval(20, task)));

        clock.advance(100);
        assert_eq!(count.get(), 1);
        assert_eq!(clock.pending(), 0);
    }
}
