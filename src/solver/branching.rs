//! Shared branch-and-bound helpers: candidate ordering and time budgets.

use std::time::{Duration, Instant};

/// Integer candidates alternating around a pivot: `n₀, n₀+1, n₀−1, n₀+2, …`,
/// restricted to `[lo, hi]`.
///
/// Either direction can be closed once its candidates can no longer improve
/// the incumbent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternating {
    center: i64,
    lo: i64,
    hi: i64,
    offset: i64,
    up_open: bool,
    down_open: bool,
    /// Next candidate is above the center.
    going_up: bool,
    started: bool,
}

/// Side of the pivot a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Center,
    Up,
    Down,
}

impl Alternating {
    #[must_use]
    pub fn new(center: i64, lo: i64, hi: i64) -> Self {
        let center = center.clamp(lo, hi.max(lo));
        Self {
            center,
            lo,
            hi,
            offset: 0,
            up_open: true,
            down_open: true,
            going_up: true,
            started: false,
        }
    }

    /// A single forced value (inferred variables).
    #[must_use]
    pub fn single(value: i64) -> Self {
        Self {
            center: value,
            lo: value,
            hi: value,
            offset: 0,
            up_open: false,
            down_open: false,
            going_up: true,
            started: false,
        }
    }

    /// Stops generating candidates on one side of the pivot.
    pub fn close(&mut self, direction: Direction) {
        match direction {
            Direction::Up => self.up_open = false,
            Direction::Down => self.down_open = false,
            Direction::Center => {}
        }
    }

    #[must_use]
    pub const fn center(&self) -> i64 {
        self.center
    }

    /// Next candidate and the side it came from.
    pub fn next_candidate(&mut self) -> Option<(i64, Direction)> {
        if self.lo > self.hi {
            return None;
        }
        if !self.started {
            self.started = true;
            self.offset = 0;
            return Some((self.center, Direction::Center));
        }
        loop {
            if self.up_open && self.center + self.offset + 1 > self.hi {
                self.up_open = false;
            }
            if self.down_open && self.center - self.offset - 1 < self.lo {
                self.down_open = false;
            }
            if !self.up_open && !self.down_open {
                return None;
            }
            if self.going_up {
                self.going_up = false;
                if self.up_open {
                    return Some((self.center + self.offset + 1, Direction::Up));
                }
            } else {
                self.going_up = true;
                self.offset += 1;
                if self.down_open {
                    return Some((self.center - self.offset, Direction::Down));
                }
            }
        }
    }
}

/// Wall-clock budget of a solver stage.
///
/// The clock only runs once [`start`](Self::start) is called, so building a
/// solver ahead of time does not eat into its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    limit: Option<Duration>,
    deadline: Option<Instant>,
}

impl Budget {
    #[must_use]
    pub const fn new(millis: u64) -> Self {
        Self {
            limit: Some(Duration::from_millis(millis)),
            deadline: None,
        }
    }

    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            limit: None,
            deadline: None,
        }
    }

    /// Starts the clock; later calls keep the first deadline.
    pub fn start(&mut self) {
        if self.deadline.is_none() {
            self.deadline = self.limit.and_then(|limit| Instant::now().checked_add(limit));
        }
    }

    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.deadline.is_some()
    }

    /// `true` once a started budget has run out.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Per-call batch limits of a resumable stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    pub iterations: usize,
    pub time: Duration,
}

impl Batch {
    #[must_use]
    pub const fn new(iterations: usize, time: Duration) -> Self {
        Self { iterations, time }
    }

    /// Runs until done, without limits.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            iterations: usize::MAX,
            time: Duration::MAX,
        }
    }

    /// Deadline of a batch started now.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        Instant::now().checked_add(self.time)
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new(1000, Duration::from_millis(50))
    }
}

/// Whether a batch started with `deadline` ran out of time.
#[must_use]
pub fn batch_expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}
