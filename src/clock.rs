//! Clocks and pipeline timing.
//!
//! - [`ClockTime`]: a nanosecond timestamp (8 bytes, Copy)
//! - [`Clock`]: trait for time sources; elements may provide one
//! - [`SystemClock`]: monotonic system clock, the fallback choice
//! - [`ManualClock`]: a clock advanced by hand, for tests
//! - [`PipelineClock`]: the selected clock plus base time and accumulated
//!   running time, maintained across PLAYING/PAUSED cycles

use crate::sync::lock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Time in nanoseconds.
///
/// # Examples
///
/// ```rust
/// use parallax_state::clock::ClockTime;
///
/// let t = ClockTime::from_secs(1) + ClockTime::from_millis(500);
/// assert_eq!(t.millis(), 1500);
/// assert_eq!(format!("{}", t), "1.500s");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClockTime(u64);

impl ClockTime {
    /// Zero time.
    pub const ZERO: Self = Self(0);

    /// Maximum representable time (one less than NONE).
    pub const MAX: Self = Self(u64::MAX - 1);

    /// Unset time.
    pub const NONE: Self = Self(u64::MAX);

    /// Create from nanoseconds.
    #[inline]
    pub const fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    /// Create from milliseconds.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms.saturating_mul(1_000_000))
    }

    /// Create from seconds.
    #[inline]
    pub const fn from_secs(s: u64) -> Self {
        Self(s.saturating_mul(1_000_000_000))
    }

    /// Nanoseconds.
    #[inline]
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Milliseconds, truncated.
    #[inline]
    pub const fn millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Seconds, truncated.
    #[inline]
    pub const fn secs(self) -> u64 {
        self.0 / 1_000_000_000
    }

    /// Whether this is [`ClockTime::NONE`].
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u64::MAX
    }

    /// Whether this is a valid time.
    #[inline]
    pub const fn is_some(self) -> bool {
        !self.is_none()
    }

    /// Saturating addition; NONE if either side is NONE.
    #[inline]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        if self.is_none() || rhs.is_none() {
            return Self::NONE;
        }
        let result = self.0.saturating_add(rhs.0);
        if result == u64::MAX { Self::MAX } else { Self(result) }
    }

    /// Saturating subtraction; NONE if either side is NONE.
    #[inline]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        if self.is_none() || rhs.is_none() {
            return Self::NONE;
        }
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl std::ops::Add for ClockTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }
}

impl std::ops::Sub for ClockTime {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        self.saturating_sub(rhs)
    }
}

impl From<Duration> for ClockTime {
    #[inline]
    fn from(d: Duration) -> Self {
        Self(d.as_nanos().min(u128::from(u64::MAX - 1)) as u64)
    }
}

impl From<ClockTime> for Duration {
    #[inline]
    fn from(t: ClockTime) -> Self {
        if t.is_none() {
            Duration::ZERO
        } else {
            Duration::from_nanos(t.0)
        }
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "NONE")
        } else {
            write!(f, "{}.{:03}s", self.secs(), (self.0 / 1_000_000) % 1000)
        }
    }
}

/// A monotonic time source.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> ClockTime;

    /// Name reported in `NewClock` messages.
    fn name(&self) -> &str {
        "unknown"
    }
}

/// System monotonic clock, relative to its creation.
pub struct SystemClock {
    epoch: Instant,
    name: String,
}

impl SystemClock {
    /// Create a system clock.
    pub fn new() -> Self {
        Self::with_name("system-monotonic")
    }

    /// Create a system clock with a custom name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            epoch: Instant::now(),
            name: name.into(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> ClockTime {
        ClockTime::from(self.epoch.elapsed())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: AtomicU64,
    name: String,
}

impl ManualClock {
    /// Create a manual clock at zero.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            now: AtomicU64::new(0),
            name: name.into(),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: ClockTime) {
        self.now.fetch_add(by.nanos(), Ordering::AcqRel);
    }

    /// Set the clock to an absolute time.
    pub fn set(&self, time: ClockTime) {
        self.now.store(time.nanos(), Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> ClockTime {
        ClockTime::from_nanos(self.now.load(Ordering::Acquire))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Pipeline timing: selected clock, base time and accumulated running time.
///
/// - **Base time**: clock time at which running time zero happened
/// - **Running time**: clock time minus base time, accumulated across
///   PLAYING periods and frozen while paused
pub struct PipelineClock {
    clock: Mutex<Option<Arc<dyn Clock>>>,
    base_time: AtomicU64,
    running_time: AtomicU64,
}

impl PipelineClock {
    /// No clock selected, running time zero.
    pub fn new() -> Self {
        Self {
            clock: Mutex::new(None),
            base_time: AtomicU64::new(u64::MAX),
            running_time: AtomicU64::new(0),
        }
    }

    /// Select a clock. Returns `true` if it differs from the current one.
    pub fn select(&self, clock: Arc<dyn Clock>) -> bool {
        let mut current = lock(&self.clock);
        let changed = match current.as_ref() {
            Some(old) => !Arc::ptr_eq(old, &clock),
            None => true,
        };
        *current = Some(clock);
        changed
    }

    /// The selected clock, if any.
    pub fn clock(&self) -> Option<Arc<dyn Clock>> {
        lock(&self.clock).clone()
    }

    /// Start running: base time becomes `now - accumulated running time`.
    ///
    /// Returns the new base time, or NONE if no clock is selected.
    pub fn play(&self) -> ClockTime {
        let Some(clock) = self.clock() else {
            return ClockTime::NONE;
        };
        let running = ClockTime::from_nanos(self.running_time.load(Ordering::Acquire));
        let base = clock.now().saturating_sub(running);
        self.base_time.store(base.nanos(), Ordering::Release);
        base
    }

    /// Stop running and store the running time reached so far.
    pub fn pause(&self) {
        let running = self.running_time();
        if running.is_some() {
            self.running_time.store(running.nanos(), Ordering::Release);
        }
        self.base_time.store(u64::MAX, Ordering::Release);
    }

    /// Reset the accumulated running time to zero.
    pub fn reset(&self) {
        self.running_time.store(0, Ordering::Release);
        self.base_time.store(u64::MAX, Ordering::Release);
    }

    /// Base time while running, NONE otherwise.
    #[inline]
    pub fn base_time(&self) -> ClockTime {
        ClockTime::from_nanos(self.base_time.load(Ordering::Acquire))
    }

    /// Current running time.
    ///
    /// While running this is `now - base_time`; while paused it is the
    /// stored value.
    pub fn running_time(&self) -> ClockTime {
        let base = self.base_time();
        match self.clock() {
            Some(clock) if base.is_some() => clock.now().saturating_sub(base),
            _ => ClockTime::from_nanos(self.running_time.load(Ordering::Acquire)),
        }
    }
}

impl Default for PipelineClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_time_arithmetic() {
        let t1 = ClockTime::from_secs(1);
        let t2 = ClockTime::from_millis(500);
        assert_eq!((t1 + t2).millis(), 1500);
        assert_eq!((t1 - t2).millis(), 500);
        assert_eq!(ClockTime::from_millis(100) - t1, ClockTime::ZERO);
        assert_eq!(ClockTime::MAX + t1, ClockTime::MAX);
        assert!((t1 + ClockTime::NONE).is_none());
    }

    #[test]
    fn test_clock_time_display() {
        assert_eq!(format!("{}", ClockTime::from_millis(1500)), "1.500s");
        assert_eq!(format!("{}", ClockTime::NONE), "NONE");
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let t1 = clock.now();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.now() > t1);
    }

    #[test]
    fn test_running_time_accumulates_across_pauses() {
        let manual = Arc::new(ManualClock::new("manual"));
        let timing = PipelineClock::new();
        assert!(timing.select(manual.clone()));
        assert!(!timing.select(manual.clone()));

        manual.set(ClockTime::from_secs(10));
        assert_eq!(timing.play(), ClockTime::from_secs(10));

        manual.advance(ClockTime::from_secs(2));
        assert_eq!(timing.running_time(), ClockTime::from_secs(2));
        timing.pause();
        assert!(timing.base_time().is_none());

        // Paused time does not count.
        manual.advance(ClockTime::from_secs(5));
        assert_eq!(timing.running_time(), ClockTime::from_secs(2));
        assert_eq!(timing.play(), ClockTime::from_secs(15));

        timing.reset();
        assert_eq!(timing.running_time(), ClockTime::ZERO);
    }

    #[test]
    fn test_play_without_clock() {
        let timing = PipelineClock::new();
        assert!(timing.play().is_none());
    }
}
