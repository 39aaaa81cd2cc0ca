use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic session clock.
///
/// Timestamps are offsets from the timer's own start so records from
/// different backends line up on one axis.
pub trait Timer: Clone + Send + Sync {
    fn now(&self) -> Duration;

    fn elapsed(&self, since: Duration) -> Duration {
        self.now().saturating_sub(since)
    }

    fn sleep(&self, d: Duration);
}

/// Wall-clock timer backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    pub start: Instant,
}

impl Timer for HighPrecisionTimer {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(target_os = "linux"))]
        std::thread::sleep(duration);
    }

    /// Sleeps against an absolute monotonic target so a signal waking the
    /// thread early only resumes the wait.
    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{
            CLOCK_MONOTONIC, EINTR, TIMER_ABSTIME, clock_gettime, clock_nanosleep, timespec,
        };

        let mut now = timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `now` is a valid, writable timespec.
        if unsafe { clock_gettime(CLOCK_MONOTONIC, &mut now) } != 0 {
            std::thread::sleep(duration);
            return;
        }
        let nanos = now.tv_nsec as u64 + u64::from(duration.subsec_nanos());
        let target = timespec {
            tv_sec: now.tv_sec
                + duration.as_secs() as libc::time_t
                + (nanos / 1_000_000_000) as libc::time_t,
            tv_nsec: (nanos % 1_000_000_000) as libc::c_long,
        };

        loop {
            // SAFETY: `target` is a valid timespec and a null remainder pointer is allowed.
            let rc = unsafe {
                clock_nanosleep(CLOCK_MONOTONIC, TIMER_ABSTIME, &target, std::ptr::null_mut())
            };
            if rc != EINTR {
                break;
            }
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Simulated clock that only moves when someone sleeps on it.
///
/// Clones share the same clock, so a scripted participant and the test
/// observing it agree on the time.
#[derive(Debug, Clone, Default)]
pub struct VirtualTimer {
    nanos: Arc<AtomicU64>,
}

impl VirtualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        let step = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(step, Ordering::SeqCst);
    }
}

impl Timer for VirtualTimer {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, d: Duration) {
        self.advance(d)
    }
}

/// Hard end of a timed window on a given clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub start: Duration,
    pub duration: Duration,
}

impl Deadline {
    pub fn starting_now<T: Timer>(timer: &T, duration: Duration) -> Self {
        Self {
            start: timer.now(),
            duration,
        }
    }

    pub fn end(&self) -> Duration {
        self.start + self.duration
    }

    pub fn remaining<T: Timer>(&self, timer: &T) -> Duration {
        self.end().saturating_sub(timer.now())
    }

    pub fn expired<T: Timer>(&self, timer: &T) -> bool {
        timer.now() >= self.end()
    }

    /// Whether an offset from `start` falls strictly inside the window.
    pub fn contains(&self, offset: Duration) -> bool {
        offset < self.duration
    }

    /// Sleeps until the deadline, resuming after any early wake-up.
    /// Returns immediately once it has passed.
    pub fn wait<T: Timer>(&self, timer: &T) {
        while !self.expired(timer) {
            timer.sleep(self.remaining(timer));
        }
    }
}
