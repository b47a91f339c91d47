use foundation::time::Time;
use parking_lot::Mutex;

/// Source of wall-clock time.
///
/// Everything that stamps or compares times goes through a `Clock` so tests
/// can drive time deterministically with [`ManualClock`].
pub trait Clock: Send + Sync {
    fn now(&self) -> Time;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Time {
        Time::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Time>,
}

impl ManualClock {
    pub fn new(start: Time) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, t: Time) {
        *self.now.lock() = t;
    }

    pub fn advance(&self, secs: f64) {
        let mut now = self.now.lock();
        *now = now.plus(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Time {
        *self.now.lock()
    }
}
