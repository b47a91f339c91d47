use foundation::time::Time;

/// Seconds a session must wait between marker placements.
pub const DEFAULT_COOLDOWN_SECONDS: u32 = 60;

/// Outcome of a cooldown check.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Acquire {
    pub allowed: bool,
    /// Whole seconds until the next placement is allowed (0 when allowed).
    pub remaining_seconds: u32,
}

/// Per-session placement rate limiter.
///
/// Checking and recording are separate steps: [`Cooldown::try_acquire`] never
/// mutates, and the caller decides when the attempt counts via
/// [`Cooldown::record`]. State lives only as long as the owning session.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Cooldown {
    cooldown_seconds: u32,
    last_placement_at: Option<Time>,
}

impl Cooldown {
    pub fn new(cooldown_seconds: u32) -> Self {
        Self {
            cooldown_seconds,
            last_placement_at: None,
        }
    }

    pub fn cooldown_seconds(&self) -> u32 {
        self.cooldown_seconds
    }

    pub fn last_placement_at(&self) -> Option<Time> {
        self.last_placement_at
    }

    pub fn try_acquire(&self, now: Time) -> Acquire {
        let Some(last) = self.last_placement_at else {
            return Acquire {
                allowed: true,
                remaining_seconds: 0,
            };
        };

        let window = f64::from(self.cooldown_seconds);
        let elapsed = now.since(last);
        if elapsed >= window {
            return Acquire {
                allowed: true,
                remaining_seconds: 0,
            };
        }

        // A clock that stepped backwards never shortens the wait.
        let remaining = (window - elapsed.max(0.0)).ceil();
        Acquire {
            allowed: false,
            remaining_seconds: remaining as u32,
        }
    }

    pub fn record(&mut self, now: Time) {
        self.last_placement_at = Some(now);
    }
}

impl Default for Cooldown {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_SECONDS)
    }
}
