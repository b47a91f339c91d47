use foundation::ids::UserId;
use foundation::time::Time;

use crate::cooldown::Cooldown;

/// Runtime state of one authenticated user.
///
/// A session starts when the identity provider reports a user and ends when
/// that user signs out or another user signs in. Per-session state such as
/// the placement cooldown does not outlive it.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    user_id: UserId,
    started_at: Time,
    cooldown: Cooldown,
}

impl Session {
    pub fn new(user_id: UserId, started_at: Time, cooldown_seconds: u32) -> Self {
        Self {
            user_id,
            started_at,
            cooldown: Cooldown::new(cooldown_seconds),
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn started_at(&self) -> Time {
        self.started_at
    }

    pub fn owns(&self, owner_id: &UserId) -> bool {
        &self.user_id == owner_id
    }

    pub fn cooldown(&self) -> &Cooldown {
        &self.cooldown
    }

    pub fn cooldown_mut(&mut self) -> &mut Cooldown {
        &mut self.cooldown
    }
}
