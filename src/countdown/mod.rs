//! Launch and holding-reward countdowns.
//!
//! Only the target instant is stored. Remaining time is always derived as
//! `target - now`, so every instance reading the same shared target shows
//! the same countdown without sharing tick state. The shared copy is
//! authoritative; the local mirror is a best-effort fallback.

use crate::clock::SharedClock;
use crate::config::SharedSettings;
use crate::error::ValidationError;
use crate::storage::{Store, keys};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CountdownKind {
    Launch,
    HoldingReward,
}

impl CountdownKind {
    pub const ALL: [CountdownKind; 2] = [CountdownKind::Launch, CountdownKind::HoldingReward];

    pub fn key(self) -> &'static str {
        match self {
            CountdownKind::Launch => keys::LAUNCH_COUNTDOWN,
            CountdownKind::HoldingReward => keys::REWARD_COUNTDOWN,
        }
    }

    pub fn mirror_key(self) -> &'static str {
        match self {
            CountdownKind::Launch => keys::LAUNCH_COUNTDOWN_MIRROR,
            CountdownKind::HoldingReward => keys::REWARD_COUNTDOWN_MIRROR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CountdownKind::Launch => "launch",
            CountdownKind::HoldingReward => "reward",
        }
    }
}

impl fmt::Display for CountdownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CountdownKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "launch" => Ok(CountdownKind::Launch),
            "reward" | "holding-reward" | "holdingReward" => Ok(CountdownKind::HoldingReward),
            other => Err(format!("unknown countdown {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownState {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub target_timestamp: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_update_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub cap_reached_flag: bool,
}

impl CountdownState {
    fn armed(now: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            target_timestamp: now + duration,
            last_update_timestamp: now,
            cap_reached_flag: false,
        }
    }

    /// Never negative.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.target_timestamp - now).max(Duration::zero())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.target_timestamp <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownTick {
    Active { remaining: Duration },
    /// The countdown hit zero and has already been re-armed as `state`.
    Expired {
        previous_target: DateTime<Utc>,
        state: CountdownState,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub state: CountdownState,
    pub remaining: Duration,
    pub cap_reached: bool,
    /// False when the shared write failed and only the mirror (if anything)
    /// holds the new target.
    pub shared_written: bool,
}

pub struct CountdownEngine {
    shared: Store,
    local: Store,
    clock: SharedClock,
    settings: SharedSettings,
}

impl CountdownEngine {
    pub fn new(shared: Store, local: Store, clock: SharedClock, settings: SharedSettings) -> Self {
        Self {
            shared,
            local,
            clock,
            settings,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn default_duration(&self, kind: CountdownKind) -> Duration {
        let settings = self.settings.read().await;
        let secs = match kind {
            CountdownKind::Launch => settings.launch_default_secs,
            CountdownKind::HoldingReward => settings.reward_default_secs,
        };
        Duration::seconds(secs as i64)
    }

    async fn ceiling(&self) -> Duration {
        Duration::seconds(self.settings.read().await.ceiling_secs as i64)
    }

    /// Current state, possibly already expired. An unexpired shared copy
    /// wins; otherwise an unexpired mirror; otherwise whatever shared copy
    /// exists. With nothing stored a fresh default countdown is armed.
    pub async fn state(&self, kind: CountdownKind) -> CountdownState {
        let now = self.now();
        let shared: Option<CountdownState> = self.shared.get(kind.key()).await;

        if let Some(state) = &shared {
            if !state.is_expired(now) {
                return state.clone();
            }
        }

        let mirror: Option<CountdownState> = self.local.get(kind.mirror_key()).await;
        if let Some(state) = mirror {
            if !state.is_expired(now) {
                debug!("{} countdown served from local mirror", kind);
                return state;
            }
        }

        if let Some(state) = shared {
            return state;
        }

        let state = CountdownState::armed(now, self.default_duration(kind).await);
        info!("⏳ {} countdown initialised, target {}", kind, state.target_timestamp);
        self.persist(kind, &state).await;
        state
    }

    pub async fn remaining(&self, kind: CountdownKind) -> Duration {
        self.state(kind).await.remaining(self.now())
    }

    /// One 1 Hz step. On expiry the countdown is re-armed before returning so
    /// the stored target is never left in the past.
    pub async fn tick(&self, kind: CountdownKind) -> CountdownTick {
        let now = self.now();
        let state = self.state(kind).await;

        if !state.is_expired(now) {
            return CountdownTick::Active {
                remaining: state.remaining(now),
            };
        }

        let rearmed = CountdownState::armed(now, self.default_duration(kind).await);
        self.persist(kind, &rearmed).await;
        info!(
            "⏰ {} countdown expired at {}, re-armed until {}",
            kind, state.target_timestamp, rearmed.target_timestamp
        );

        CountdownTick::Expired {
            previous_target: state.target_timestamp,
            state: rearmed,
        }
    }

    /// Pushes the target out by `seconds`, never beyond `now + ceiling`.
    /// Hitting the ceiling sets `cap_reached_flag`; any extension that fits
    /// clears it.
    pub async fn extend(&self, kind: CountdownKind, seconds: u64) -> Extension {
        let now = self.now();
        let ceiling = self.ceiling().await;
        let current = self.state(kind).await;

        let base = current.target_timestamp.max(now);
        let unclamped = base + Duration::seconds(seconds as i64);
        let limit = now + ceiling;

        let (target, cap_reached) = if unclamped > limit {
            (limit, true)
        } else {
            (unclamped, false)
        };

        let state = CountdownState {
            target_timestamp: target,
            last_update_timestamp: now,
            cap_reached_flag: cap_reached,
        };
        let shared_written = self.persist(kind, &state).await;

        if cap_reached {
            info!("🧢 {} countdown extension clamped to ceiling ({}s)", kind, ceiling.num_seconds());
        } else {
            info!("⏩ {} countdown extended by {}s", kind, seconds);
        }

        Extension {
            remaining: state.remaining(now),
            state,
            cap_reached,
            shared_written,
        }
    }

    /// Admin reset. `seconds` defaults to the kind's default duration; a
    /// launch reset may not exceed the ceiling.
    pub async fn reset(
        &self,
        kind: CountdownKind,
        seconds: Option<u64>,
    ) -> Result<CountdownState, ValidationError> {
        let duration = match seconds {
            Some(secs) => {
                let max = match kind {
                    CountdownKind::Launch => self.settings.read().await.ceiling_secs,
                    CountdownKind::HoldingReward => 7 * 86_400,
                };
                if secs == 0 || secs > max {
                    return Err(ValidationError::Range {
                        field: "seconds",
                        value: secs,
                        min: 1,
                        max,
                    });
                }
                Duration::seconds(secs as i64)
            }
            None => self.default_duration(kind).await,
        };

        let state = CountdownState::armed(self.now(), duration);
        self.persist(kind, &state).await;
        info!("🔁 {} countdown reset to {}s", kind, duration.num_seconds());
        Ok(state)
    }

    /// Shared store first, then the local mirror. Returns whether the shared
    /// write landed.
    async fn persist(&self, kind: CountdownKind, state: &CountdownState) -> bool {
        let shared_ok = match self.shared.try_set(kind.key(), state).await {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️ Failed to write {} countdown to shared store: {}", kind, e);
                false
            }
        };
        self.local.set(kind.mirror_key(), state).await;
        shared_ok
    }
}
