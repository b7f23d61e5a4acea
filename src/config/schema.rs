//! Configuration schema for arena templates.
//!
//! Templates are immutable blueprints: once registered with the arena
//! manager they are never mutated, only instantiated. Durations are written
//! as humantime strings (`"10s"`, `"5m"`) in YAML.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Top-level configuration file: a list of arena templates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArenasConfig {
    /// Arena templates to register at startup.
    #[serde(default)]
    pub templates: Vec<ArenaTemplate>,
}

/// Immutable definition of a repeatable match configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaTemplate {
    /// Unique template name.
    pub name: String,

    /// Opaque playing-space token handed through to boundary/restoration
    /// modules. The core never inspects it.
    #[serde(default)]
    pub playing_space: String,

    /// Minimum roster size to start a countdown, and the floor below which
    /// an active match forfeits.
    pub min_players: usize,

    /// Team layout.
    pub teams: TeamLayout,

    /// Countdown between reaching the minimum and going active. A reversal
    /// to waiting discards elapsed countdown entirely.
    #[serde(with = "duration_str", default = "defaults::countdown")]
    pub countdown: Duration,

    /// Announcement window between the decision and cleanup.
    #[serde(with = "duration_str", default = "defaults::announce_delay")]
    pub announce_delay: Duration,

    /// How long restoration modules get before the instance is forced idle
    /// with a degraded-restoration warning.
    #[serde(with = "duration_str", default = "defaults::restore_timeout")]
    pub restore_timeout: Duration,

    /// Hard time limit for the active phase. `None` means unlimited.
    #[serde(with = "opt_duration_str", default)]
    pub time_limit: Option<Duration>,

    /// Fallback victory-poll interval while active.
    #[serde(with = "duration_str", default = "defaults::tick_interval")]
    pub tick_interval: Duration,

    /// Identifier of the victory rule deciding this template's matches.
    pub victory_rule: String,

    /// Score threshold consumed by the `score_target` rule.
    #[serde(default)]
    pub score_target: Option<u64>,
}

impl ArenaTemplate {
    /// Maximum roster size implied by the team layout.
    #[must_use]
    pub fn max_players(&self) -> usize {
        usize::from(self.teams.count) * self.teams.capacity
    }
}

/// Team layout: how many teams and how large.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamLayout {
    /// Number of teams.
    pub count: u8,
    /// Roster capacity per team.
    pub capacity: usize,
    /// Optional display names, by team index.
    #[serde(default)]
    pub names: Option<Vec<String>>,
}

mod defaults {
    use std::time::Duration;

    pub(super) const fn countdown() -> Duration {
        Duration::from_secs(10)
    }

    pub(super) const fn announce_delay() -> Duration {
        Duration::from_secs(5)
    }

    pub(super) const fn restore_timeout() -> Duration {
        Duration::from_secs(30)
    }

    pub(super) const fn tick_interval() -> Duration {
        Duration::from_secs(1)
    }
}

/// Serde adapter for humantime duration strings.
mod duration_str {
    use super::{Deserialize, Deserializer, Duration, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional humantime duration strings.
mod opt_duration_str {
    use super::{Deserialize, Deserializer, Duration, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&humantime::format_duration(*d).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        raw.map(|raw| humantime::parse_duration(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Template construction helpers shared by unit and integration tests.
#[doc(hidden)]
pub mod test_support {
    use super::{ArenaTemplate, TeamLayout};
    use std::time::Duration;

    /// Builds a template with short timers suitable for paused-time tests.
    #[must_use]
    pub fn template(
        name: &str,
        team_count: u8,
        team_capacity: usize,
        min_players: usize,
    ) -> ArenaTemplate {
        ArenaTemplate {
            name: name.to_string(),
            playing_space: format!("space:{name}"),
            min_players,
            teams: TeamLayout {
                count: team_count,
                capacity: team_capacity,
                names: None,
            },
            countdown: Duration::from_secs(10),
            announce_delay: Duration::from_secs(5),
            restore_timeout: Duration::from_secs(30),
            time_limit: Some(Duration::from_secs(300)),
            tick_interval: Duration::from_secs(1),
            victory_rule: "last_team_standing".to_string(),
            score_target: None,
        }
    }
}
