//! Synthetic sample generator.
//!
//! The generator is a bounded random walk with a slowly drifting trend.
//! Each tick it perturbs the trend, adds a random component scaled by the
//! square root of elapsed time and a trend component scaled by elapsed time,
//! then clamps the value into `[floor, ceiling]`. Hitting a bound forces
//! the trend to point back inside.
//!
//! # Design Principles
//!
//! - All mutable state lives in [`GeneratorState`], owned by the
//!   [`Generator`]. There is no ambient process-wide state.
//! - Randomness is injected. Tests and seeded runs use
//!   [`SmallRng::seed_from_u64`] so sequences are reproducible.
//! - Time is injected through [`Generator::tick_at`]; [`Generator::tick`]
//!   is the wall-clock convenience used by the timer task.

use std::time::Instant;

use chrono::{DateTime, Local};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Serialize, Serializer};

use crate::config::GeneratorConfig;

/// Wire format for [`Sample::timestamp`].
const TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// One generated data point.
///
/// Serializes as `{"price": <f64>, "timestamp": "HH:MM:SS"}`. The
/// `sequence` number orders samples within one generator run and is not
/// part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    /// The generated value.
    #[serde(rename = "price")]
    pub value: f64,

    /// Local wall-clock time the sample was produced.
    #[serde(serialize_with = "serialize_clock_time")]
    pub timestamp: DateTime<Local>,

    /// Position in generation order, restarting at 0 after a reset.
    #[serde(skip)]
    pub sequence: u64,
}

impl Sample {
    /// Create a sample with an explicit sequence number.
    pub const fn new(value: f64, timestamp: DateTime<Local>, sequence: u64) -> Self {
        Self {
            value,
            timestamp,
            sequence,
        }
    }

    /// The timestamp rendered in wire format (`HH:MM:SS`).
    pub fn clock_time(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

fn serialize_clock_time<S: Serializer>(
    timestamp: &DateTime<Local>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&timestamp.format(TIMESTAMP_FORMAT))
}

/// Tunable parameters of the random walk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorParams {
    /// Starting value, restored on reset.
    pub initial_value: f64,
    /// Lowest value that may be emitted.
    pub floor: f64,
    /// Highest value that may be emitted.
    pub ceiling: f64,
    /// Random component scale per square-root second.
    pub volatility: f64,
    /// Trend component scale per second.
    pub drift_rate: f64,
    /// Largest trend change per tick.
    pub max_trend_step: f64,
    /// Trend magnitude forced after hitting a bound.
    pub recovery_trend: f64,
}

impl From<&GeneratorConfig> for GeneratorParams {
    fn from(config: &GeneratorConfig) -> Self {
        Self {
            initial_value: config.initial_value,
            floor: config.floor,
            ceiling: config.ceiling,
            volatility: config.volatility,
            drift_rate: config.drift_rate,
            max_trend_step: config.max_trend_step,
            recovery_trend: config.recovery_trend,
        }
    }
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self::from(&GeneratorConfig::default())
    }
}

/// Mutable state of the random walk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorState {
    /// The most recently emitted value.
    pub current_value: f64,
    /// Market direction in `[-1, 1]`.
    pub trend: f64,
    /// When the previous tick (or reset) happened.
    pub last_update: Instant,
    /// Sequence number the next sample will carry.
    pub next_sequence: u64,
}

impl GeneratorState {
    /// The state a fresh or reset generator starts from: the initial value,
    /// a flat trend, and sequence 0.
    pub const fn initial(params: &GeneratorParams, now: Instant) -> Self {
        Self {
            current_value: params.initial_value,
            trend: 0.0,
            last_update: now,
            next_sequence: 0,
        }
    }
}

/// Bounded random-walk sample generator.
///
/// Not safe for concurrent use; the timer task owns it exclusively.
#[derive(Debug)]
pub struct Generator<R = SmallRng> {
    params: GeneratorParams,
    state: GeneratorState,
    rng: R,
}

impl Generator<SmallRng> {
    /// Build a generator from configuration, seeding from `config.seed`
    /// when present and from the OS otherwise.
    pub fn from_config(config: &GeneratorConfig) -> Self {
        let rng = config
            .seed
            .map_or_else(SmallRng::from_os_rng, SmallRng::seed_from_u64);
        Self::new(GeneratorParams::from(config), rng)
    }
}

impl<R: Rng> Generator<R> {
    /// Create a generator with explicit parameters and random source.
    pub fn new(params: GeneratorParams, rng: R) -> Self {
        Self::with_start(params, rng, Instant::now())
    }

    /// Create a generator whose elapsed-time tracking starts at `now`.
    pub const fn with_start(params: GeneratorParams, rng: R, now: Instant) -> Self {
        Self {
            params,
            state: GeneratorState::initial(&params, now),
            rng,
        }
    }

    /// Current state of the walk.
    pub const fn state(&self) -> &GeneratorState {
        &self.state
    }

    /// Parameters the walk runs with.
    pub const fn params(&self) -> &GeneratorParams {
        &self.params
    }

    /// Produce the next sample using the wall clock.
    pub fn tick(&mut self) -> Sample {
        self.tick_at(Instant::now(), Local::now())
    }

    /// Produce the next sample as if the tick happened at `now`.
    ///
    /// `timestamp` is the wall-clock time stamped on the sample. Elapsed
    /// time is measured from the previous tick (or reset) and saturates at
    /// zero if `now` is earlier.
    pub fn tick_at(&mut self, now: Instant, timestamp: DateTime<Local>) -> Sample {
        let elapsed = now
            .saturating_duration_since(self.state.last_update)
            .as_secs_f64();
        self.state.last_update = now;

        let step = self.params.max_trend_step;
        let trend_change = if step > 0.0 {
            self.rng.random_range(-step..=step)
        } else {
            0.0
        };
        self.state.trend = (self.state.trend + trend_change).clamp(-1.0, 1.0);

        let random_component =
            self.rng.random_range(-1.0_f64..=1.0) * self.params.volatility * elapsed.sqrt();
        let trend_component = self.state.trend * self.params.drift_rate * elapsed;
        self.state.current_value += random_component + trend_component;

        if self.state.current_value < self.params.floor {
            self.state.current_value = self.params.floor;
            self.state.trend = self.params.recovery_trend;
        }
        if self.state.current_value > self.params.ceiling {
            self.state.current_value = self.params.ceiling;
            self.state.trend = -self.params.recovery_trend;
        }

        let sequence = self.state.next_sequence;
        self.state.next_sequence = sequence.saturating_add(1);

        Sample::new(self.state.current_value, timestamp, sequence)
    }

    /// Replace the state with [`GeneratorState::initial`], measuring the
    /// next elapsed window from now.
    pub fn reset(&mut self) {
        self.reset_at(Instant::now());
    }

    /// Replace the state with [`GeneratorState::initial`] as of `now`.
    pub const fn reset_at(&mut self, now: Instant) {
        self.state = GeneratorState::initial(&self.params, now);
    }
}
