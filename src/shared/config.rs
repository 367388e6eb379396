//! Application configuration. Paths, scheduler cadence, viability thresholds.

use serde::Deserialize;

/// Default scheduler cadence between pipeline runs, in minutes.
pub const DEFAULT_CYCLE_MINUTES: u64 = 15;

/// Viability thresholds are business constants with sensible defaults, not
/// hard-coded law; deployments may tighten or relax them via environment.
pub const DEFAULT_MAX_DISTANCE_KM: f64 = 30.0;
pub const DEFAULT_MAX_DURATION_MIN: u32 = 60;
pub const DEFAULT_MIN_PASSENGERS: u32 = 3;

/// Cap on members considered for subset enumeration per group. Enumeration is
/// exponential in group size, so oversized groups are truncated to their
/// oldest members and the surplus re-enters the pool next run.
pub const DEFAULT_MAX_GROUP_SIZE: usize = 16;

/// How the dispatcher carves offers out of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStrategy {
    /// Keep selecting the best remaining proposal until the leftover request
    /// count drops below the minimum fleet capacity.
    #[default]
    ExhaustCapacity,
    /// Stop after the single best offer per group.
    SingleOffer,
}

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    /// Base directory for the SQLite database. Read from COPOOL_DATA_DIR.
    pub data_dir: Option<String>,

    /// Minutes between scheduled pipeline runs. Read from COPOOL_CYCLE_MINUTES.
    #[serde(default)]
    pub cycle_minutes: Option<u64>,

    /// Viability: maximum shared-route length in km. COPOOL_MAX_DISTANCE_KM.
    #[serde(default)]
    pub max_distance_km: Option<f64>,

    /// Viability: maximum estimated route duration in minutes. COPOOL_MAX_DURATION_MIN.
    #[serde(default)]
    pub max_duration_min: Option<u32>,

    /// Viability: minimum passengers per offer. COPOOL_MIN_PASSENGERS.
    #[serde(default)]
    pub min_passengers: Option<u32>,

    /// Cap on group members entering subset enumeration. COPOOL_MAX_GROUP_SIZE.
    #[serde(default)]
    pub max_group_size: Option<usize>,

    /// Dispatch strategy: "exhaust_capacity" (default) or "single_offer".
    /// COPOOL_DISPATCH_STRATEGY.
    #[serde(default)]
    pub dispatch_strategy: Option<DispatchStrategy>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        c = c.add_source(config::Environment::with_prefix("COPOOL"));
        if let Ok(path) = std::env::var("COPOOL_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        c.build()?.try_deserialize()
    }

    pub fn data_dir_or_default(&self) -> String {
        self.data_dir.clone().unwrap_or_else(|| "./data".to_string())
    }

    pub fn cycle_minutes_or_default(&self) -> u64 {
        self.cycle_minutes.unwrap_or(DEFAULT_CYCLE_MINUTES)
    }

    pub fn max_distance_km_or_default(&self) -> f64 {
        self.max_distance_km.unwrap_or(DEFAULT_MAX_DISTANCE_KM)
    }

    pub fn max_duration_min_or_default(&self) -> u32 {
        self.max_duration_min.unwrap_or(DEFAULT_MAX_DURATION_MIN)
    }

    pub fn min_passengers_or_default(&self) -> u32 {
        self.min_passengers.unwrap_or(DEFAULT_MIN_PASSENGERS)
    }

    pub fn max_group_size_or_default(&self) -> usize {
        self.max_group_size.unwrap_or(DEFAULT_MAX_GROUP_SIZE)
    }

    pub fn dispatch_strategy_or_default(&self) -> DispatchStrategy {
        self.dispatch_strategy.unwrap_or_default()
    }
}
