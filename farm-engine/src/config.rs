//! Configuration types and loading
//!
//! Everything is plain serde data with defaults, read from a TOML file and
//! then adjusted by a small set of environment overrides.

use crate::{FarmError, FarmResult};
use farm_common::UnitKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FarmConfig {
    pub world: WorldConfig,
    pub dispatcher: DispatcherConfig,
    pub listings: ListingConfig,
    pub executor: ExecutorConfig,
    pub http: HttpConfig,
    pub policy: Policy,
    pub logging: LoggingConfig,
}

impl FarmConfig {
    /// Read a TOML file, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> FarmResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let mut config: FarmConfig = toml::from_str(&text)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// `FARM_WORLD_URL` and `FARM_LOG_LEVEL` take precedence over the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("FARM_WORLD_URL") {
            if !url.is_empty() {
                self.world.base_url = url;
            }
        }
        if let Ok(level) = std::env::var("FARM_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    pub fn validate(&self) -> FarmResult<()> {
        if self.dispatcher.lanes == 0 {
            return Err(FarmError::configuration("dispatcher", "lanes must be at least 1"));
        }
        if self.dispatcher.max_attempts == 0 {
            return Err(FarmError::configuration("dispatcher", "max_attempts must be at least 1"));
        }
        if self.world.world_speed <= 0.0 || self.world.unit_speed <= 0.0 {
            return Err(FarmError::configuration("world", "speeds must be positive"));
        }
        if self.world.units.is_empty() {
            return Err(FarmError::configuration("world", "unit column list is empty"));
        }
        if self.listings.source_page_capacity == 0 || self.listings.farm_page_capacity == 0 {
            return Err(FarmError::configuration("listings", "page capacity must be positive"));
        }
        if self.policy.max_distance <= 0.0 {
            return Err(FarmError::configuration("policy", "max_distance must be positive"));
        }
        if self.policy.min_spacing_seconds < 0 {
            return Err(FarmError::configuration("policy", "min_spacing_seconds cannot be negative"));
        }
        if !is_valid_level(&self.logging.level) {
            return Err(FarmError::configuration(
                "logging",
                format!("unknown log level {:?}", self.logging.level),
            ));
        }
        Ok(())
    }
}

/// World the session plays on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub base_url: String,
    pub world_speed: f64,
    pub unit_speed: f64,
    /// Unit columns as they appear in village listings
    pub units: Vec<UnitKind>,
    /// Offset of the server's local time from UTC, in hours
    pub utc_offset_hours: i32,
    pub time_keywords: TimeKeywords,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            base_url: "https://it94.tribals.it".to_string(),
            world_speed: 1.0,
            unit_speed: 1.0,
            units: vec![
                UnitKind::Spear,
                UnitKind::Sword,
                UnitKind::Axe,
                UnitKind::Spy,
                UnitKind::Light,
                UnitKind::Heavy,
                UnitKind::Ram,
                UnitKind::Catapult,
                UnitKind::Knight,
                UnitKind::Snob,
            ],
            utc_offset_hours: 1,
            time_keywords: TimeKeywords::default(),
        }
    }
}

impl WorldConfig {
    /// Effective travel seconds per field for a unit on this world
    pub fn seconds_per_field(&self, unit: UnitKind) -> f64 {
        unit.base_minutes_per_field() * 60.0 / (self.world_speed * self.unit_speed)
    }
}

/// Words the game uses for relative days in arrival times
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeKeywords {
    pub today: Vec<String>,
    pub tomorrow: Vec<String>,
    pub yesterday: Vec<String>,
}

impl Default for TimeKeywords {
    fn default() -> Self {
        Self {
            today: vec!["today".to_string(), "oggi".to_string()],
            tomorrow: vec!["tomorrow".to_string(), "domani".to_string()],
            yesterday: vec!["yesterday".to_string(), "ieri".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub lanes: usize,
    /// Total attempts per operation, the first one included
    pub max_attempts: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            lanes: 5,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    pub source_page_capacity: usize,
    pub command_page_capacity: usize,
    pub farm_page_capacity: usize,
    /// Upper bound on pages walked per listing
    pub max_pages: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            source_page_capacity: 1000,
            command_page_capacity: 1000,
            farm_page_capacity: 100,
            max_pages: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub debounce_ms: u64,
    /// Pause between triggers when the CLI drives the executor
    pub trigger_interval_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            trigger_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            connect_timeout_seconds: 10,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36".to_string(),
        }
    }
}

/// One village group to farm from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSelection {
    /// Group id as used by the overview screens, 0 for all villages
    pub group_id: u64,
    /// Troops from this group must be back within this many minutes
    #[serde(default)]
    pub return_within_minutes: Option<u32>,
}

/// What a planning cycle may do
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub groups: Vec<GroupSelection>,
    pub max_distance: f64,
    pub min_spacing_seconds: i64,
    pub wall_ceiling: u8,
    pub allow_partial_loss_targets: bool,
    pub send_larger_on_loot_full: bool,
    pub include_unclaimed_targets: bool,
    /// Name fragment that marks an unclaimed village worth farming
    pub unclaimed_name_marker: String,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            groups: vec![GroupSelection {
                group_id: 0,
                return_within_minutes: None,
            }],
            max_distance: 25.0,
            min_spacing_seconds: 300,
            wall_ceiling: 1,
            allow_partial_loss_targets: false,
            send_larger_on_loot_full: true,
            include_unclaimed_targets: false,
            unclaimed_name_marker: String::new(),
        }
    }
}

/// Logging configuration, consumed by the binary's subscriber setup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    pub json_format: bool,
    pub include_thread_names: bool,
    pub include_file_info: bool,
    pub enable_colors: bool,
    /// Daily rolling log file, in addition to stdout
    pub log_file: Option<String>,
    pub module_levels: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut module_levels = HashMap::new();
        module_levels.insert("farm_engine".to_string(), "info".to_string());
        module_levels.insert("reqwest".to_string(), "warn".to_string());
        module_levels.insert("hyper".to_string(), "warn".to_string());

        Self {
            level: "info".to_string(),
            json_format: false,
            include_thread_names: false,
            include_file_info: false,
            enable_colors: true,
            log_file: None,
            module_levels,
        }
    }
}

/// Check if a log level string is valid
pub fn is_valid_level(level: &str) -> bool {
    matches!(
        level.to_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    )
}
