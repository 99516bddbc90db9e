//! Core data types for the farm engine

use farm_common::{Coord, TroopVector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::config::WorldConfig;

/// HTTP method used by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
}

/// Outbound request handed to a [`crate::Transport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    /// Form-encoded body for POST requests
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn post_form(url: impl Into<String>, body: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded; charset=UTF-8".to_string(),
        );
        Self {
            method: Method::Post,
            url: url.into(),
            headers,
            body: Some(body.into()),
        }
    }
}

/// Response returned by a [`crate::Transport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A village that can send farm attacks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceVillage {
    pub id: u64,
    pub name: String,
    pub coord: Coord,
    /// Farm-eligible troops currently at home
    pub troops: TroopVector,
    /// Planning priority key, 0 when the source has no pending return
    pub earliest_available: i64,
    /// Troops sent from here must be back by this time
    pub return_deadline: Option<i64>,
}

/// Status marker shown next to a farm target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    None,
    PartialLoss,
    FullDefense,
}

/// A location that can be farmed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: u64,
    pub coord: Coord,
    pub threat: ThreatLevel,
    pub wall: u8,
    pub loot_full: bool,
}

/// Which of the two farm-assistant templates a command uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateSlot {
    A,
    B,
}

/// A fixed troop composition used for one farm command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackTemplate {
    pub id: u64,
    pub slot: TemplateSlot,
    pub troops: TroopVector,
    /// Travel seconds per field, set by the slowest required unit
    pub seconds_per_field: f64,
}

impl AttackTemplate {
    /// Build a template and derive its speed from the world's speed settings.
    ///
    /// Returns `None` when the template requires no units at all.
    pub fn new(id: u64, slot: TemplateSlot, troops: TroopVector, world: &WorldConfig) -> Option<Self> {
        let slowest = troops.slowest_unit()?;
        Some(Self {
            id,
            slot,
            troops,
            seconds_per_field: world.seconds_per_field(slowest),
        })
    }

    /// Travel time in whole seconds for the given distance
    pub fn travel_seconds(&self, distance: f64) -> i64 {
        (distance * self.seconds_per_field).round() as i64
    }
}

/// The default template and its larger-capacity alternate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSet {
    pub default: AttackTemplate,
    pub larger: AttackTemplate,
}

impl TemplateSet {
    pub fn get(&self, slot: TemplateSlot) -> &AttackTemplate {
        match slot {
            TemplateSlot::A => &self.default,
            TemplateSlot::B => &self.larger,
        }
    }
}

/// Arrival timestamps of every known command, per target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandTimeline {
    arrivals: BTreeMap<Coord, Vec<i64>>,
}

impl CommandTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an arrival, keeping each target's entries ordered
    pub fn append(&mut self, target: Coord, arrival: i64) {
        let entries = self.arrivals.entry(target).or_default();
        let at = entries.partition_point(|&t| t <= arrival);
        entries.insert(at, arrival);
    }

    pub fn arrivals(&self, target: &Coord) -> &[i64] {
        self.arrivals.get(target).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `candidate` is strictly more than `min_spacing` seconds away
    /// from every arrival already known for `target`.
    pub fn has_room(&self, target: &Coord, candidate: i64, min_spacing: i64) -> bool {
        self.arrivals(target)
            .iter()
            .all(|&t| (t - candidate).abs() > min_spacing)
    }

    /// Total number of recorded arrivals across all targets
    pub fn len(&self) -> usize {
        self.arrivals.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of one aggregation pass, beyond the data itself
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationReport {
    /// Groups whose listing could not be collected, with the reason
    pub failed_groups: Vec<(u64, String)>,
    /// Listings other than source groups that degraded to no data
    pub failed_listings: Vec<(String, String)>,
    pub targets_seen: usize,
    pub targets_filtered: usize,
    pub unclaimed_added: usize,
}

/// Immutable input to the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningSnapshot {
    pub taken_at: i64,
    pub sources: Vec<SourceVillage>,
    pub targets: Vec<Target>,
    pub templates: TemplateSet,
    pub timeline: CommandTimeline,
}

/// One planned farm command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub source_id: u64,
    pub source_coord: Coord,
    pub target_id: u64,
    pub target_coord: Coord,
    pub template_id: u64,
    pub template: TemplateSlot,
    pub distance: f64,
    pub arrival: i64,
    pub returns_at: i64,
}

/// Assignments planned for a single source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePlan {
    pub source_id: u64,
    pub source_coord: Coord,
    pub assignments: Vec<Assignment>,
    /// Troops left at the source once every assignment here is sent
    pub remaining: TroopVector,
}

/// Planner output, grouped by source in planning order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub by_source: Vec<SourcePlan>,
    pub total: usize,
}

impl Plan {
    /// All assignments in planning order
    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.by_source.iter().flat_map(|s| s.assignments.iter())
    }
}

/// Result of a full planning cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanReport {
    pub planned_at: i64,
    pub plan: Plan,
    pub aggregation: AggregationReport,
}

// Rows produced by a [`crate::PageParser`]

/// Rows extracted from one listing page, plus the page's navigation length
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted<T> {
    pub rows: Vec<T>,
    pub nav_len: usize,
}

impl<T> Extracted<T> {
    pub fn empty() -> Self {
        Self { rows: Vec::new(), nav_len: 0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub id: u64,
    pub name: String,
    pub coord: Coord,
    pub troops: TroopVector,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandRow {
    pub target: Coord,
    pub arrival_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FarmRow {
    pub id: u64,
    pub coord: Coord,
    pub threat: ThreatLevel,
    pub wall: u8,
    pub loot_full: bool,
    /// Arrival of the command already heading there, if the row shows one
    pub arrival: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateRow {
    pub id: u64,
    pub troops: TroopVector,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub id: u64,
    pub name: String,
    pub coord: Coord,
    /// 0 for unclaimed villages
    pub owner_id: u64,
}
