//! Builds the immutable planning snapshot
//!
//! Stages run in a fixed order: source groups, active commands, the farm
//! assistant listing (targets and templates), optional discovery of unclaimed
//! villages, then the policy filter.

use crate::clock::ArrivalParser;
use crate::collector::{Collector, ListingEndpoint};
use crate::config::{ListingConfig, Policy, WorldConfig};
use crate::types::{
    AggregationReport, AttackTemplate, CommandTimeline, HttpRequest, PlanningSnapshot,
    SourceVillage, Target, TemplateRow, TemplateSet, TemplateSlot, ThreatLevel,
};
use crate::{FarmError, FarmResult, PageParser, RemoteClock};
use farm_common::{Coord, GameSession};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// `a` is an earlier deadline than `b`; no deadline is later than any deadline
fn earlier_deadline(a: Option<i64>, b: Option<i64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a < b,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Whether a target survives the policy filter
pub fn target_allowed(target: &Target, policy: &Policy) -> bool {
    if target.wall > policy.wall_ceiling {
        return false;
    }
    match target.threat {
        ThreatLevel::None => true,
        ThreatLevel::PartialLoss => policy.allow_partial_loss_targets,
        ThreatLevel::FullDefense => false,
    }
}

pub struct Aggregator {
    collector: Collector,
    parser: Arc<dyn PageParser + Send + Sync>,
    clock: Arc<dyn RemoteClock + Send + Sync>,
    session: GameSession,
    world: WorldConfig,
    listings: ListingConfig,
    arrivals: ArrivalParser,
}

impl Aggregator {
    pub fn new(
        collector: Collector,
        parser: Arc<dyn PageParser + Send + Sync>,
        clock: Arc<dyn RemoteClock + Send + Sync>,
        session: GameSession,
        world: WorldConfig,
        listings: ListingConfig,
    ) -> Self {
        let arrivals = ArrivalParser::for_world(&world);
        Self {
            collector,
            parser,
            clock,
            session,
            world,
            listings,
            arrivals,
        }
    }

    pub fn sources_endpoint(&self, group_id: u64) -> ListingEndpoint {
        ListingEndpoint::new(
            self.session.game_url(
                self.session.village_id,
                &format!("screen=overview_villages&mode=combined&group={}", group_id),
            ),
            "page",
            -1,
            self.listings.source_page_capacity,
        )
    }

    pub fn commands_endpoint(&self) -> ListingEndpoint {
        ListingEndpoint::new(
            self.session.game_url(
                self.session.village_id,
                "screen=overview_villages&mode=commands&type=attack&group=0",
            ),
            "page",
            -1,
            self.listings.command_page_capacity,
        )
    }

    pub fn farm_endpoint(&self) -> ListingEndpoint {
        ListingEndpoint::new(
            self.session.game_url(
                self.session.village_id,
                "screen=am_farm&order=distance&dir=asc",
            ),
            "Farm_page",
            0,
            self.listings.farm_page_capacity,
        )
    }

    pub fn map_url(&self) -> String {
        self.session.world_path("map/village.txt")
    }

    /// Run every stage and return the snapshot with its aggregation report.
    ///
    /// Only missing templates, or a farm listing that cannot be read at all,
    /// fail the whole pass.
    pub async fn snapshot(&self, policy: &Policy) -> FarmResult<(PlanningSnapshot, AggregationReport)> {
        let now = self.clock.now();
        let mut report = AggregationReport::default();

        let sources = self.collect_sources(policy, now, &mut report).await;

        let mut timeline = match self.collect_timeline(now).await {
            Ok(timeline) => timeline,
            Err(error) => {
                warn!(%error, "commands listing failed, continuing without it");
                report.failed_listings.push(("commands".to_string(), error.to_string()));
                CommandTimeline::new()
            }
        };

        let (mut targets, templates) = self.collect_farm(&mut timeline).await?;

        if policy.include_unclaimed_targets {
            match self.discover_unclaimed(policy, &sources, &targets).await {
                Ok(found) => {
                    report.unclaimed_added = found.len();
                    targets.extend(found);
                }
                Err(error) => {
                    warn!(%error, "map directory failed, continuing without discovery");
                    report.failed_listings.push(("map".to_string(), error.to_string()));
                }
            }
        }

        report.targets_seen = targets.len();
        targets.retain(|target| target_allowed(target, policy));
        report.targets_filtered = report.targets_seen - targets.len();

        info!(
            sources = sources.len(),
            targets = targets.len(),
            filtered = report.targets_filtered,
            arrivals = timeline.len(),
            failed_groups = report.failed_groups.len(),
            "snapshot built"
        );

        let snapshot = PlanningSnapshot {
            taken_at: now,
            sources,
            targets,
            templates,
            timeline,
        };
        Ok((snapshot, report))
    }

    /// Walk each group's listing in turn and merge sources by coordinate
    pub async fn collect_sources(
        &self,
        policy: &Policy,
        now: i64,
        report: &mut AggregationReport,
    ) -> Vec<SourceVillage> {
        let mut sources: Vec<SourceVillage> = Vec::new();
        let mut index_by_coord: HashMap<Coord, usize> = HashMap::new();

        for group in &policy.groups {
            let deadline = group
                .return_within_minutes
                .map(|minutes| now + i64::from(minutes) * 60);
            let endpoint = self.sources_endpoint(group.group_id);

            let rows = match self
                .collector
                .collect(&endpoint, |body| self.parser.source_rows(body, &self.world.units))
                .await
            {
                Ok(rows) => rows,
                Err(error) => {
                    warn!(group = group.group_id, %error, "source group skipped");
                    report.failed_groups.push((group.group_id, error.to_string()));
                    continue;
                }
            };
            debug!(group = group.group_id, villages = rows.len(), "source group collected");

            for row in rows {
                match index_by_coord.get(&row.coord) {
                    Some(&at) => {
                        let existing = &mut sources[at];
                        if earlier_deadline(deadline, existing.return_deadline) {
                            existing.return_deadline = deadline;
                            existing.earliest_available = deadline.unwrap_or(0);
                        }
                    }
                    None => {
                        index_by_coord.insert(row.coord, sources.len());
                        sources.push(SourceVillage {
                            id: row.id,
                            name: row.name,
                            coord: row.coord,
                            troops: row.troops.farm_eligible(),
                            earliest_available: deadline.unwrap_or(0),
                            return_deadline: deadline,
                        });
                    }
                }
            }
        }

        sources
    }

    /// Arrivals of the player's own outgoing commands
    pub async fn collect_timeline(&self, now: i64) -> FarmResult<CommandTimeline> {
        let endpoint = self.commands_endpoint();
        let rows = self
            .collector
            .collect(&endpoint, |body| self.parser.command_rows(body))
            .await?;

        let mut timeline = CommandTimeline::new();
        for row in rows {
            match self.arrivals.parse(&row.arrival_text, now) {
                Some(arrival) => timeline.append(row.target, arrival),
                None => debug!(coord = %row.target, text = %row.arrival_text, "unreadable arrival skipped"),
            }
        }
        Ok(timeline)
    }

    /// Farm targets plus the two templates from the first farm page.
    ///
    /// Arrivals shown on farm rows are added to `timeline`.
    pub async fn collect_farm(
        &self,
        timeline: &mut CommandTimeline,
    ) -> FarmResult<(Vec<Target>, TemplateSet)> {
        let endpoint = self.farm_endpoint();
        let mut template_rows: Option<Vec<TemplateRow>> = None;

        let rows = self
            .collector
            .collect(&endpoint, |body| {
                if template_rows.is_none() {
                    template_rows = Some(self.parser.templates(body));
                }
                self.parser.farm_rows(body)
            })
            .await?;

        let templates = self.template_set(template_rows.unwrap_or_default())?;

        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for row in rows {
            if let Some(arrival) = row.arrival {
                timeline.append(row.coord, arrival);
            }
            if seen.insert(row.coord) {
                targets.push(Target {
                    id: row.id,
                    coord: row.coord,
                    threat: row.threat,
                    wall: row.wall,
                    loot_full: row.loot_full,
                });
            }
        }
        Ok((targets, templates))
    }

    fn template_set(&self, rows: Vec<TemplateRow>) -> FarmResult<TemplateSet> {
        let mut rows = rows.into_iter();
        let (a, b) = match (rows.next(), rows.next()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(FarmError::missing_templates("farm page shows fewer than two templates")),
        };

        let default = AttackTemplate::new(a.id, TemplateSlot::A, a.troops.farm_eligible(), &self.world)
            .ok_or_else(|| FarmError::missing_templates("template A requires no units"))?;
        let larger = AttackTemplate::new(b.id, TemplateSlot::B, b.troops.farm_eligible(), &self.world)
            .ok_or_else(|| FarmError::missing_templates("template B requires no units"))?;
        Ok(TemplateSet { default, larger })
    }

    /// Unclaimed villages from the map directory that match the name marker,
    /// are not known targets and lie within reach of some source
    pub async fn discover_unclaimed(
        &self,
        policy: &Policy,
        sources: &[SourceVillage],
        known: &[Target],
    ) -> FarmResult<Vec<Target>> {
        let response = self
            .collector
            .dispatcher()
            .fetch(HttpRequest::get(self.map_url()))
            .await?;

        let known: HashSet<Coord> = known.iter().map(|t| t.coord).collect();
        let found: Vec<Target> = self
            .parser
            .map_entries(&response.body)
            .into_iter()
            .filter(|entry| entry.owner_id == 0)
            .filter(|entry| entry.name.contains(policy.unclaimed_name_marker.as_str()))
            .filter(|entry| !known.contains(&entry.coord))
            .filter(|entry| {
                sources
                    .iter()
                    .any(|s| s.coord.distance(&entry.coord) < policy.max_distance)
            })
            .map(|entry| Target {
                id: entry.id,
                coord: entry.coord,
                threat: ThreatLevel::None,
                wall: 0,
                loot_full: false,
            })
            .collect();

        debug!(added = found.len(), "unclaimed villages discovered");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::{DispatcherConfig, GroupSelection};
    use crate::dispatcher::Dispatcher;
    use crate::markup::MarkupParser;
    use crate::types::HttpResponse;
    use crate::Transport;
    use async_trait::async_trait;
    use farm_common::UnitKind;

    // 2026-10-16 10:00 UTC, 12:00 server time at +2
    const NOW: i64 = 1_792_144_800;

    /// Answers by URL fragment; unknown URLs get a 500
    struct FakeGame {
        routes: Vec<(String, String)>,
    }

    #[async_trait]
    impl Transport for FakeGame {
        async fn send(&self, request: &HttpRequest) -> FarmResult<HttpResponse> {
            for (fragment, body) in &self.routes {
                if request.url.contains(fragment.as_str()) {
                    return Ok(HttpResponse::ok(body.clone()));
                }
            }
            Ok(HttpResponse {
                status: 500,
                headers: Default::default(),
                body: String::new(),
            })
        }
    }

    fn world() -> WorldConfig {
        WorldConfig {
            units: vec![UnitKind::Spear, UnitKind::Sword, UnitKind::Axe, UnitKind::Light, UnitKind::Ram],
            utc_offset_hours: 2,
            ..WorldConfig::default()
        }
    }

    fn source_page(rows: &[(u64, &str, [u32; 5])]) -> String {
        let mut body = String::from("<table id=\"combined_table\">");
        for (id, label, troops) in rows {
            body.push_str(&format!(
                "<tr><td><span class=\"quickedit-vn\" data-id=\"{}\"><span class=\"quickedit-label\">{}</span></span></td>",
                id, label
            ));
            for count in troops {
                body.push_str(&format!("<td class=\"unit-item\">{}</td>", count));
            }
            body.push_str("</tr>");
        }
        body.push_str("</table>");
        body
    }

    fn command_page(rows: &[(&str, &str)]) -> String {
        rows.iter()
            .map(|(label, arrival)| {
                format!(
                    "<tr><td><span class=\"quickedit-label\">{}</span></td><td>{}</td></tr>",
                    label, arrival
                )
            })
            .collect()
    }

    /// `(id, coord, dot, loot_full, wall, endtime)`
    fn farm_page(rows: &[(u64, &str, &str, bool, &str, Option<i64>)]) -> String {
        let mut body = String::from(
            "<input name=\"spear[11]\" value=\"20\"><input name=\"light[11]\" value=\"0\">\
             <input name=\"spear[12]\" value=\"0\"><input name=\"light[12]\" value=\"5\">",
        );
        for (id, coord, dot, loot, wall, end) in rows {
            body.push_str(&format!(
                "<tr id=\"village_{}\"><td></td><td><img src=\"dots/{}.png\"></td><td><img src=\"max_loot/{}.png\"></td>\
                 <td>({}) K55</td><td></td><td></td><td>{}</td><td>{}</td></tr>",
                id,
                dot,
                u8::from(*loot),
                coord,
                wall,
                end.map(|t| format!("<span data-endtime=\"{}\"></span>", t)).unwrap_or_default()
            ));
        }
        body
    }

    fn aggregator(routes: Vec<(&str, String)>) -> Aggregator {
        let transport = Arc::new(FakeGame {
            routes: routes.into_iter().map(|(f, b)| (f.to_string(), b)).collect(),
        });
        let config = DispatcherConfig {
            lanes: 5,
            max_attempts: 1,
        };
        let dispatcher = Dispatcher::new(&config, transport);
        Aggregator::new(
            Collector::new(dispatcher, 10),
            Arc::new(MarkupParser::new()),
            Arc::new(FixedClock(NOW)),
            GameSession::new("https://w1.example", "csrf"),
            world(),
            ListingConfig::default(),
        )
    }

    fn standard_routes() -> Vec<(&'static str, String)> {
        vec![
            (
                "mode=combined&group=1",
                source_page(&[
                    (1, "North (500|500) K55", [100, 0, 0, 10, 4]),
                    (2, "South (500|520) K55", [50, 0, 0, 0, 0]),
                ]),
            ),
            (
                "mode=combined&group=2",
                source_page(&[(1, "North (500|500) K55", [100, 0, 0, 10, 4])]),
            ),
            (
                "mode=commands",
                command_page(&[("Attack on (503|500) K55", "today at 12:30:00:000")]),
            ),
            (
                "screen=am_farm",
                farm_page(&[
                    (70, "503|500", "green", false, "0", Some(NOW + 900)),
                    (71, "504|500", "yellow", true, "1", None),
                    (72, "505|500", "red", false, "0", None),
                    (73, "506|500", "green", false, "3", None),
                ]),
            ),
            (
                "map/village.txt",
                "900,Bonus+farm,501,501,0,100,0\n901,Other,502,502,0,100,0\n902,Bonus+owned,503,503,77,100,0\n903,Bonus+far,700,700,0,100,0\n70,Bonus,503,500,0,50,0\n"
                    .to_string(),
            ),
        ]
    }

    fn policy() -> Policy {
        Policy {
            groups: vec![
                GroupSelection { group_id: 1, return_within_minutes: None },
                GroupSelection { group_id: 2, return_within_minutes: Some(60) },
            ],
            ..Policy::default()
        }
    }

    #[tokio::test]
    async fn test_snapshot_merges_groups_by_earlier_deadline() {
        let aggregator = aggregator(standard_routes());
        let (snapshot, report) = aggregator.snapshot(&policy()).await.unwrap();

        assert_eq!(snapshot.taken_at, NOW);
        assert_eq!(snapshot.sources.len(), 2);
        let north = &snapshot.sources[0];
        assert_eq!(north.id, 1);
        assert_eq!(north.return_deadline, Some(NOW + 3600));
        assert_eq!(north.earliest_available, NOW + 3600);
        // rams are not farm-eligible
        assert_eq!(north.troops.get(UnitKind::Ram), 0);
        assert_eq!(north.troops.get(UnitKind::Light), 10);

        let south = &snapshot.sources[1];
        assert_eq!(south.return_deadline, None);
        assert_eq!(south.earliest_available, 0);
        assert!(report.failed_groups.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_timeline_and_filter() {
        let aggregator = aggregator(standard_routes());
        let (snapshot, report) = aggregator.snapshot(&policy()).await.unwrap();

        // 12:30 server time at +2 is 10:30 UTC
        assert_eq!(
            snapshot.timeline.arrivals(&Coord::new(503, 500)),
            &[NOW + 900, NOW + 1800]
        );

        let ids: Vec<u64> = snapshot.targets.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![70]);
        assert_eq!(report.targets_seen, 4);
        assert_eq!(report.targets_filtered, 3);

        assert_eq!(snapshot.templates.default.id, 11);
        assert_eq!(snapshot.templates.larger.id, 12);
        assert_eq!(snapshot.templates.larger.troops.get(UnitKind::Light), 5);
    }

    #[tokio::test]
    async fn test_partial_loss_allowed_by_policy() {
        let aggregator = aggregator(standard_routes());
        let policy = Policy {
            allow_partial_loss_targets: true,
            ..policy()
        };
        let (snapshot, _) = aggregator.snapshot(&policy).await.unwrap();
        let ids: Vec<u64> = snapshot.targets.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![70, 71]);
    }

    #[tokio::test]
    async fn test_failed_group_is_reported_and_skipped() {
        let aggregator = aggregator(standard_routes());
        let mut policy = policy();
        policy.groups.insert(0, GroupSelection { group_id: 9, return_within_minutes: None });

        let (snapshot, report) = aggregator.snapshot(&policy).await.unwrap();
        assert_eq!(report.failed_groups.len(), 1);
        assert_eq!(report.failed_groups[0].0, 9);
        assert_eq!(snapshot.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_commands_listing_degrades_to_empty() {
        let routes = standard_routes()
            .into_iter()
            .filter(|(fragment, _)| *fragment != "mode=commands")
            .collect();
        let aggregator = aggregator(routes);
        let (snapshot, report) = aggregator.snapshot(&policy()).await.unwrap();

        assert_eq!(report.failed_listings.len(), 1);
        assert_eq!(report.failed_listings[0].0, "commands");
        // only the farm row's own arrival is left
        assert_eq!(snapshot.timeline.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_templates_abort() {
        let routes = standard_routes()
            .into_iter()
            .map(|(fragment, body)| {
                if fragment == "screen=am_farm" {
                    (fragment, "<tr id=\"village_1\"><td>(1|1)</td></tr>".to_string())
                } else {
                    (fragment, body)
                }
            })
            .collect();
        let aggregator = aggregator(routes);
        let result = aggregator.snapshot(&policy()).await;
        assert!(matches!(result, Err(FarmError::MissingTemplates { .. })));
    }

    #[tokio::test]
    async fn test_discovery_adds_unclaimed_matches() {
        let aggregator = aggregator(standard_routes());
        let policy = Policy {
            include_unclaimed_targets: true,
            unclaimed_name_marker: "Bonus".to_string(),
            ..policy()
        };
        let (snapshot, report) = aggregator.snapshot(&policy).await.unwrap();

        assert_eq!(report.unclaimed_added, 1);
        let discovered = snapshot.targets.iter().find(|t| t.id == 900).unwrap();
        assert_eq!(discovered.threat, ThreatLevel::None);
        assert_eq!(discovered.coord, Coord::new(501, 501));
        // farm row 70 is already known, so its map entry is not added twice
        assert_eq!(snapshot.targets.iter().filter(|t| t.coord == Coord::new(503, 500)).count(), 1);
    }

    #[test]
    fn test_earlier_deadline_ordering() {
        assert!(earlier_deadline(Some(1), Some(2)));
        assert!(!earlier_deadline(Some(2), Some(1)));
        assert!(earlier_deadline(Some(5), None));
        assert!(!earlier_deadline(None, Some(5)));
        assert!(!earlier_deadline(None, None));
    }
}
