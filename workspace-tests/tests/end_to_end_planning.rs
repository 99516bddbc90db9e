use farm_agent::client::HttpContextHost;
use farm_common::{Coord, GameSession, UnitKind};
use farm_engine::{
    Aggregator, Collector, Dispatcher, ExecutionOutcome, Executor, FarmConfig, FarmCycle,
    FixedClock, GroupSelection, MarkupParser, PlanReport, Policy, TemplateSlot, TriggerResult,
};
use std::sync::Arc;
use workspace_tests::{command_page, farm_page, source_page, FakeGameServer, FarmTarget};

// 2026-10-16 10:00 UTC, 11:00 on the server
const NOW: i64 = 1_792_144_800;

fn troops(spear: u32, light: u32) -> Vec<u32> {
    // default world columns: spear sword axe spy light heavy ram catapult knight snob
    vec![spear, 0, 0, 0, light, 0, 0, 0, 0, 0]
}

fn game_server() -> FakeGameServer {
    FakeGameServer::new()
        .route(
            "mode=combined&group=0",
            source_page(&[
                (1, "Alpha (500|500) K55", troops(120, 20)),
                (2, "Beta (520|520) K55", troops(100, 0)),
            ]),
        )
        .route(
            "mode=commands",
            command_page(&[("Attack on Barbarian village (502|500) K55", "today at 11:36:00:250")]),
        )
        .route(
            "screen=am_farm",
            farm_page(
                (11, &[("spear", 50)]),
                (12, &[("light", 10)]),
                &[
                    FarmTarget { id: 70, coord: "502|500", dot: "green", loot_full: false, wall: "0" },
                    FarmTarget { id: 71, coord: "503|500", dot: "green", loot_full: true, wall: "1" },
                    FarmTarget { id: 72, coord: "500|504", dot: "yellow", loot_full: false, wall: "0" },
                    FarmTarget { id: 73, coord: "520|523", dot: "green", loot_full: false, wall: "?" },
                    FarmTarget { id: 74, coord: "505|500", dot: "green", loot_full: false, wall: "3" },
                ],
            ),
        )
        .reject_target(73)
}

fn session() -> GameSession {
    GameSession::new("https://w1.example", "c0ffee")
}

async fn plan_cycle(server: Arc<FakeGameServer>, policy: &Policy) -> (PlanReport, Dispatcher) {
    let config = FarmConfig::default();
    let clock = Arc::new(FixedClock(NOW));
    let dispatcher = Dispatcher::new(&config.dispatcher, server.clone())
        .with_context_host(Arc::new(HttpContextHost::new(server)));

    dispatcher
        .open_context(session().game_url(0, "screen=am_farm"))
        .await
        .unwrap();

    let aggregator = Aggregator::new(
        Collector::new(dispatcher.clone(), config.listings.max_pages),
        Arc::new(MarkupParser::new()),
        clock.clone(),
        session(),
        config.world.clone(),
        config.listings.clone(),
    );
    let report = FarmCycle::new(aggregator, clock).plan(policy).await.unwrap();
    (report, dispatcher)
}

#[tokio::test]
async fn test_full_cycle_plans_expected_assignments() {
    let server = Arc::new(game_server());
    let (report, dispatcher) = plan_cycle(server.clone(), &Policy::default()).await;

    assert_eq!(report.planned_at, NOW);
    assert!(report.aggregation.failed_groups.is_empty());
    assert!(report.aggregation.failed_listings.is_empty());
    assert_eq!(report.aggregation.targets_seen, 5);
    assert_eq!(report.aggregation.targets_filtered, 2);

    let plan = &report.plan;
    assert_eq!(plan.total, 2);
    assert_eq!(plan.by_source.len(), 2);

    // 502|500 already has a command landing exactly when Alpha's would
    let alpha = &plan.by_source[0];
    assert_eq!(alpha.source_id, 1);
    assert_eq!(alpha.assignments.len(), 1);
    let loot_run = &alpha.assignments[0];
    assert_eq!(loot_run.target_id, 71);
    assert_eq!(loot_run.template, TemplateSlot::B);
    assert_eq!(loot_run.template_id, 12);
    assert_eq!(loot_run.arrival, NOW + 3 * 600);
    assert_eq!(alpha.remaining.get(UnitKind::Light), 10);
    assert_eq!(alpha.remaining.get(UnitKind::Spear), 120);

    let beta = &plan.by_source[1];
    assert_eq!(beta.assignments[0].target_id, 73);
    assert_eq!(beta.assignments[0].target_coord, Coord::new(520, 523));
    // one command committed before this one adds a second of stagger
    assert_eq!(beta.assignments[0].arrival, NOW + 3 * 1080 + 1);
    assert_eq!(beta.remaining.get(UnitKind::Spear), 50);

    assert!(dispatcher.stats().peak_in_flight <= 5);
    assert_eq!(dispatcher.stats().failed, 0);

    // the report is what the agent prints
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["plan"]["total"], 2);
}

#[tokio::test]
async fn test_executor_sends_plan_and_surfaces_rejection() {
    let server = Arc::new(game_server());
    let (report, dispatcher) = plan_cycle(server.clone(), &Policy::default()).await;

    let config = FarmConfig::default();
    let mut executor = Executor::new(dispatcher, session(), &config.executor);
    executor.load(&report.plan);

    let mut outcomes = Vec::new();
    loop {
        match executor.trigger().await {
            TriggerResult::Executed(outcome) => outcomes.push(outcome),
            TriggerResult::Debounced => {
                tokio::time::sleep(std::time::Duration::from_millis(config.executor.debounce_ms)).await
            }
            TriggerResult::Idle => break,
        }
    }

    assert_eq!(
        outcomes,
        vec![
            ExecutionOutcome::Success,
            ExecutionOutcome::Failure("Target is under attack protection".to_string()),
        ]
    );
    assert_eq!(executor.done(), 1);
    assert_eq!(executor.pending(), 0);

    let commands = server.commands();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0], "target=71&template_id=12&source=1&h=c0ffee");
    assert!(commands[1].starts_with("target=73&template_id=11&source=2"));
}

#[tokio::test]
async fn test_unreachable_group_is_reported() {
    let server = Arc::new(game_server());
    let policy = Policy {
        groups: vec![
            GroupSelection { group_id: 0, return_within_minutes: None },
            GroupSelection { group_id: 42, return_within_minutes: Some(30) },
        ],
        ..Policy::default()
    };
    let (report, dispatcher) = plan_cycle(server.clone(), &policy).await;

    assert_eq!(report.aggregation.failed_groups.len(), 1);
    assert_eq!(report.aggregation.failed_groups[0].0, 42);
    assert_eq!(report.plan.total, 2);

    let group_requests = server
        .requests()
        .into_iter()
        .filter(|r| r.url.contains("group=42"))
        .count();
    assert_eq!(group_requests, 3);
    assert_eq!(dispatcher.stats().retried, 2);
}
