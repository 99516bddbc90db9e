//! Greedy farm planner
//!
//! Sources are visited in priority order and each one sends to its nearest
//! eligible targets until it runs out of troops. The snapshot is never
//! touched: troop pools and the timeline are private copies.

use crate::config::Policy;
use crate::types::{Assignment, Plan, PlanningSnapshot, SourcePlan, SourceVillage, Target, TemplateSlot};
use tracing::debug;

/// Sort key that puts sources without a pending return last
fn priority_key(source: &SourceVillage) -> i64 {
    match source.earliest_available {
        0 => i64::MAX,
        at => at,
    }
}

/// Template to send against `target` under `policy`
pub fn template_slot(target: &Target, policy: &Policy) -> TemplateSlot {
    if policy.send_larger_on_loot_full && target.loot_full {
        TemplateSlot::B
    } else {
        TemplateSlot::A
    }
}

/// Build a plan from `snapshot` as of server time `now`.
///
/// Deterministic: the same snapshot, policy and `now` always produce the same
/// assignments in the same order.
pub fn plan(snapshot: &PlanningSnapshot, policy: &Policy, now: i64) -> Plan {
    let mut timeline = snapshot.timeline.clone();
    let mut sources: Vec<&SourceVillage> = snapshot.sources.iter().collect();
    sources.sort_by_key(|source| priority_key(source));

    let mut committed = 0usize;
    let mut by_source = Vec::new();

    for source in sources {
        let mut troops = source.troops;
        let mut reachable: Vec<(f64, &Target)> = snapshot
            .targets
            .iter()
            .map(|target| (source.coord.distance(&target.coord), target))
            .filter(|(distance, _)| *distance < policy.max_distance)
            .collect();
        reachable.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut assignments = Vec::new();
        for (distance, target) in reachable {
            let slot = template_slot(target, policy);
            let template = snapshot.templates.get(slot);

            // shortfall ends this source's turn
            let remaining = match troops.checked_sub(&template.troops) {
                Some(remaining) => remaining,
                None => break,
            };

            let travel = template.travel_seconds(distance);
            // one second per command already committed in this pass
            let stagger = committed as i64;
            let arrival = now + travel + stagger;
            let returns_at = arrival + travel;

            if !timeline.has_room(&target.coord, arrival, policy.min_spacing_seconds) {
                continue;
            }
            if matches!(source.return_deadline, Some(deadline) if returns_at > deadline) {
                continue;
            }

            assignments.push(Assignment {
                source_id: source.id,
                source_coord: source.coord,
                target_id: target.id,
                target_coord: target.coord,
                template_id: template.id,
                template: slot,
                distance,
                arrival,
                returns_at,
            });
            troops = remaining;
            timeline.append(target.coord, arrival);
            committed += 1;
        }

        if !assignments.is_empty() {
            debug!(source = %source.coord, planned = assignments.len(), "source planned");
            by_source.push(SourcePlan {
                source_id: source.id,
                source_coord: source.coord,
                assignments,
                remaining: troops,
            });
        }
    }

    Plan {
        by_source,
        total: committed,
    }
}
