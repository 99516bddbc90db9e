//! One planning cycle: aggregate, then plan

use crate::aggregator::Aggregator;
use crate::config::Policy;
use crate::planner;
use crate::types::PlanReport;
use crate::{FarmResult, RemoteClock};
use std::sync::Arc;
use tracing::{error, info};

pub struct FarmCycle {
    aggregator: Aggregator,
    clock: Arc<dyn RemoteClock + Send + Sync>,
}

impl FarmCycle {
    pub fn new(aggregator: Aggregator, clock: Arc<dyn RemoteClock + Send + Sync>) -> Self {
        Self { aggregator, clock }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Build a fresh snapshot and plan against it.
    ///
    /// A failure is logged here once and returned; it ends only this cycle.
    pub async fn plan(&self, policy: &Policy) -> FarmResult<PlanReport> {
        let (snapshot, aggregation) = match self.aggregator.snapshot(policy).await {
            Ok(built) => built,
            Err(err) => {
                error!(error = %err, category = ?err.category(), "planning cycle aborted");
                return Err(err);
            }
        };

        let planned_at = self.clock.now();
        let plan = planner::plan(&snapshot, policy, planned_at);
        info!(
            assignments = plan.total,
            sources = plan.by_source.len(),
            "planning cycle complete"
        );

        Ok(PlanReport {
            planned_at,
            plan,
            aggregation,
        })
    }
}
