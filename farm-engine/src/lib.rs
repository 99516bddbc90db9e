//! Farm Engine - aggregation and planning core for farm commands
//!
//! Requests flow through a bounded [`Dispatcher`], listings are walked by the
//! [`Collector`], the [`Aggregator`] turns them into an immutable
//! [`PlanningSnapshot`], [`planner::plan`] schedules assignments against it and
//! the [`Executor`] sends them one trigger at a time.

pub mod aggregator;
pub mod clock;
pub mod collector;
pub mod config;
pub mod cycle;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod markup;
pub mod planner;
pub mod traits;
pub mod types;


pub use types::{
    AggregationReport, Assignment, AttackTemplate, CommandTimeline, HttpRequest, HttpResponse,
    Method, Plan, PlanReport, PlanningSnapshot, SourcePlan, SourceVillage, Target, TemplateSet,
    TemplateSlot, ThreatLevel,
};

pub use traits::{ContextHost, PageParser, ProgressSink, RemoteClock, Transport};

pub use error::{ErrorCategory, FarmError, FarmResult};

pub use config::{FarmConfig, GroupSelection, LoggingConfig, Policy, WorldConfig};

pub use aggregator::Aggregator;
pub use clock::{ArrivalParser, FixedClock, ServerClock};
pub use collector::{Collector, ListingEndpoint};
pub use cycle::FarmCycle;
pub use dispatcher::{Completion, DispatchStats, Dispatcher, Operation, Pending};
pub use executor::{ExecutionOutcome, Executor, TriggerResult};
pub use markup::MarkupParser;
