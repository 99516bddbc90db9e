//! Sends planned farm commands one at a time on external trigger

use crate::config::ExecutorConfig;
use crate::dispatcher::Dispatcher;
use crate::types::{Assignment, HttpRequest, Plan};
use crate::ProgressSink;
use farm_common::GameSession;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use url::form_urlencoded;

/// Result of sending one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    Success,
    Failure(String),
}

/// What a trigger did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerResult {
    Executed(ExecutionOutcome),
    /// Too close to the previous trigger, nothing sent
    Debounced,
    /// No assignment left
    Idle,
}

pub struct Executor {
    dispatcher: Dispatcher,
    session: GameSession,
    debounce: Duration,
    queue: VecDeque<Assignment>,
    last_trigger: Option<Instant>,
    done: usize,
    total: usize,
    progress: Option<Arc<dyn ProgressSink + Send + Sync>>,
}

impl Executor {
    pub fn new(dispatcher: Dispatcher, session: GameSession, config: &ExecutorConfig) -> Self {
        Self {
            dispatcher,
            session,
            debounce: Duration::from_millis(config.debounce_ms),
            queue: VecDeque::new(),
            last_trigger: None,
            done: 0,
            total: 0,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink + Send + Sync>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Queue every assignment of `plan` in planning order
    pub fn load(&mut self, plan: &Plan) {
        self.queue.extend(plan.assignments().cloned());
        self.total += plan.total;
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn done(&self) -> usize {
        self.done
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Send the command at the head of the queue.
    ///
    /// Triggers within the debounce window of the previous one are ignored.
    /// The assignment leaves the queue whatever the outcome.
    pub async fn trigger(&mut self) -> TriggerResult {
        let now = Instant::now();
        if let Some(last) = self.last_trigger {
            if now.duration_since(last) < self.debounce {
                return TriggerResult::Debounced;
            }
        }
        self.last_trigger = Some(now);

        let assignment = match self.queue.pop_front() {
            Some(assignment) => assignment,
            None => return TriggerResult::Idle,
        };

        let outcome = self.execute(&assignment).await;
        match &outcome {
            ExecutionOutcome::Success => {
                self.done += 1;
                info!(
                    source = %assignment.source_coord,
                    coord = %assignment.target_coord,
                    done = self.done,
                    total = self.total,
                    "farm command sent"
                );
                if let Some(sink) = &self.progress {
                    sink.report(self.done, self.total);
                }
            }
            ExecutionOutcome::Failure(reason) => {
                warn!(
                    source = %assignment.source_coord,
                    coord = %assignment.target_coord,
                    %reason,
                    "farm command failed"
                );
            }
        }
        TriggerResult::Executed(outcome)
    }

    /// Farm-assistant request for an assignment
    pub fn command_request(&self, assignment: &Assignment) -> HttpRequest {
        let url = self.session.game_url(
            assignment.source_id,
            "screen=am_farm&mode=farm&ajaxaction=farm&json",
        );
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("target", &assignment.target_id.to_string())
            .append_pair("template_id", &assignment.template_id.to_string())
            .append_pair("source", &assignment.source_id.to_string())
            .append_pair("h", &self.session.csrf_token)
            .finish();

        let mut request = HttpRequest::post_form(url, body);
        request
            .headers
            .insert("X-Requested-With".to_string(), "XMLHttpRequest".to_string());
        request
            .headers
            .insert("TribalWars-Ajax".to_string(), "1".to_string());
        request
    }

    /// Send one command and read the verdict from the JSON reply
    pub async fn execute(&self, assignment: &Assignment) -> ExecutionOutcome {
        let response = match self.dispatcher.fetch_once(self.command_request(assignment)).await {
            Ok(response) => response,
            Err(error) => return ExecutionOutcome::Failure(error.to_string()),
        };

        match serde_json::from_str::<serde_json::Value>(&response.body) {
            Ok(reply) => match reply.get("error") {
                None | Some(serde_json::Value::Null) => ExecutionOutcome::Success,
                Some(error) => ExecutionOutcome::Failure(error_text(error)),
            },
            Err(_) => ExecutionOutcome::Failure("reply is not JSON, session may have expired".to_string()),
        }
    }
}

fn error_text(error: &serde_json::Value) -> String {
    match error {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(error_text)
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatcherConfig;
    use crate::types::{HttpResponse, SourcePlan, TemplateSlot};
    use crate::{FarmResult, Transport};
    use async_trait::async_trait;
    use farm_common::{Coord, TroopVector};
    use std::sync::Mutex;

    /// Rejects commands against target 13, accepts everything else
    struct FarmEndpoint {
        bodies: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for FarmEndpoint {
        async fn send(&self, request: &HttpRequest) -> FarmResult<HttpResponse> {
            let body = request.body.clone().unwrap_or_default();
            self.bodies.lock().unwrap().push(body.clone());
            if body.contains("target=13&") {
                Ok(HttpResponse::ok(r#"{"error":["Not enough units"]}"#))
            } else {
                Ok(HttpResponse::ok(r#"{"response":{"success":"Attack sent"}}"#))
            }
        }
    }

    struct Counter(Mutex<Vec<(usize, usize)>>);

    impl ProgressSink for Counter {
        fn report(&self, done: usize, total: usize) {
            self.0.lock().unwrap().push((done, total));
        }
    }

    fn assignment(target_id: u64) -> Assignment {
        Assignment {
            source_id: 4411,
            source_coord: Coord::new(500, 500),
            target_id,
            target_coord: Coord::new(500, 505),
            template_id: 9001,
            template: TemplateSlot::A,
            distance: 5.0,
            arrival: 1000,
            returns_at: 2000,
        }
    }

    fn plan(targets: &[u64]) -> Plan {
        Plan {
            by_source: vec![SourcePlan {
                source_id: 4411,
                source_coord: Coord::new(500, 500),
                assignments: targets.iter().map(|&t| assignment(t)).collect(),
                remaining: TroopVector::new(),
            }],
            total: targets.len(),
        }
    }

    fn executor(debounce_ms: u64) -> (Executor, Arc<FarmEndpoint>) {
        let transport = Arc::new(FarmEndpoint {
            bodies: Mutex::new(Vec::new()),
        });
        let dispatcher = Dispatcher::new(&DispatcherConfig::default(), transport.clone());
        let config = ExecutorConfig {
            debounce_ms,
            trigger_interval_ms: 0,
        };
        let executor = Executor::new(dispatcher, GameSession::new("https://w1.example", "c0ffee"), &config);
        (executor, transport)
    }

    #[test]
    fn test_command_request_shape() {
        let (executor, _) = executor(0);
        let request = executor.command_request(&assignment(77));
        assert_eq!(
            request.url,
            "https://w1.example/game.php?village=4411&screen=am_farm&mode=farm&ajaxaction=farm&json"
        );
        assert_eq!(
            request.body.as_deref(),
            Some("target=77&template_id=9001&source=4411&h=c0ffee")
        );
    }

    #[tokio::test]
    async fn test_execute_reads_error_member() {
        let (executor, _) = executor(0);
        assert_eq!(executor.execute(&assignment(12)).await, ExecutionOutcome::Success);
        assert_eq!(
            executor.execute(&assignment(13)).await,
            ExecutionOutcome::Failure("Not enough units".to_string())
        );
    }

    #[tokio::test]
    async fn test_trigger_consumes_queue_and_reports_progress() {
        let (executor, transport) = executor(0);
        let counter = Arc::new(Counter(Mutex::new(Vec::new())));
        let mut executor = executor.with_progress(counter.clone());
        executor.load(&plan(&[12, 13, 14]));

        assert_eq!(executor.trigger().await, TriggerResult::Executed(ExecutionOutcome::Success));
        assert!(matches!(
            executor.trigger().await,
            TriggerResult::Executed(ExecutionOutcome::Failure(_))
        ));
        assert_eq!(executor.trigger().await, TriggerResult::Executed(ExecutionOutcome::Success));
        assert_eq!(executor.trigger().await, TriggerResult::Idle);

        assert_eq!(executor.pending(), 0);
        assert_eq!(executor.done(), 2);
        assert_eq!(*counter.0.lock().unwrap(), vec![(1, 3), (2, 3)]);
        // failures are not retried
        assert_eq!(transport.bodies.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_dropped_connection_is_not_resent() {
        /// Drops the connection twice before it would accept the command
        struct Flaky {
            posts: Mutex<u32>,
        }

        #[async_trait]
        impl Transport for Flaky {
            async fn send(&self, _request: &HttpRequest) -> FarmResult<HttpResponse> {
                let posts = {
                    let mut posts = self.posts.lock().unwrap();
                    *posts += 1;
                    *posts
                };
                if posts <= 2 {
                    Err(crate::FarmError::network("connection reset"))
                } else {
                    Ok(HttpResponse::ok(r#"{"response":{}}"#))
                }
            }
        }

        let transport = Arc::new(Flaky { posts: Mutex::new(0) });
        let dispatcher = Dispatcher::new(&DispatcherConfig::default(), transport.clone());
        let mut executor = Executor::new(
            dispatcher.clone(),
            GameSession::new("https://w1.example", "c0ffee"),
            &ExecutorConfig::default(),
        );
        executor.load(&plan(&[12]));

        let outcome = executor.trigger().await;
        assert!(matches!(
            outcome,
            TriggerResult::Executed(ExecutionOutcome::Failure(ref reason)) if reason.contains("connection reset")
        ));
        assert_eq!(*transport.posts.lock().unwrap(), 1);
        assert_eq!(executor.pending(), 0);
        assert_eq!(executor.done(), 0);
        assert_eq!(dispatcher.stats().retried, 0);
    }

    #[tokio::test]
    async fn test_trigger_is_debounced() {
        let (mut executor, transport) = executor(100);
        executor.load(&plan(&[12, 14]));

        assert!(matches!(executor.trigger().await, TriggerResult::Executed(_)));
        assert_eq!(executor.trigger().await, TriggerResult::Debounced);
        assert_eq!(executor.pending(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(matches!(executor.trigger().await, TriggerResult::Executed(_)));
        assert_eq!(transport.bodies.lock().unwrap().len(), 2);
    }
}
