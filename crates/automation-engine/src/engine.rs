//! Core automation engine: rule registry and dispatcher

use crate::defaults::default_rules;
use crate::error::AutomationError;
use crate::evaluator::evaluate_conditions;
use crate::executor::ActionExecutor;
use crate::handlers::ActionHandlers;
use crate::model::{CreateRuleRequest, Rule, UpdateRuleRequest};
use crate::persistence;
use crate::scheduler::should_run;
use crate::validation::validate_rule;
use chrono::{DateTime, Local, SecondsFormat, TimeZone, Utc};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, Mutex, RwLock};

/// Events emitted by the automation engine
#[derive(Debug, Clone)]
pub enum AutomationEvent {
    /// A rule was selected for dispatch
    Triggered {
        rule_id: String,
        trigger_reason: String,
    },
    /// A rule's conditions did not hold
    Skipped { rule_id: String },
    /// A rule ran all of its actions
    Executed {
        rule_id: String,
        execution_count: u64,
    },
    /// A rule action failed
    Failed { rule_id: String, error: String },
    /// A rule was registered
    Created { rule_id: String },
    /// A rule was updated
    Updated { rule_id: String },
    /// A rule was removed
    Removed { rule_id: String },
}

/// Engine construction options
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// JSON file the registry is persisted to; `None` keeps rules in memory
    pub data_path: Option<PathBuf>,
    /// Install the default rule set when there is no stored registry.
    ///
    /// A persisted registry that is empty (every rule removed) stays empty.
    pub install_default_rules: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            install_default_rules: true,
        }
    }
}

impl EngineConfig {
    /// Empty in-memory registry
    pub fn in_memory() -> Self {
        Self {
            data_path: None,
            install_default_rules: false,
        }
    }

    /// Registry persisted to `<data_dir>/rules.json`
    pub fn persistent(data_dir: &Path) -> Self {
        Self {
            data_path: Some(data_dir.join("rules.json")),
            install_default_rules: true,
        }
    }

    pub fn with_default_rules(mut self, install: bool) -> Self {
        self.install_default_rules = install;
        self
    }
}

/// The main automation engine
pub struct AutomationEngine {
    /// Registered rules, in registration order
    rules: RwLock<Vec<Rule>>,
    /// Action executor
    executor: ActionExecutor,
    /// Event broadcaster
    event_tx: broadcast::Sender<AutomationEvent>,
    /// Path for persistence
    data_path: Option<PathBuf>,
    /// Serialises writes to `data_path`
    save_lock: Mutex<()>,
}

impl AutomationEngine {
    /// Create a new automation engine
    pub async fn new(
        config: EngineConfig,
        handlers: ActionHandlers,
    ) -> Result<Self, AutomationError> {
        let (event_tx, _) = broadcast::channel(64);

        let engine = Self {
            rules: RwLock::new(Vec::new()),
            executor: ActionExecutor::new(handlers),
            event_tx,
            data_path: config.data_path,
            save_lock: Mutex::new(()),
        };

        engine.load(config.install_default_rules).await?;

        Ok(engine)
    }

    /// Load rules from disk, falling back to the default rule set
    async fn load(&self, install_defaults: bool) -> Result<(), AutomationError> {
        let stored = match &self.data_path {
            Some(path) => persistence::load_rules(path).await,
            None => None,
        };

        let _guard = self.save_lock.lock().await;
        let mut rules = self.rules.write().await;
        match stored {
            Some(stored) => {
                *rules = stored
                    .into_iter()
                    .filter(|rule| match validate_rule(rule) {
                        Ok(()) => true,
                        Err(e) => {
                            tracing::warn!("Skipping invalid stored rule {}: {}", rule.id, e);
                            false
                        }
                    })
                    .collect();
            }
            None if install_defaults => {
                let defaults = default_rules();
                tracing::info!("Installing {} default rules", defaults.len());
                self.commit(&mut rules, defaults).await?;
            }
            None => {}
        }
        Ok(())
    }

    /// Write `next` to disk, then make it the registry.
    ///
    /// Callers hold `save_lock` and the registry write guard. On a failed
    /// write the registry is left as it was.
    async fn commit(
        &self,
        rules: &mut Vec<Rule>,
        next: Vec<Rule>,
    ) -> Result<(), AutomationError> {
        if let Some(path) = &self.data_path {
            persistence::save_rules(path, &next).await?;
        }
        *rules = next;
        Ok(())
    }

    /// Save rules to disk
    async fn save(&self) -> Result<(), AutomationError> {
        let Some(path) = &self.data_path else {
            return Ok(());
        };
        let _guard = self.save_lock.lock().await;
        let rules = self.rules.read().await.clone();
        persistence::save_rules(path, &rules).await?;
        Ok(())
    }

    /// Subscribe to automation events
    pub fn subscribe(&self) -> broadcast::Receiver<AutomationEvent> {
        self.event_tx.subscribe()
    }

    /// The executor, for subscribing to per-action events
    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    /// Register a rule; returns its id
    pub async fn add_rule(&self, request: CreateRuleRequest) -> Result<String, AutomationError> {
        let rule = Rule::from_request(request);
        validate_rule(&rule)?;

        {
            let _guard = self.save_lock.lock().await;
            let mut rules = self.rules.write().await;
            if rules.iter().any(|r| r.id == rule.id) {
                return Err(AutomationError::DuplicateRule(rule.id));
            }
            let mut next = rules.clone();
            next.push(rule.clone());
            self.commit(&mut rules, next).await?;
        }

        let _ = self.event_tx.send(AutomationEvent::Created {
            rule_id: rule.id.clone(),
        });

        tracing::info!("Added rule: {} ({})", rule.name, rule.id);
        Ok(rule.id)
    }

    /// Remove a rule; `Ok(false)` if no rule has this id
    pub async fn remove_rule(&self, id: &str) -> Result<bool, AutomationError> {
        let rule = {
            let _guard = self.save_lock.lock().await;
            let mut rules = self.rules.write().await;
            let Some(index) = rules.iter().position(|r| r.id == id) else {
                return Ok(false);
            };
            let mut next = rules.clone();
            let rule = next.remove(index);
            self.commit(&mut rules, next).await?;
            rule
        };

        let _ = self.event_tx.send(AutomationEvent::Removed {
            rule_id: id.to_string(),
        });

        tracing::info!("Removed rule: {} ({})", rule.name, id);
        Ok(true)
    }

    /// Merge an update into a rule; `Ok(false)` if no rule has this id
    pub async fn update_rule(
        &self,
        id: &str,
        update: UpdateRuleRequest,
    ) -> Result<bool, AutomationError> {
        {
            let _guard = self.save_lock.lock().await;
            let mut rules = self.rules.write().await;
            let Some(index) = rules.iter().position(|r| r.id == id) else {
                return Ok(false);
            };
            let updated = rules[index].with_update(update);
            validate_rule(&updated)?;
            let mut next = rules.clone();
            next[index] = updated;
            self.commit(&mut rules, next).await?;
        }

        let _ = self.event_tx.send(AutomationEvent::Updated {
            rule_id: id.to_string(),
        });

        tracing::info!("Updated rule: {}", id);
        Ok(true)
    }

    /// Snapshot of all rules
    pub async fn get_rules(&self) -> Vec<Rule> {
        self.rules.read().await.clone()
    }

    /// Snapshot of the rules visible to dispatch
    pub async fn get_active_rules(&self) -> Vec<Rule> {
        self.rules
            .read()
            .await
            .iter()
            .filter(|r| r.is_active)
            .cloned()
            .collect()
    }

    /// Get rule by ID
    pub async fn get_rule(&self, id: &str) -> Option<Rule> {
        self.rules.read().await.iter().find(|r| r.id == id).cloned()
    }

    /// Execute a rule against a context.
    ///
    /// Returns `false` when the rule is missing or inactive, when its conditions
    /// do not hold, or when an action fails. Only a full run updates
    /// `execution_count` and `last_executed`.
    pub async fn execute_rule(&self, id: &str, context: &Value) -> bool {
        self.execute_rule_at(id, context, Utc::now(), "manual").await
    }

    async fn execute_rule_at(
        &self,
        id: &str,
        context: &Value,
        executed_at: DateTime<Utc>,
        trigger_reason: &str,
    ) -> bool {
        let Some(rule) = self.get_rule(id).await.filter(|r| r.is_active) else {
            tracing::debug!("Rule {} not found or inactive", id);
            return false;
        };

        let _ = self.event_tx.send(AutomationEvent::Triggered {
            rule_id: rule.id.clone(),
            trigger_reason: trigger_reason.to_string(),
        });

        if !evaluate_conditions(&rule.conditions, context) {
            tracing::debug!("Rule '{}' conditions not met, skipping", rule.name);
            let _ = self.event_tx.send(AutomationEvent::Skipped {
                rule_id: rule.id.clone(),
            });
            return false;
        }

        tracing::info!(
            "Executing rule '{}' (trigger: {})",
            rule.name,
            trigger_reason
        );

        if let Err(e) = self
            .executor
            .execute_actions(&rule.id, &rule.actions, context)
            .await
        {
            tracing::error!("Failed to execute rule '{}': {}", rule.name, e);
            let _ = self.event_tx.send(AutomationEvent::Failed {
                rule_id: rule.id.clone(),
                error: e.to_string(),
            });
            return false;
        }

        let execution_count = self.record_execution(&rule.id, executed_at).await;
        let _ = self.event_tx.send(AutomationEvent::Executed {
            rule_id: rule.id.clone(),
            execution_count,
        });
        true
    }

    /// Bump execution bookkeeping; returns the new count
    async fn record_execution(&self, id: &str, executed_at: DateTime<Utc>) -> u64 {
        let execution_count = {
            let mut rules = self.rules.write().await;
            let Some(rule) = rules.iter_mut().find(|r| r.id == id) else {
                tracing::debug!("Rule {} was removed while executing", id);
                return 0;
            };
            rule.execution_count += 1;
            rule.last_executed = Some(executed_at);
            rule.execution_count
        };

        if let Err(e) = self.save().await {
            tracing::warn!("Failed to persist execution of rule {}: {}", id, e);
        }
        execution_count
    }

    /// Run every active rule listening for `event_name`, in registry order.
    ///
    /// Returns the ids of the rules that executed successfully.
    pub async fn trigger_event(&self, event_name: &str, context: &Value) -> Vec<String> {
        let matching: Vec<String> = self
            .rules
            .read()
            .await
            .iter()
            .filter(|r| r.is_active && r.listens_for(event_name))
            .map(|r| r.id.clone())
            .collect();

        tracing::debug!("Event '{}' matched {} rules", event_name, matching.len());

        let reason = format!("event:{event_name}");
        let mut executed = Vec::new();
        for id in matching {
            if self
                .execute_rule_at(&id, context, Utc::now(), &reason)
                .await
            {
                executed.push(id);
            }
        }
        executed
    }

    /// Run every due schedule-triggered rule against the local clock
    pub async fn process_scheduled_rules(&self) -> Vec<String> {
        self.process_scheduled_rules_at(Local::now()).await
    }

    /// Run every due schedule-triggered rule as of `now`.
    ///
    /// Each rule receives `{ "now": <ISO-8601> }` as context and is stamped with
    /// `now` as its `last_executed` time.
    pub async fn process_scheduled_rules_at<Tz: TimeZone>(&self, now: DateTime<Tz>) -> Vec<String> {
        let due: Vec<String> = self
            .rules
            .read()
            .await
            .iter()
            .filter(|r| r.is_active && r.is_scheduled() && should_run(r, &now))
            .map(|r| r.id.clone())
            .collect();

        let executed_at = now.with_timezone(&Utc);
        let context = json!({ "now": executed_at.to_rfc3339_opts(SecondsFormat::Millis, true) });

        let mut executed = Vec::new();
        for id in due {
            if self
                .execute_rule_at(&id, &context, executed_at, "schedule")
                .await
            {
                executed.push(id);
            }
        }
        executed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, ActionKind, Condition, Frequency, Operator, Trigger};
    use crate::testing::{FailingHandler, RecordingHandler};
    use std::sync::Arc;

    fn event(name: &str) -> Trigger {
        Trigger::Event {
            event_name: name.to_string(),
        }
    }

    fn email_action() -> Action {
        Action::new(
            ActionKind::Email,
            json!({ "to": "{{student.email}}", "subject": "Welcome" }),
        )
    }

    fn record_action(table: &str) -> Action {
        Action::new(
            ActionKind::CreateRecord,
            json!({ "table": table, "data": { "studentId": "{{student.id}}" } }),
        )
    }

    async fn engine_with(handlers: ActionHandlers) -> AutomationEngine {
        AutomationEngine::new(EngineConfig::in_memory(), handlers)
            .await
            .unwrap()
    }

    async fn recording_engine() -> (AutomationEngine, Arc<RecordingHandler>) {
        let recorder = Arc::new(RecordingHandler::default());
        let handlers = ActionHandlers::default()
            .with_email(recorder.clone())
            .with_notifications(recorder.clone())
            .with_records(recorder.clone())
            .with_calculator(recorder.clone())
            .with_reports(recorder.clone());
        (engine_with(handlers).await, recorder)
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_event_dispatch_sends_interpolated_email() {
        let (engine, recorder) = recording_engine().await;
        let id = engine
            .add_rule(
                CreateRuleRequest::new("Welcome", event("student_enrolled"))
                    .with_actions(vec![email_action()]),
            )
            .await
            .unwrap();

        let executed = engine
            .trigger_event(
                "student_enrolled",
                &json!({ "student": { "email": "a@x.com" } }),
            )
            .await;

        assert_eq!(executed, vec![id.clone()]);
        let emails = recorder.emails();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].to, "a@x.com");

        let rule = engine.get_rule(&id).await.unwrap();
        assert_eq!(rule.execution_count, 1);
        assert!(rule.last_executed.is_some());
    }

    #[tokio::test]
    async fn test_failing_condition_runs_no_actions() {
        let (engine, recorder) = recording_engine().await;
        let id = engine
            .add_rule(
                CreateRuleRequest::new("Honors", event("assignment_graded"))
                    .with_conditions(vec![Condition::new(
                        "grade.percentage",
                        Operator::GreaterThan,
                        70,
                    )])
                    .with_actions(vec![email_action()]),
            )
            .await
            .unwrap();

        let ran = engine
            .execute_rule(&id, &json!({ "grade": { "percentage": 65 } }))
            .await;

        assert!(!ran);
        assert!(recorder.emails().is_empty());
        let rule = engine.get_rule(&id).await.unwrap();
        assert_eq!(rule.execution_count, 0);
        assert!(rule.last_executed.is_none());
    }

    #[tokio::test]
    async fn test_and_chain_rejects_rule() {
        let (engine, recorder) = recording_engine().await;
        let id = engine
            .add_rule(
                CreateRuleRequest::new("Chain", event("x"))
                    .with_conditions(vec![
                        Condition::new("a", Operator::Equals, 1).and_next(),
                        Condition::new("b", Operator::Equals, 2),
                    ])
                    .with_actions(vec![record_action("t")]),
            )
            .await
            .unwrap();

        assert!(!engine.execute_rule(&id, &json!({ "a": 1, "b": 3 })).await);
        assert!(engine.execute_rule(&id, &json!({ "a": 1, "b": 2 })).await);
        assert_eq!(recorder.creates().len(), 1);
    }

    #[tokio::test]
    async fn test_inactive_rules_are_invisible() {
        let (engine, recorder) = recording_engine().await;
        let id = engine
            .add_rule(
                CreateRuleRequest::new("Disabled", event("student_enrolled"))
                    .with_actions(vec![email_action()])
                    .inactive(),
            )
            .await
            .unwrap();
        let scheduled = engine
            .add_rule(
                CreateRuleRequest::new(
                    "Disabled job",
                    Trigger::Schedule {
                        frequency: Frequency::Daily,
                        time: "09:00".to_string(),
                        day_of_week: None,
                        day_of_month: None,
                    },
                )
                .with_actions(vec![record_action("t")])
                .inactive(),
            )
            .await
            .unwrap();

        assert_eq!(engine.get_rules().await.len(), 2);
        assert!(engine.get_active_rules().await.is_empty());

        let ctx = json!({ "student": { "email": "a@x.com" } });
        assert!(engine.trigger_event("student_enrolled", &ctx).await.is_empty());
        assert!(!engine.execute_rule(&id, &ctx).await);
        assert!(engine
            .process_scheduled_rules_at(at("2024-03-10T09:00:00Z"))
            .await
            .is_empty());
        assert!(recorder.emails().is_empty());
        assert!(engine.get_rule(&scheduled).await.unwrap().last_executed.is_none());
    }

    #[tokio::test]
    async fn test_failed_action_leaves_bookkeeping_untouched() {
        let recorder = Arc::new(RecordingHandler::default());
        let handlers = ActionHandlers::default()
            .with_records(recorder.clone())
            .with_email(Arc::new(FailingHandler));
        let engine = engine_with(handlers).await;
        let mut events = engine.subscribe();

        let id = engine
            .add_rule(
                CreateRuleRequest::new("Certificate", event("course_completed"))
                    .with_actions(vec![record_action("certificates"), email_action()]),
            )
            .await
            .unwrap();

        let ran = engine
            .execute_rule(&id, &json!({ "student": { "id": "s1", "email": "a@x.com" } }))
            .await;

        assert!(!ran);
        let rule = engine.get_rule(&id).await.unwrap();
        assert_eq!(rule.execution_count, 0);
        assert!(rule.last_executed.is_none());
        // No rollback of the record written before the failure
        assert_eq!(recorder.creates().len(), 1);

        let mut failed = false;
        while let Ok(event) = events.try_recv() {
            if let AutomationEvent::Failed { rule_id, error } = event {
                assert_eq!(rule_id, id);
                assert!(error.contains("smtp unavailable"));
                failed = true;
            }
        }
        assert!(failed);
    }

    #[tokio::test]
    async fn test_failing_rule_does_not_abort_batch() {
        let recorder = Arc::new(RecordingHandler::default());
        let handlers = ActionHandlers::default()
            .with_records(recorder.clone())
            .with_email(Arc::new(FailingHandler));
        let engine = engine_with(handlers).await;

        let first = engine
            .add_rule(
                CreateRuleRequest::new("First", event("course_completed"))
                    .with_actions(vec![record_action("first")]),
            )
            .await
            .unwrap();
        engine
            .add_rule(
                CreateRuleRequest::new("Broken", event("course_completed"))
                    .with_actions(vec![email_action()]),
            )
            .await
            .unwrap();
        let third = engine
            .add_rule(
                CreateRuleRequest::new("Third", event("course_completed"))
                    .with_actions(vec![record_action("third")]),
            )
            .await
            .unwrap();

        let executed = engine
            .trigger_event("course_completed", &json!({ "student": { "id": "s1" } }))
            .await;

        assert_eq!(executed, vec![first, third]);
        let tables: Vec<String> = recorder.creates().into_iter().map(|c| c.table).collect();
        assert_eq!(tables, vec!["first".to_string(), "third".to_string()]);
    }

    #[tokio::test]
    async fn test_event_only_matches_named_rules() {
        let (engine, recorder) = recording_engine().await;
        engine
            .add_rule(
                CreateRuleRequest::new("Graded", event("assignment_graded"))
                    .with_actions(vec![record_action("grades")]),
            )
            .await
            .unwrap();

        assert!(engine.trigger_event("student_enrolled", &json!({})).await.is_empty());
        assert!(recorder.creates().is_empty());
    }

    #[tokio::test]
    async fn test_daily_schedule_runs_once_per_day() {
        let (engine, recorder) = recording_engine().await;
        let id = engine
            .add_rule(
                CreateRuleRequest::new(
                    "Reminder",
                    Trigger::Schedule {
                        frequency: Frequency::Daily,
                        time: "09:00".to_string(),
                        day_of_week: None,
                        day_of_month: None,
                    },
                )
                .with_actions(vec![Action::new(
                    ActionKind::CreateRecord,
                    json!({ "table": "reminders", "data": { "sentAt": "{{now}}" } }),
                )]),
            )
            .await
            .unwrap();

        let first = engine
            .process_scheduled_rules_at(at("2024-03-10T08:00:00Z"))
            .await;
        assert_eq!(first, vec![id.clone()]);
        assert_eq!(
            engine.get_rule(&id).await.unwrap().last_executed,
            Some(at("2024-03-10T08:00:00Z"))
        );

        let second = engine
            .process_scheduled_rules_at(at("2024-03-10T20:00:00Z"))
            .await;
        assert!(second.is_empty());

        let next_day = engine
            .process_scheduled_rules_at(at("2024-03-11T00:01:00Z"))
            .await;
        assert_eq!(next_day, vec![id.clone()]);

        let creates = recorder.creates();
        assert_eq!(creates.len(), 2);
        assert_eq!(creates[0].data["sentAt"], json!("2024-03-10T08:00:00.000Z"));
        assert_eq!(engine.get_rule(&id).await.unwrap().execution_count, 2);
    }

    #[tokio::test]
    async fn test_registry_mutations() {
        let (engine, _) = recording_engine().await;
        let id = engine
            .add_rule(
                CreateRuleRequest::new("Original", event("x"))
                    .with_actions(vec![record_action("t")]),
            )
            .await
            .unwrap();

        let updated = engine
            .update_rule(
                &id,
                UpdateRuleRequest {
                    name: Some("Renamed".to_string()),
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated);
        let rule = engine.get_rule(&id).await.unwrap();
        assert_eq!(rule.name, "Renamed");
        assert!(!rule.is_active);

        assert!(!engine
            .update_rule("missing", UpdateRuleRequest::default())
            .await
            .unwrap());

        assert!(engine.remove_rule(&id).await.unwrap());
        assert!(!engine.remove_rule(&id).await.unwrap());
        assert!(engine.get_rules().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_update_is_rejected_atomically() {
        let (engine, _) = recording_engine().await;
        let id = engine
            .add_rule(
                CreateRuleRequest::new("Original", event("x"))
                    .with_actions(vec![record_action("t")]),
            )
            .await
            .unwrap();

        let result = engine
            .update_rule(
                &id,
                UpdateRuleRequest {
                    name: Some("Broken".to_string()),
                    actions: Some(vec![Action::new(ActionKind::Email, json!({}))]),
                    ..Default::default()
                },
            )
            .await;

        assert!(matches!(result, Err(AutomationError::InvalidAction(_))));
        assert_eq!(engine.get_rule(&id).await.unwrap().name, "Original");
    }

    #[tokio::test]
    async fn test_add_rule_rejects_duplicates_and_invalid_shapes() {
        let (engine, _) = recording_engine().await;
        let request = CreateRuleRequest::new("Fixed", event("x"))
            .with_id("fixed")
            .with_actions(vec![record_action("t")]);

        assert_eq!(engine.add_rule(request.clone()).await.unwrap(), "fixed");
        assert!(matches!(
            engine.add_rule(request).await,
            Err(AutomationError::DuplicateRule(_))
        ));

        let invalid = CreateRuleRequest::new(
            "Bad time",
            Trigger::Schedule {
                frequency: Frequency::Daily,
                time: "9 o'clock".to_string(),
                day_of_week: None,
                day_of_month: None,
            },
        );
        assert!(matches!(
            engine.add_rule(invalid).await,
            Err(AutomationError::InvalidTimeFormat(_))
        ));
        assert_eq!(engine.get_rules().await.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshots_are_copies() {
        let (engine, _) = recording_engine().await;
        let id = engine
            .add_rule(
                CreateRuleRequest::new("Original", event("x"))
                    .with_actions(vec![record_action("t")]),
            )
            .await
            .unwrap();

        let mut snapshot = engine.get_rules().await;
        snapshot[0].name = "Mutated".to_string();
        snapshot[0].is_active = false;

        let rule = engine.get_rule(&id).await.unwrap();
        assert_eq!(rule.name, "Original");
        assert!(rule.is_active);
    }

    #[tokio::test]
    async fn test_unknown_rule_is_not_executed() {
        let (engine, _) = recording_engine().await;
        assert!(!engine.execute_rule("nope", &json!({})).await);
    }

    #[tokio::test]
    async fn test_default_engine_installs_default_rules() {
        let (engine, recorder) = {
            let recorder = Arc::new(RecordingHandler::default());
            let handlers = ActionHandlers::default()
                .with_email(recorder.clone())
                .with_notifications(recorder.clone())
                .with_records(recorder.clone());
            let engine = AutomationEngine::new(EngineConfig::default(), handlers)
                .await
                .unwrap();
            (engine, recorder)
        };
        assert_eq!(engine.get_rules().await.len(), 8);

        let executed = engine
            .trigger_event(
                "student_enrolled",
                &json!({
                    "student": { "id": "s1", "email": "a@x.com", "name": "Ada" },
                    "course": { "title": "Rust 101", "startDate": "2024-09-01" }
                }),
            )
            .await;

        assert_eq!(
            executed,
            vec![
                "enrollment_confirmation".to_string(),
                "calendar_sync".to_string()
            ]
        );
        assert_eq!(recorder.emails()[0].subject, "Enrollment Confirmed: Rust 101");
        assert_eq!(recorder.notifications()[0].user_id, "s1");
        assert_eq!(recorder.creates()[0].table, "calendar_events");
    }

    #[tokio::test]
    async fn test_persistent_engine_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::persistent(dir.path()).with_default_rules(false);

        let id = {
            let engine = AutomationEngine::new(config.clone(), ActionHandlers::default())
                .await
                .unwrap();
            let id = engine
                .add_rule(
                    CreateRuleRequest::new("Persisted", event("x"))
                        .with_actions(vec![record_action("t")]),
                )
                .await
                .unwrap();
            assert!(engine.execute_rule(&id, &json!({})).await);
            id
        };

        let reloaded = AutomationEngine::new(config, ActionHandlers::default())
            .await
            .unwrap();
        let rule = reloaded.get_rule(&id).await.unwrap();
        assert_eq!(rule.execution_count, 1);
        assert!(rule.last_executed.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_store_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let engine = AutomationEngine::new(
            EngineConfig::persistent(dir.path()),
            ActionHandlers::default(),
        )
        .await
        .unwrap();

        assert_eq!(engine.get_rules().await.len(), default_rules().len());
        assert!(persistence::quarantine_path(&path).exists());
        assert_eq!(persistence::load_rules(&path).await, Some(engine.get_rules().await));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_registry_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::persistent(dir.path()).with_default_rules(false);
        let engine = AutomationEngine::new(config, ActionHandlers::default())
            .await
            .unwrap();
        engine
            .add_rule(
                CreateRuleRequest::new("Kept", event("x"))
                    .with_id("kept")
                    .with_actions(vec![record_action("t")]),
            )
            .await
            .unwrap();

        // A directory where the temp file goes makes every write fail
        let blocker = dir.path().join("rules.json.tmp");
        tokio::fs::create_dir(&blocker).await.unwrap();

        let added = engine
            .add_rule(
                CreateRuleRequest::new("Blocked", event("x"))
                    .with_id("blocked")
                    .with_actions(vec![record_action("t")]),
            )
            .await;
        assert!(matches!(added, Err(AutomationError::Io(_))));
        assert!(engine.get_rule("blocked").await.is_none());
        assert_eq!(engine.trigger_event("x", &json!({})).await, vec!["kept"]);

        let removed = engine.remove_rule("kept").await;
        assert!(matches!(removed, Err(AutomationError::Io(_))));
        assert!(engine.get_rule("kept").await.is_some());

        let updated = engine
            .update_rule(
                "kept",
                UpdateRuleRequest {
                    name: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(updated, Err(AutomationError::Io(_))));
        assert_eq!(engine.get_rule("kept").await.unwrap().name, "Kept");

        tokio::fs::remove_dir(&blocker).await.unwrap();
        let retried = engine
            .add_rule(
                CreateRuleRequest::new("Blocked", event("x"))
                    .with_id("blocked")
                    .with_actions(vec![record_action("t")]),
            )
            .await
            .unwrap();
        assert_eq!(retried, "blocked");
    }

    #[tokio::test]
    async fn test_emptied_registry_stays_empty_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::persistent(dir.path());

        {
            let engine = AutomationEngine::new(config.clone(), ActionHandlers::default())
                .await
                .unwrap();
            for rule in engine.get_rules().await {
                assert!(engine.remove_rule(&rule.id).await.unwrap());
            }
        }

        let reloaded = AutomationEngine::new(config, ActionHandlers::default())
            .await
            .unwrap();
        assert!(reloaded.get_rules().await.is_empty());
    }

    #[tokio::test]
    async fn test_lifecycle_events() {
        let (engine, _) = recording_engine().await;
        let mut events = engine.subscribe();

        let id = engine
            .add_rule(
                CreateRuleRequest::new("Evented", event("x"))
                    .with_conditions(vec![Condition::new("go", Operator::Equals, true)])
                    .with_actions(vec![record_action("t")]),
            )
            .await
            .unwrap();
        engine.execute_rule(&id, &json!({ "go": false })).await;
        engine.execute_rule(&id, &json!({ "go": true })).await;

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.push(match event {
                AutomationEvent::Created { .. } => "created",
                AutomationEvent::Triggered { .. } => "triggered",
                AutomationEvent::Skipped { .. } => "skipped",
                AutomationEvent::Executed {
                    execution_count, ..
                } => {
                    assert_eq!(execution_count, 1);
                    "executed"
                }
                _ => "other",
            });
        }
        assert_eq!(
            names,
            vec!["created", "triggered", "skipped", "triggered", "executed"]
        );
    }
}
