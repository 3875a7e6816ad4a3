//! Action executor for rules

use crate::error::AutomationError;
use crate::handlers::{
    ActionHandlers, CalculationRequest, EmailMessage, Notification, RecordCreate, RecordUpdate,
};
use crate::model::{Action, ActionKind, Parameters};
use crate::template::{interpolate, interpolate_object};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

/// Events emitted during action execution
#[derive(Debug, Clone)]
pub enum ExecutorEvent {
    /// Action started executing
    ActionStarted {
        rule_id: String,
        action_index: usize,
        kind: ActionKind,
    },
    /// Action completed successfully
    ActionCompleted {
        rule_id: String,
        action_index: usize,
    },
    /// Action failed
    ActionFailed {
        rule_id: String,
        action_index: usize,
        error: String,
    },
}

/// Executor for rule actions
pub struct ActionExecutor {
    handlers: ActionHandlers,
    event_tx: broadcast::Sender<ExecutorEvent>,
}

impl ActionExecutor {
    /// Create a new action executor
    pub fn new(handlers: ActionHandlers) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self { handlers, event_tx }
    }

    /// Subscribe to executor events
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutorEvent> {
        self.event_tx.subscribe()
    }

    /// Execute a rule's actions in order, stopping at the first failure.
    ///
    /// Side effects of actions that already completed are not rolled back.
    pub async fn execute_actions(
        &self,
        rule_id: &str,
        actions: &[Action],
        context: &Value,
    ) -> Result<(), AutomationError> {
        for (index, action) in actions.iter().enumerate() {
            let _ = self.event_tx.send(ExecutorEvent::ActionStarted {
                rule_id: rule_id.to_string(),
                action_index: index,
                kind: action.kind,
            });

            match self.execute_action(action, context).await {
                Ok(()) => {
                    let _ = self.event_tx.send(ExecutorEvent::ActionCompleted {
                        rule_id: rule_id.to_string(),
                        action_index: index,
                    });
                }
                Err(e) => {
                    let _ = self.event_tx.send(ExecutorEvent::ActionFailed {
                        rule_id: rule_id.to_string(),
                        action_index: index,
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Execute a single action
    pub async fn execute_action(
        &self,
        action: &Action,
        context: &Value,
    ) -> Result<(), AutomationError> {
        let params = &action.parameters;
        match action.kind {
            ActionKind::Email => self.execute_email(params, context).await,
            ActionKind::Notification => self.execute_notification(params, context).await,
            ActionKind::UpdateRecord => self.execute_update_record(params, context).await,
            ActionKind::CreateRecord => self.execute_create_record(params, context).await,
            ActionKind::Calculate => self.execute_calculate(params, context).await,
            ActionKind::GenerateReport => self.handlers.reports.generate(params, context).await,
            ActionKind::AiAction => self.execute_ai_action(params, context).await,
        }
    }

    async fn execute_email(
        &self,
        params: &Parameters,
        context: &Value,
    ) -> Result<(), AutomationError> {
        let message = EmailMessage {
            to: templated_text(params, "to", context)?,
            subject: templated_text(params, "subject", context)?,
            template: literal_text(params, "template"),
            variables: templated_object(params, "variables", context)?,
        };
        self.handlers.email.send(message).await
    }

    async fn execute_notification(
        &self,
        params: &Parameters,
        context: &Value,
    ) -> Result<(), AutomationError> {
        let notification = Notification {
            user_id: templated_text(params, "userId", context)?,
            kind: literal_text(params, "type").unwrap_or_else(|| "info".to_string()),
            title: templated_text(params, "title", context)?,
            message: templated_text(params, "message", context)?,
        };
        self.handlers.notifications.send(notification).await
    }

    async fn execute_update_record(
        &self,
        params: &Parameters,
        context: &Value,
    ) -> Result<(), AutomationError> {
        let update = RecordUpdate {
            table: required_literal(params, "table")?,
            operation: literal_text(params, "operation").unwrap_or_else(|| "update".to_string()),
            filter: templated_object(params, "where", context)?,
            data: templated_object(params, "data", context)?,
        };
        self.handlers.records.update(update).await
    }

    async fn execute_create_record(
        &self,
        params: &Parameters,
        context: &Value,
    ) -> Result<(), AutomationError> {
        let create = RecordCreate {
            table: required_literal(params, "table")?,
            data: templated_object(params, "data", context)?,
        };
        self.handlers.records.create(create).await
    }

    async fn execute_calculate(
        &self,
        params: &Parameters,
        context: &Value,
    ) -> Result<(), AutomationError> {
        let request = CalculationRequest {
            operation: required_literal(params, "operation")?,
            field: literal_text(params, "field"),
            weights: params.get("weights").cloned(),
        };
        let operation = request.operation.clone();
        let result = self.handlers.calculator.compute(request, context).await?;
        tracing::debug!("Calculation '{}' returned {}", operation, result);
        Ok(())
    }

    async fn execute_ai_action(
        &self,
        params: &Parameters,
        context: &Value,
    ) -> Result<(), AutomationError> {
        let Some(ai) = &self.handlers.ai else {
            tracing::warn!("AI collaborator not configured, skipping ai_action");
            return Ok(());
        };

        let operation = required_literal(params, "operation")?;
        let prompt = templated_text(params, "prompt", context)?;
        let output = ai.generate_text(&prompt).await?;
        tracing::info!(
            target: "automation",
            "AI operation '{}' produced {} characters",
            operation,
            output.chars().count()
        );
        Ok(())
    }
}

fn missing(key: &str) -> AutomationError {
    AutomationError::InvalidAction(format!("missing parameter '{key}'"))
}

/// Structural parameter used as-is
fn literal_text(params: &Parameters, key: &str) -> Option<String> {
    params.get(key).map(|value| match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn required_literal(params: &Parameters, key: &str) -> Result<String, AutomationError> {
    literal_text(params, key).ok_or_else(|| missing(key))
}

/// Interpolated scalar parameter rendered as text
fn templated_text(params: &Parameters, key: &str, context: &Value) -> Result<String, AutomationError> {
    let value = params.get(key).ok_or_else(|| missing(key))?;
    Ok(match interpolate(value, context) {
        Value::String(s) => s,
        other => crate::coerce::stringify(Some(&other)),
    })
}

/// Interpolated mapping parameter; absent means empty
fn templated_object(
    params: &Parameters,
    key: &str,
    context: &Value,
) -> Result<Map<String, Value>, AutomationError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(interpolate_object(map, context)),
        Some(other) => Err(AutomationError::InvalidAction(format!(
            "parameter '{key}' must be an object, got {other}"
        ))),
    }
}
