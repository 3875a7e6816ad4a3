//! Side-effect collaborators invoked by actions.
//!
//! Each action kind hands off to one of these traits. The engine ships a
//! [`LoggingHandler`] that only records what would happen; hosts inject real
//! integrations through [`ActionHandlers`] without touching the dispatcher.

use crate::error::AutomationError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Email hand-off produced by an `email` action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    pub variables: Map<String, Value>,
}

/// In-app notification produced by a `notification` action
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
}

/// Record mutation produced by an `update_record` action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordUpdate {
    pub table: String,
    pub operation: String,
    #[serde(rename = "where")]
    pub filter: Map<String, Value>,
    pub data: Map<String, Value>,
}

/// Record insertion produced by a `create_record` action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordCreate {
    pub table: String,
    pub data: Map<String, Value>,
}

/// Calculation request produced by a `calculate` action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationRequest {
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<Value>,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), AutomationError>;
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), AutomationError>;
}

/// Opaque persistence collaborator
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn update(&self, update: RecordUpdate) -> Result<(), AutomationError>;
    async fn create(&self, create: RecordCreate) -> Result<(), AutomationError>;
}

#[async_trait]
pub trait Calculator: Send + Sync {
    async fn compute(
        &self,
        request: CalculationRequest,
        context: &Value,
    ) -> Result<Value, AutomationError>;
}

#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(
        &self,
        parameters: &Map<String, Value>,
        context: &Value,
    ) -> Result<(), AutomationError>;
}

/// Optional AI text-generation collaborator
#[async_trait]
pub trait AiAssistant: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String, AutomationError>;
}

/// Default collaborator: logs what would happen and succeeds
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

#[async_trait]
impl EmailSender for LoggingHandler {
    async fn send(&self, message: EmailMessage) -> Result<(), AutomationError> {
        tracing::info!(
            target: "automation",
            to = %message.to,
            subject = %message.subject,
            template = ?message.template,
            "Would send email"
        );
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for LoggingHandler {
    async fn send(&self, notification: Notification) -> Result<(), AutomationError> {
        tracing::info!(
            target: "automation",
            user_id = %notification.user_id,
            kind = %notification.kind,
            title = %notification.title,
            "Would send notification"
        );
        Ok(())
    }
}

#[async_trait]
impl RecordStore for LoggingHandler {
    async fn update(&self, update: RecordUpdate) -> Result<(), AutomationError> {
        let filter = Value::Object(update.filter);
        tracing::info!(
            target: "automation",
            table = %update.table,
            operation = %update.operation,
            filter = %filter,
            "Would update record"
        );
        Ok(())
    }

    async fn create(&self, create: RecordCreate) -> Result<(), AutomationError> {
        let data = Value::Object(create.data);
        tracing::info!(
            target: "automation",
            table = %create.table,
            data = %data,
            "Would create record"
        );
        Ok(())
    }
}

#[async_trait]
impl Calculator for LoggingHandler {
    async fn compute(
        &self,
        request: CalculationRequest,
        _context: &Value,
    ) -> Result<Value, AutomationError> {
        tracing::info!(
            target: "automation",
            operation = %request.operation,
            field = ?request.field,
            "Would run calculation"
        );
        Ok(Value::Null)
    }
}

#[async_trait]
impl ReportGenerator for LoggingHandler {
    async fn generate(
        &self,
        parameters: &Map<String, Value>,
        _context: &Value,
    ) -> Result<(), AutomationError> {
        tracing::info!(
            target: "automation",
            report = ?parameters.get("type"),
            "Would generate report"
        );
        Ok(())
    }
}

/// The set of collaborators an executor dispatches to
#[derive(Clone)]
pub struct ActionHandlers {
    pub email: Arc<dyn EmailSender>,
    pub notifications: Arc<dyn NotificationSender>,
    pub records: Arc<dyn RecordStore>,
    pub calculator: Arc<dyn Calculator>,
    pub reports: Arc<dyn ReportGenerator>,
    pub ai: Option<Arc<dyn AiAssistant>>,
}

impl Default for ActionHandlers {
    fn default() -> Self {
        let logger = Arc::new(LoggingHandler);
        Self {
            email: logger.clone(),
            notifications: logger.clone(),
            records: logger.clone(),
            calculator: logger.clone(),
            reports: logger,
            ai: None,
        }
    }
}

impl ActionHandlers {
    pub fn with_email(mut self, email: Arc<dyn EmailSender>) -> Self {
        self.email = email;
        self
    }

    pub fn with_notifications(mut self, notifications: Arc<dyn NotificationSender>) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn with_records(mut self, records: Arc<dyn RecordStore>) -> Self {
        self.records = records;
        self
    }

    pub fn with_calculator(mut self, calculator: Arc<dyn Calculator>) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn with_reports(mut self, reports: Arc<dyn ReportGenerator>) -> Self {
        self.reports = reports;
        self
    }

    pub fn with_ai(mut self, ai: Arc<dyn AiAssistant>) -> Self {
        self.ai = Some(ai);
        self
    }
}
