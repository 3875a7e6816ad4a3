//! Collaborator doubles for unit tests

use crate::error::AutomationError;
use crate::handlers::{
    AiAssistant, CalculationRequest, Calculator, EmailMessage, EmailSender, Notification,
    NotificationSender, RecordCreate, RecordStore, RecordUpdate, ReportGenerator,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Mutex;

/// Records every hand-off in call order
#[derive(Default)]
pub struct RecordingHandler {
    emails: Mutex<Vec<EmailMessage>>,
    notifications: Mutex<Vec<Notification>>,
    updates: Mutex<Vec<RecordUpdate>>,
    creates: Mutex<Vec<RecordCreate>>,
    calculations: Mutex<Vec<CalculationRequest>>,
    reports: Mutex<Vec<(Map<String, Value>, Value)>>,
}

impl RecordingHandler {
    pub fn emails(&self) -> Vec<EmailMessage> {
        self.emails.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<RecordUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn creates(&self) -> Vec<RecordCreate> {
        self.creates.lock().unwrap().clone()
    }

    pub fn calculations(&self) -> Vec<CalculationRequest> {
        self.calculations.lock().unwrap().clone()
    }

    /// Report parameters paired with the context they were generated for
    pub fn reports(&self) -> Vec<(Map<String, Value>, Value)> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for RecordingHandler {
    async fn send(&self, message: EmailMessage) -> Result<(), AutomationError> {
        self.emails.lock().unwrap().push(message);
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for RecordingHandler {
    async fn send(&self, notification: Notification) -> Result<(), AutomationError> {
        self.notifications.lock().unwrap().push(notification);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for RecordingHandler {
    async fn update(&self, update: RecordUpdate) -> Result<(), AutomationError> {
        self.updates.lock().unwrap().push(update);
        Ok(())
    }

    async fn create(&self, create: RecordCreate) -> Result<(), AutomationError> {
        self.creates.lock().unwrap().push(create);
        Ok(())
    }
}

#[async_trait]
impl Calculator for RecordingHandler {
    async fn compute(
        &self,
        request: CalculationRequest,
        _context: &Value,
    ) -> Result<Value, AutomationError> {
        self.calculations.lock().unwrap().push(request);
        Ok(Value::from(88.5))
    }
}

#[async_trait]
impl ReportGenerator for RecordingHandler {
    async fn generate(
        &self,
        parameters: &Map<String, Value>,
        context: &Value,
    ) -> Result<(), AutomationError> {
        self.reports
            .lock()
            .unwrap()
            .push((parameters.clone(), context.clone()));
        Ok(())
    }
}

/// Fails every hand-off
pub struct FailingHandler;

#[async_trait]
impl EmailSender for FailingHandler {
    async fn send(&self, _message: EmailMessage) -> Result<(), AutomationError> {
        Err(AutomationError::HandlerFailed("smtp unavailable".to_string()))
    }
}

#[async_trait]
impl NotificationSender for FailingHandler {
    async fn send(&self, _notification: Notification) -> Result<(), AutomationError> {
        Err(AutomationError::HandlerFailed("push gateway down".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingAi {
    prompts: Mutex<Vec<String>>,
}

impl RecordingAi {
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AiAssistant for RecordingAi {
    async fn generate_text(&self, prompt: &str) -> Result<String, AutomationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("Congratulations!".to_string())
    }
}
