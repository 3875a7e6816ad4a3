//! Data models for the automation engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Prefix for generated rule ids
pub const RULE_ID_PREFIX: &str = "rule_";

/// Ad-hoc data bag supplied at trigger time
pub type Context = Value;

/// Open parameter mapping carried by an action
pub type Parameters = Map<String, Value>;

/// A complete automation rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Unique identifier, immutable after creation
    pub id: String,
    /// Human-readable name
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// What makes the rule eligible for evaluation
    pub trigger: Trigger,
    /// Conditions folded left-to-right; empty means "always applies"
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Actions executed sequentially when conditions pass
    pub actions: Vec<Action>,
    /// Inactive rules stay registered but are invisible to dispatch
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub execution_count: u64,
}

/// Trigger types that make a rule eligible for evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Fired by `trigger_event` with a matching name
    Event {
        #[serde(rename = "eventName")]
        event_name: String,
    },
    /// Fired by `process_scheduled_rules` when the scheduler gate opens
    Schedule {
        frequency: Frequency,
        /// Time in HH:MM format (24-hour). Stored, not enforced by the gate.
        time: String,
        /// 0=Sunday ... 6=Saturday
        #[serde(default, rename = "dayOfWeek", skip_serializing_if = "Option::is_none")]
        day_of_week: Option<u8>,
        #[serde(default, rename = "dayOfMonth", skip_serializing_if = "Option::is_none")]
        day_of_month: Option<u8>,
    },
    /// Reserved; no entry point dispatches condition triggers
    Condition {
        field: String,
        operator: Operator,
        #[serde(default)]
        value: Value,
    },
}

/// How often a schedule trigger may fire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    /// Unrecognised frequency; never runs
    Other(String),
}

impl Frequency {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for Frequency {
    fn from(s: String) -> Self {
        match s.as_str() {
            "daily" => Self::Daily,
            "weekly" => Self::Weekly,
            "monthly" => Self::Monthly,
            _ => Self::Other(s),
        }
    }
}

impl From<Frequency> for String {
    fn from(f: Frequency) -> Self {
        match f {
            Frequency::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operators for conditions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    IsEmpty,
    IsNotEmpty,
    /// Unrecognised operator; always evaluates to false
    Other(String),
}

impl Operator {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::Contains => "contains",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for Operator {
    fn from(s: String) -> Self {
        match s.as_str() {
            "equals" => Self::Equals,
            "not_equals" => Self::NotEquals,
            "greater_than" => Self::GreaterThan,
            "less_than" => Self::LessThan,
            "contains" => Self::Contains,
            "is_empty" => Self::IsEmpty,
            "is_not_empty" => Self::IsNotEmpty,
            _ => Self::Other(s),
        }
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        match op {
            Operator::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combinator applied when folding in the *next* condition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

/// A single boolean test against a context field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Dotted path into the context
    pub field: String,
    pub operator: Operator,
    /// Literal or template string
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_operator: Option<LogicalOperator>,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            logical_operator: None,
        }
    }

    /// Combine the following condition with AND
    pub fn and_next(mut self) -> Self {
        self.logical_operator = Some(LogicalOperator::And);
        self
    }

    /// Combine the following condition with OR
    pub fn or_next(mut self) -> Self {
        self.logical_operator = Some(LogicalOperator::Or);
        self
    }
}

/// Kinds of side-effecting actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Email,
    Notification,
    UpdateRecord,
    CreateRecord,
    Calculate,
    GenerateReport,
    AiAction,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Notification => "notification",
            Self::UpdateRecord => "update_record",
            Self::CreateRecord => "create_record",
            Self::Calculate => "calculate",
            Self::GenerateReport => "generate_report",
            Self::AiAction => "ai_action",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed side-effecting operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    /// May contain nested mappings and template placeholders at any depth
    #[serde(default)]
    pub parameters: Parameters,
}

impl Action {
    /// Build an action from a JSON object; non-object values yield empty parameters
    pub fn new(kind: ActionKind, parameters: Value) -> Self {
        let parameters = match parameters {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { kind, parameters }
    }
}

/// Request to register a new rule
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRuleRequest {
    /// Assigned automatically when absent
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger: Trigger,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl CreateRuleRequest {
    pub fn new(name: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            trigger,
            conditions: Vec::new(),
            actions: Vec::new(),
            is_active: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Partial update for a rule; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRuleRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub trigger: Option<Trigger>,
    #[serde(default)]
    pub conditions: Option<Vec<Condition>>,
    #[serde(default)]
    pub actions: Option<Vec<Action>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl Rule {
    /// Create a new rule from a create request
    pub fn from_request(request: CreateRuleRequest) -> Self {
        let id = request
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generate_rule_id);
        Self {
            id,
            name: request.name,
            description: request.description,
            trigger: request.trigger,
            conditions: request.conditions,
            actions: request.actions,
            is_active: request.is_active,
            created_at: Utc::now(),
            last_executed: None,
            execution_count: 0,
        }
    }

    /// Shallow-merge an update into a copy of this rule
    pub fn with_update(&self, update: UpdateRuleRequest) -> Self {
        let mut rule = self.clone();
        if let Some(name) = update.name {
            rule.name = name;
        }
        if let Some(description) = update.description {
            rule.description = description;
        }
        if let Some(trigger) = update.trigger {
            rule.trigger = trigger;
        }
        if let Some(conditions) = update.conditions {
            rule.conditions = conditions;
        }
        if let Some(actions) = update.actions {
            rule.actions = actions;
        }
        if let Some(is_active) = update.is_active {
            rule.is_active = is_active;
        }
        rule
    }

    /// Whether an event with this name makes the rule eligible
    pub fn listens_for(&self, event_name: &str) -> bool {
        matches!(&self.trigger, Trigger::Event { event_name: name } if name == event_name)
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self.trigger, Trigger::Schedule { .. })
    }
}

/// Generate a fresh rule id (prefix + random suffix)
pub fn generate_rule_id() -> String {
    format!("{RULE_ID_PREFIX}{}", uuid::Uuid::new_v4().simple())
}
