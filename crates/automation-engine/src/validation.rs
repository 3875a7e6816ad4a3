//! Registration-time validation of rule shapes

use crate::error::AutomationError;
use crate::model::{Action, ActionKind, Condition, Rule, Trigger};
use chrono::NaiveTime;

/// Parameter keys each action kind needs at execution time
pub fn required_parameters(kind: ActionKind) -> &'static [&'static str] {
    match kind {
        ActionKind::Email => &["to", "subject"],
        ActionKind::Notification => &["userId", "title", "message"],
        ActionKind::UpdateRecord => &["table", "where", "data"],
        ActionKind::CreateRecord => &["table", "data"],
        ActionKind::Calculate => &["operation"],
        ActionKind::GenerateReport => &["type"],
        ActionKind::AiAction => &["operation", "prompt"],
    }
}

/// Validate a complete rule before it enters the registry
pub fn validate_rule(rule: &Rule) -> Result<(), AutomationError> {
    validate_trigger(&rule.trigger)?;
    for condition in &rule.conditions {
        validate_condition(condition)?;
    }
    for action in &rule.actions {
        validate_action(action)?;
    }
    Ok(())
}

pub fn validate_trigger(trigger: &Trigger) -> Result<(), AutomationError> {
    match trigger {
        Trigger::Event { event_name } => {
            if event_name.trim().is_empty() {
                return Err(AutomationError::InvalidTrigger(
                    "event name must not be empty".to_string(),
                ));
            }
        }
        Trigger::Schedule {
            time,
            day_of_week,
            day_of_month,
            ..
        } => {
            parse_time(time)?;
            if let Some(day) = day_of_week {
                if *day > 6 {
                    return Err(AutomationError::InvalidTrigger(format!(
                        "dayOfWeek must be 0-6, got {day}"
                    )));
                }
            }
            if let Some(day) = day_of_month {
                if !(1..=31).contains(day) {
                    return Err(AutomationError::InvalidTrigger(format!(
                        "dayOfMonth must be 1-31, got {day}"
                    )));
                }
            }
        }
        Trigger::Condition { field, .. } => {
            if field.trim().is_empty() {
                return Err(AutomationError::InvalidTrigger(
                    "condition trigger field must not be empty".to_string(),
                ));
            }
        }
    }
    Ok(())
}

pub fn validate_condition(condition: &Condition) -> Result<(), AutomationError> {
    if condition.field.trim().is_empty() {
        return Err(AutomationError::InvalidCondition(format!(
            "field must not be empty (operator {})",
            condition.operator
        )));
    }
    Ok(())
}

pub fn validate_action(action: &Action) -> Result<(), AutomationError> {
    let missing: Vec<&str> = required_parameters(action.kind)
        .iter()
        .copied()
        .filter(|key| !action.parameters.contains_key(*key))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AutomationError::InvalidAction(format!(
            "{} action is missing parameters: {}",
            action.kind,
            missing.join(", ")
        )))
    }
}

/// Parse a time string in HH:MM format
pub fn parse_time(s: &str) -> Result<NaiveTime, AutomationError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|_| AutomationError::InvalidTimeFormat(s.to_string()))
}
