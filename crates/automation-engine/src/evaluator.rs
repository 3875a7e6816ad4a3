//! Condition evaluator for rules

use crate::coerce::{is_truthy, stringify, strict_equals, to_number};
use crate::model::{Condition, LogicalOperator, Operator};
use crate::template::{get_field_value, interpolate};
use serde_json::Value;

/// Evaluate an ordered list of conditions against a context.
///
/// Left fold starting from `true` with AND. Each condition's own
/// `logical_operator` is the combinator used for the *next* condition, so the
/// operator trails its operand.
pub fn evaluate_conditions(conditions: &[Condition], context: &Value) -> bool {
    let mut result = true;
    let mut operator = LogicalOperator::And;

    for condition in conditions {
        let condition_result = evaluate_condition(condition, context);
        result = match operator {
            LogicalOperator::And => result && condition_result,
            LogicalOperator::Or => result || condition_result,
        };
        operator = condition.logical_operator.unwrap_or_default();
    }

    result
}

/// Evaluate a single condition
pub fn evaluate_condition(condition: &Condition, context: &Value) -> bool {
    let field_value = get_field_value(&condition.field, context);
    let condition_value = interpolate(&condition.value, context);

    match &condition.operator {
        Operator::Equals => strict_equals(field_value, Some(&condition_value)),
        Operator::NotEquals => !strict_equals(field_value, Some(&condition_value)),
        // NaN on either side makes both comparisons false
        Operator::GreaterThan => to_number(field_value) > to_number(Some(&condition_value)),
        Operator::LessThan => to_number(field_value) < to_number(Some(&condition_value)),
        Operator::Contains => {
            stringify(field_value).contains(&stringify(Some(&condition_value)))
        }
        Operator::IsEmpty => !is_truthy(field_value),
        Operator::IsNotEmpty => is_truthy(field_value),
        Operator::Other(name) => {
            tracing::debug!("Unknown condition operator '{}', failing closed", name);
            false
        }
    }
}
