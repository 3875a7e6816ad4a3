//! Built-in institutional workflow rules
//!
//! Template tokens such as `{{date_add(now, 1, "days")}}` are not evaluated by
//! the interpolator and reach collaborators verbatim.

use crate::model::{
    Action, ActionKind, Condition, CreateRuleRequest, Frequency, Operator, Rule, Trigger,
};
use serde_json::{json, Value};

/// Event names emitted by the host application
pub mod events {
    pub const STUDENT_ENROLLED: &str = "student_enrolled";
    pub const ASSIGNMENT_GRADED: &str = "assignment_graded";
    pub const COURSE_COMPLETED: &str = "course_completed";
    pub const FINANCIAL_AID_APPROVED: &str = "financial_aid_approved";
}

fn on_event(name: &str) -> Trigger {
    Trigger::Event {
        event_name: name.to_string(),
    }
}

fn daily_at(time: &str) -> Trigger {
    Trigger::Schedule {
        frequency: Frequency::Daily,
        time: time.to_string(),
        day_of_week: None,
        day_of_month: None,
    }
}

/// The default rule set registered at engine construction
pub fn default_rules() -> Vec<Rule> {
    vec![
        enrollment_confirmation(),
        grade_calculation(),
        transcript_generation(),
        assignment_deadline_reminder(),
        certificate_issuance(),
        financial_aid_application(),
        overdue_library_notice(),
        calendar_sync(),
    ]
    .into_iter()
    .map(Rule::from_request)
    .collect()
}

fn enrollment_confirmation() -> CreateRuleRequest {
    CreateRuleRequest::new("Enrollment Confirmation", on_event(events::STUDENT_ENROLLED))
        .with_id("enrollment_confirmation")
        .with_description("Confirm a new enrollment by email and in-app notification")
        .with_conditions(vec![Condition::new(
            "student.email",
            Operator::Contains,
            "@",
        )])
        .with_actions(vec![
            Action::new(
                ActionKind::Email,
                json!({
                    "to": "{{student.email}}",
                    "subject": "Enrollment Confirmed: {{course.title}}",
                    "template": "enrollment_confirmation",
                    "variables": {
                        "studentName": "{{student.name}}",
                        "courseTitle": "{{course.title}}",
                        "startDate": "{{course.startDate}}",
                        "instructor": "{{course.instructor}}"
                    }
                }),
            ),
            Action::new(
                ActionKind::Notification,
                json!({
                    "userId": "{{student.id}}",
                    "type": "success",
                    "title": "Enrollment Confirmed",
                    "message": "You are now enrolled in {{course.title}}"
                }),
            ),
        ])
}

fn grade_calculation() -> CreateRuleRequest {
    CreateRuleRequest::new("Automatic Grade Calculation", on_event(events::ASSIGNMENT_GRADED))
        .with_id("grade_calculation")
        .with_description("Recompute the course grade whenever an assignment is graded")
        .with_conditions(vec![Condition::new(
            "submission.status",
            Operator::Equals,
            "graded",
        )])
        .with_actions(vec![
            Action::new(
                ActionKind::Calculate,
                json!({
                    "operation": "weighted_average",
                    "field": "final_grade",
                    "weights": { "assignments": 0.4, "quizzes": 0.2, "exams": 0.4 }
                }),
            ),
            Action::new(
                ActionKind::UpdateRecord,
                json!({
                    "table": "enrollments",
                    "operation": "update",
                    "where": {
                        "studentId": "{{student.id}}",
                        "courseId": "{{course.id}}"
                    },
                    "data": {
                        "currentGrade": "{{grade.percentage}}",
                        "lastGradedAt": "{{now}}"
                    }
                }),
            ),
        ])
}

fn transcript_generation() -> CreateRuleRequest {
    CreateRuleRequest::new("Transcript Generation", on_event(events::COURSE_COMPLETED))
        .with_id("transcript_generation")
        .with_description("Issue an updated transcript once a final grade exists and no balance is held")
        .with_conditions(vec![
            Condition::new("enrollment.finalGrade", Operator::IsNotEmpty, Value::Null).and_next(),
            Condition::new("student.outstandingBalance", Operator::LessThan, 1),
        ])
        .with_actions(vec![
            Action::new(
                ActionKind::GenerateReport,
                json!({
                    "type": "transcript",
                    "studentId": "{{student.id}}",
                    "format": "pdf"
                }),
            ),
            Action::new(
                ActionKind::Email,
                json!({
                    "to": "{{student.email}}",
                    "subject": "Your updated transcript is ready",
                    "template": "transcript_ready",
                    "variables": { "courseTitle": "{{course.title}}" }
                }),
            ),
        ])
}

fn assignment_deadline_reminder() -> CreateRuleRequest {
    CreateRuleRequest::new("Assignment Deadline Reminder", daily_at("09:00"))
        .with_id("assignment_deadline_reminder")
        .with_description("Daily reminder about assignments due within a day")
        .with_actions(vec![Action::new(
            ActionKind::Notification,
            json!({
                "userId": "all_students",
                "type": "reminder",
                "title": "Assignments due soon",
                "message": "Assignments due before {{date_add(now, 1, \"days\")}} need your attention"
            }),
        )])
}

fn certificate_issuance() -> CreateRuleRequest {
    CreateRuleRequest::new("Certificate Issuance", on_event(events::COURSE_COMPLETED))
        .with_id("certificate_issuance")
        .with_description("Issue a certificate for passing grades in certificate-enabled courses")
        .with_conditions(vec![
            Condition::new("enrollment.finalGrade", Operator::GreaterThan, 70).and_next(),
            Condition::new("course.certificateEnabled", Operator::Equals, true),
        ])
        .with_actions(vec![
            Action::new(
                ActionKind::CreateRecord,
                json!({
                    "table": "certificates",
                    "data": {
                        "studentId": "{{student.id}}",
                        "courseId": "{{course.id}}",
                        "grade": "{{enrollment.finalGrade}}",
                        "issuedAt": "{{now}}"
                    }
                }),
            ),
            Action::new(
                ActionKind::Email,
                json!({
                    "to": "{{student.email}}",
                    "subject": "Certificate of Completion: {{course.title}}",
                    "template": "certificate_issued",
                    "variables": {
                        "studentName": "{{student.name}}",
                        "courseTitle": "{{course.title}}"
                    }
                }),
            ),
        ])
}

fn financial_aid_application() -> CreateRuleRequest {
    CreateRuleRequest::new(
        "Financial Aid Application",
        on_event(events::FINANCIAL_AID_APPROVED),
    )
    .with_id("financial_aid_application")
    .with_description("Record approved aid and draft a personalised award letter")
    .with_conditions(vec![
        Condition::new("application.status", Operator::NotEquals, "rejected").and_next(),
        Condition::new("application.holds", Operator::IsEmpty, Value::Null),
    ])
    .with_actions(vec![
        Action::new(
            ActionKind::UpdateRecord,
            json!({
                "table": "financial_aid_applications",
                "operation": "update",
                "where": { "id": "{{application.id}}" },
                "data": {
                    "status": "approved",
                    "awardAmount": "{{application.amount}}",
                    "remainingBalance": "{{subtract(student.tuition, application.amount)}}"
                }
            }),
        ),
        Action::new(
            ActionKind::AiAction,
            json!({
                "operation": "award_letter",
                "prompt": "Write a short award letter for {{student.name}} confirming financial aid of {{application.amount}}"
            }),
        ),
    ])
}

fn overdue_library_notice() -> CreateRuleRequest {
    CreateRuleRequest::new("Overdue Library Notice", daily_at("08:00"))
        .with_id("overdue_library_notice")
        .with_description("Daily overdue items report for library staff")
        .with_actions(vec![
            Action::new(
                ActionKind::GenerateReport,
                json!({
                    "type": "overdue_items",
                    "asOf": "{{now}}",
                    "dueBefore": "{{date_add(now, -1, \"days\")}}"
                }),
            ),
            Action::new(
                ActionKind::Email,
                json!({
                    "to": "library@institution.edu",
                    "subject": "Overdue items report for {{now}}",
                    "template": "overdue_report"
                }),
            ),
        ])
}

fn calendar_sync() -> CreateRuleRequest {
    CreateRuleRequest::new("Calendar Sync", on_event(events::STUDENT_ENROLLED))
        .with_id("calendar_sync")
        .with_description("Add course sessions to the student's calendar")
        .with_conditions(vec![
            Condition::new("course.startDate", Operator::IsNotEmpty, Value::Null).or_next(),
            Condition::new("course.schedule", Operator::IsNotEmpty, Value::Null),
        ])
        .with_actions(vec![Action::new(
            ActionKind::CreateRecord,
            json!({
                "table": "calendar_events",
                "data": {
                    "userId": "{{student.id}}",
                    "title": "{{course.title}}",
                    "startDate": "{{course.startDate}}",
                    "schedule": "{{course.schedule}}",
                    "source": "enrollment"
                }
            }),
        )])
}
