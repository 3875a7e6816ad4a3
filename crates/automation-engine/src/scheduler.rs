//! Scheduler gate for time-based rules
//!
//! The engine keeps no clock of its own; a host timer calls
//! `AutomationEngine::process_scheduled_rules` and this gate decides, per rule,
//! whether enough time has passed since the last execution. The configured
//! `time`, `dayOfWeek` and `dayOfMonth` are carried on the trigger but not
//! enforced here.

use crate::model::{Frequency, Rule, Trigger};
use chrono::{DateTime, Datelike, TimeZone, Utc};

const WEEK_MILLIS: i64 = 7 * 24 * 3600 * 1000;

/// Whether a schedule-triggered rule is due at `now`.
///
/// Calendar comparisons happen in `now`'s time zone. Rules without a schedule
/// trigger are never due.
pub fn should_run<Tz: TimeZone>(rule: &Rule, now: &DateTime<Tz>) -> bool {
    let Trigger::Schedule { frequency, .. } = &rule.trigger else {
        return false;
    };

    let Some(last) = rule.last_executed else {
        return true;
    };

    frequency_elapsed(frequency, &last, now)
}

fn frequency_elapsed<Tz: TimeZone>(
    frequency: &Frequency,
    last: &DateTime<Utc>,
    now: &DateTime<Tz>,
) -> bool {
    let last_local = last.with_timezone(&now.timezone());

    match frequency {
        Frequency::Daily => now.date_naive() != last_local.date_naive(),
        Frequency::Weekly => now.timestamp_millis() - last.timestamp_millis() >= WEEK_MILLIS,
        Frequency::Monthly => {
            now.month() != last_local.month() || now.year() != last_local.year()
        }
        Frequency::Other(name) => {
            tracing::debug!("Unknown schedule frequency '{}', never runs", name);
            false
        }
    }
}
