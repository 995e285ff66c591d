use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, Months, NaiveTime, Utc};
use uuid::Uuid;

use crate::models::{AppointmentRecord, Cohort};
use crate::visits::round_tenth;

pub const DEFAULT_COHORT_MONTHS: usize = 6;
/// Longer requests are served at this length.
pub const MAX_COHORT_MONTHS: usize = 60;

/// Extra history fetched before the displayed window so that a customer whose
/// first visit predates the window is not counted as new inside it.
pub const COHORT_LOOKBACK_PADDING_MONTHS: usize = 6;

/// `year * 12 + zero-based month`.
pub fn month_index<T: Datelike>(date: &T) -> i32 {
    date.year() * 12 + date.month0() as i32
}

pub fn month_label(index: i32) -> String {
    format!("{:04}-{:02}", index.div_euclid(12), index.rem_euclid(12) + 1)
}

/// Start of the history window needed to build `months` cohorts ending at `now`.
pub fn cohort_fetch_start(months: usize, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    let first_of_month = today.with_day(1).unwrap_or(today);
    let months = months.min(MAX_COHORT_MONTHS);
    let trailing = (months + COHORT_LOOKBACK_PADDING_MONTHS).saturating_sub(1) as u32;
    first_of_month
        .checked_sub_months(Months::new(trailing))
        .unwrap_or(first_of_month)
        .and_time(NaiveTime::MIN)
        .and_utc()
}

struct CustomerMonths {
    first: i32,
    visited: HashSet<i32>,
}

/// Builds `months` first-visit cohorts, oldest first, ending with the month
/// that contains `now`.
pub fn build_cohorts(
    appointments: &[AppointmentRecord],
    months: usize,
    now: DateTime<Utc>,
) -> Vec<Cohort> {
    let mut customers: HashMap<Uuid, CustomerMonths> = HashMap::new();

    for appointment in appointments {
        if !appointment.is_completed() {
            continue;
        }
        let Some((customer_id, start_time)) = appointment.attributed() else {
            continue;
        };
        let index = month_index(&start_time);
        let entry = customers.entry(customer_id).or_insert_with(|| CustomerMonths {
            first: index,
            visited: HashSet::new(),
        });
        entry.first = entry.first.min(index);
        entry.visited.insert(index);
    }

    let current = month_index(&now);
    let months = months.min(MAX_COHORT_MONTHS) as i32;

    (0..months)
        .rev()
        .map(|back| {
            let cohort_month = current - back;
            let members: Vec<&CustomerMonths> = customers
                .values()
                .filter(|c| c.first == cohort_month)
                .collect();
            let size = members.len();

            let retention = (0..months)
                .map(|offset| {
                    if size == 0 {
                        return 0.0;
                    }
                    let retained = members
                        .iter()
                        .filter(|c| c.visited.contains(&(cohort_month + offset)))
                        .count();
                    round_tenth(retained as f64 / size as f64 * 100.0)
                })
                .collect();

            Cohort {
                cohort_label: month_label(cohort_month),
                size,
                retention,
            }
        })
        .collect()
}
