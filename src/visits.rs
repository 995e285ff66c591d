use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AppointmentRecord, CustomerLifetimeValue, CustomerSummary, CustomerVisitProfile, TopCustomer,
    STATUS_CANCELLED,
};

const TOP_CUSTOMER_COUNT: usize = 5;
const UNNAMED_CUSTOMER: &str = "Unknown";
const DAYS_PER_YEAR: f64 = 365.0;
const PROJECTION_YEARS: f64 = 3.0;

/// Collapses completed appointments into one visit profile per customer.
///
/// Rows that are not completed, or that cannot be attributed to a customer
/// and a start time, are skipped.
pub fn aggregate_visits(
    appointments: &[AppointmentRecord],
) -> HashMap<Uuid, CustomerVisitProfile> {
    let mut profiles: HashMap<Uuid, CustomerVisitProfile> = HashMap::new();

    for appointment in appointments {
        if !appointment.is_completed() {
            continue;
        }
        let Some((customer_id, start_time)) = appointment.attributed() else {
            continue;
        };
        let price = appointment.total_price.unwrap_or(0.0).max(0.0);

        let entry = profiles
            .entry(customer_id)
            .or_insert_with(|| CustomerVisitProfile {
                customer_id,
                visit_count: 0,
                first_visit: start_time,
                last_visit: start_time,
                total_spent: 0.0,
            });

        entry.visit_count += 1;
        entry.total_spent += price;
        if start_time < entry.first_visit {
            entry.first_visit = start_time;
        }
        if start_time > entry.last_visit {
            entry.last_visit = start_time;
        }
    }

    profiles
}

/// Whole days elapsed between `then` and `now`, floored and never negative.
pub fn days_since(then: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - then).num_days().max(0)
}

/// Mean number of days between consecutive visits, sorted newest first.
/// Zero with fewer than two visits.
pub fn mean_gap_days(visits_newest_first: &[DateTime<Utc>]) -> f64 {
    if visits_newest_first.len() < 2 {
        return 0.0;
    }
    let total: f64 = visits_newest_first
        .windows(2)
        .map(|pair| (pair[0] - pair[1]).num_seconds() as f64 / 86_400.0)
        .sum();
    total / (visits_newest_first.len() - 1) as f64
}

/// Percentage of each customer's appointments (any status) that were cancelled.
pub fn cancellation_rates(appointments: &[AppointmentRecord]) -> HashMap<Uuid, f64> {
    let mut counts: HashMap<Uuid, (u32, u32)> = HashMap::new();

    for appointment in appointments {
        let Some(customer_id) = appointment.customer_id else {
            continue;
        };
        let entry = counts.entry(customer_id).or_insert((0, 0));
        entry.0 += 1;
        if appointment.status == STATUS_CANCELLED {
            entry.1 += 1;
        }
    }

    counts
        .into_iter()
        .map(|(customer_id, (total, cancelled))| {
            let rate = if total == 0 {
                0.0
            } else {
                cancelled as f64 / total as f64 * 100.0
            };
            (customer_id, rate)
        })
        .collect()
}

pub fn summarize_customers(profiles: &HashMap<Uuid, CustomerVisitProfile>) -> CustomerSummary {
    let total_customers = profiles.len();
    let new_customers = profiles.values().filter(|p| p.visit_count == 1).count();
    let returning_customers = total_customers - new_customers;
    let total_revenue: f64 = profiles.values().map(|p| p.total_spent).sum();
    let total_visits: u32 = profiles.values().map(|p| p.visit_count).sum();

    let ratio = |numerator: f64, denominator: f64| {
        if denominator > 0.0 {
            numerator / denominator
        } else {
            0.0
        }
    };

    let mut ranked: Vec<&CustomerVisitProfile> = profiles.values().collect();
    ranked.sort_by(|a, b| {
        b.total_spent
            .partial_cmp(&a.total_spent)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.visit_count.cmp(&a.visit_count))
            .then_with(|| a.customer_id.cmp(&b.customer_id))
    });

    let retention = ratio(returning_customers as f64, total_customers as f64) * 100.0;

    CustomerSummary {
        total_customers,
        new_customers,
        returning_customers,
        retention_rate: round_tenth(retention),
        churn_rate: if total_customers == 0 {
            0.0
        } else {
            round_tenth(100.0 - retention)
        },
        average_lifetime_value: ratio(total_revenue, total_customers as f64),
        average_order_value: ratio(total_revenue, total_visits as f64),
        top_customers: ranked
            .into_iter()
            .take(TOP_CUSTOMER_COUNT)
            .map(|p| TopCustomer {
                customer_id: p.customer_id,
                name: UNNAMED_CUSTOMER.to_string(),
                email: String::new(),
                total_spent: p.total_spent,
                visit_count: p.visit_count,
            })
            .collect(),
    }
}

pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Lifetime value of one customer from their appointment history. Only
/// completed visits with a start time count. The projection assumes the
/// current visit rhythm and average spend hold for three more years; a
/// customer with a single visit is projected at that many visits per year.
pub fn customer_lifetime_value(appointments: &[AppointmentRecord]) -> CustomerLifetimeValue {
    let mut visits: Vec<(DateTime<Utc>, f64)> = appointments
        .iter()
        .filter(|a| a.is_completed())
        .filter_map(|a| Some((a.start_time?, a.total_price.unwrap_or(0.0).max(0.0))))
        .collect();

    if visits.is_empty() {
        return CustomerLifetimeValue {
            visit_count: 0,
            total_revenue: 0.0,
            average_order_value: 0.0,
            lifetime_value: 0.0,
            avg_days_between_visits: 0,
            tenure_days: 0,
            projected_ltv: 0.0,
        };
    }

    visits.sort_by(|a, b| b.0.cmp(&a.0));
    let dates: Vec<DateTime<Utc>> = visits.iter().map(|(start, _)| *start).collect();

    let visit_count = visits.len();
    let total_revenue: f64 = visits.iter().map(|(_, price)| price).sum();
    let average_order_value = total_revenue / visit_count as f64;
    let avg_gap = mean_gap_days(&dates);
    let tenure = (dates[0] - dates[visit_count - 1]).num_seconds() as f64 / 86_400.0;

    let visits_per_year = if avg_gap > 0.0 {
        DAYS_PER_YEAR / avg_gap
    } else {
        visit_count as f64
    };

    CustomerLifetimeValue {
        visit_count,
        total_revenue,
        average_order_value,
        lifetime_value: total_revenue,
        avg_days_between_visits: avg_gap.round() as i64,
        tenure_days: tenure.round() as i64,
        projected_ltv: visits_per_year * average_order_value * PROJECTION_YEARS,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    use crate::models::STATUS_COMPLETED;

    pub(crate) fn visit(customer_id: Uuid, days_ago: i64, price: f64) -> AppointmentRecord {
        AppointmentRecord {
            customer_id: Some(customer_id),
            start_time: Some(Utc::now() - Duration::days(days_ago)),
            status: STATUS_COMPLETED.to_string(),
            total_price: Some(price),
        }
    }

    pub(crate) fn with_status(customer_id: Uuid, days_ago: i64, status: &str) -> AppointmentRecord {
        AppointmentRecord {
            status: status.to_string(),
            ..visit(customer_id, days_ago, 0.0)
        }
    }

    #[test]
    fn aggregates_counts_spend_and_bounds() {
        let customer = Uuid::new_v4();
        let appointments = vec![
            visit(customer, 40, 50.0),
            visit(customer, 3, 80.0),
            visit(customer, 20, 70.0),
        ];

        let profiles = aggregate_visits(&appointments);
        let profile = &profiles[&customer];

        assert_eq!(profile.visit_count, 3);
        assert!((profile.total_spent - 200.0).abs() < 0.001);
        assert_eq!(profile.first_visit, appointments[0].start_time.unwrap());
        assert_eq!(profile.last_visit, appointments[1].start_time.unwrap());
    }

    #[test]
    fn skips_unattributable_and_incomplete_rows() {
        let customer = Uuid::new_v4();
        let appointments = vec![
            AppointmentRecord {
                customer_id: None,
                ..visit(customer, 1, 10.0)
            },
            AppointmentRecord {
                start_time: None,
                ..visit(customer, 1, 10.0)
            },
            with_status(customer, 2, STATUS_CANCELLED),
        ];

        assert!(aggregate_visits(&appointments).is_empty());
        assert!(aggregate_visits(&[]).is_empty());
    }

    #[test]
    fn missing_price_counts_as_zero_spend() {
        let customer = Uuid::new_v4();
        let appointments = vec![AppointmentRecord {
            total_price: None,
            ..visit(customer, 5, 0.0)
        }];

        let profiles = aggregate_visits(&appointments);
        assert_eq!(profiles[&customer].visit_count, 1);
        assert_eq!(profiles[&customer].total_spent, 0.0);
    }

    #[test]
    fn profiles_are_never_empty_and_ordered() {
        let customers: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let mut appointments = Vec::new();
        for (index, customer) in customers.iter().enumerate() {
            for days_ago in [90, 3, 45, 200, 1].iter().take(index + 1) {
                appointments.push(visit(*customer, *days_ago, 25.0));
            }
            appointments.push(with_status(*customer, 10, STATUS_CANCELLED));
        }

        for profile in aggregate_visits(&appointments).values() {
            assert!(profile.visit_count >= 1);
            assert!(profile.first_visit <= profile.last_visit);
        }
    }

    #[test]
    fn days_since_floors_partial_days() {
        let now = Utc::now();
        assert_eq!(days_since(now - Duration::hours(47), now), 1);
        assert_eq!(days_since(now - Duration::days(60), now), 60);
        assert_eq!(days_since(now + Duration::hours(5), now), 0);
    }

    #[test]
    fn cancellation_rate_uses_all_statuses() {
        let customer = Uuid::new_v4();
        let appointments = vec![
            visit(customer, 10, 40.0),
            visit(customer, 20, 40.0),
            visit(customer, 30, 40.0),
            with_status(customer, 15, STATUS_CANCELLED),
        ];

        let rates = cancellation_rates(&appointments);
        assert!((rates[&customer] - 25.0).abs() < 0.001);
    }

    #[test]
    fn summary_splits_new_and_returning() {
        let regular = Uuid::new_v4();
        let once = Uuid::new_v4();
        let appointments = vec![
            visit(regular, 5, 100.0),
            visit(regular, 35, 60.0),
            visit(once, 2, 40.0),
        ];

        let summary = summarize_customers(&aggregate_visits(&appointments));

        assert_eq!(summary.total_customers, 2);
        assert_eq!(summary.new_customers, 1);
        assert_eq!(summary.returning_customers, 1);
        assert_eq!(summary.retention_rate, 50.0);
        assert_eq!(summary.churn_rate, 50.0);
        assert!((summary.average_lifetime_value - 100.0).abs() < 0.001);
        assert!((summary.average_order_value - 200.0 / 3.0).abs() < 0.001);
        assert_eq!(summary.top_customers[0].customer_id, regular);
        assert_eq!(summary.top_customers[0].name, "Unknown");
    }

    #[test]
    fn churn_rate_complements_retention() {
        let customers: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let appointments = vec![
            visit(customers[0], 4, 50.0),
            visit(customers[0], 30, 50.0),
            visit(customers[1], 8, 50.0),
            visit(customers[2], 9, 50.0),
        ];

        let summary = summarize_customers(&aggregate_visits(&appointments));
        assert_eq!(summary.retention_rate, 33.3);
        assert_eq!(summary.churn_rate, 66.7);
    }

    #[test]
    fn summary_of_nothing_is_zeroed() {
        let summary = summarize_customers(&HashMap::new());
        assert_eq!(summary.total_customers, 0);
        assert_eq!(summary.retention_rate, 0.0);
        assert_eq!(summary.churn_rate, 0.0);
        assert_eq!(summary.average_order_value, 0.0);
        assert!(summary.top_customers.is_empty());
    }

    #[test]
    fn lifetime_value_of_no_history_is_zero() {
        let customer = Uuid::new_v4();
        let cancelled_only = vec![with_status(customer, 3, STATUS_CANCELLED)];

        for history in [Vec::new(), cancelled_only] {
            let value = customer_lifetime_value(&history);
            assert_eq!(value.visit_count, 0);
            assert_eq!(value.total_revenue, 0.0);
            assert_eq!(value.average_order_value, 0.0);
            assert_eq!(value.avg_days_between_visits, 0);
            assert_eq!(value.tenure_days, 0);
            assert_eq!(value.projected_ltv, 0.0);
        }
    }

    #[test]
    fn single_visit_projects_one_visit_per_year() {
        let value = customer_lifetime_value(&[visit(Uuid::new_v4(), 12, 80.0)]);

        assert_eq!(value.visit_count, 1);
        assert_eq!(value.avg_days_between_visits, 0);
        assert_eq!(value.tenure_days, 0);
        assert!((value.lifetime_value - 80.0).abs() < 0.001);
        assert!((value.projected_ltv - 240.0).abs() < 0.001);
    }

    #[test]
    fn evenly_spaced_visits_drive_the_projection() {
        let customer = Uuid::new_v4();
        let mut appointments: Vec<AppointmentRecord> = [10, 83, 156, 229]
            .iter()
            .map(|days| visit(customer, *days, 50.0))
            .collect();
        appointments.push(with_status(customer, 40, STATUS_CANCELLED));

        let value = customer_lifetime_value(&appointments);

        assert_eq!(value.visit_count, 4);
        assert!((value.total_revenue - 200.0).abs() < 0.001);
        assert!((value.average_order_value - 50.0).abs() < 0.001);
        assert_eq!(value.avg_days_between_visits, 73);
        assert_eq!(value.tenure_days, 219);
        // 365 / 73 = 5 visits a year at 50 for three years
        assert!((value.projected_ltv - 750.0).abs() < 0.01);
    }

    #[test]
    fn lifetime_value_uses_actual_prices() {
        let customer = Uuid::new_v4();
        let appointments = vec![
            visit(customer, 5, 120.0),
            visit(customer, 35, 30.0),
            AppointmentRecord {
                total_price: None,
                ..visit(customer, 65, 0.0)
            },
        ];

        let value = customer_lifetime_value(&appointments);
        assert!((value.total_revenue - 150.0).abs() < 0.001);
        assert!((value.average_order_value - 50.0).abs() < 0.001);
        // 30-day rhythm: 365 / 30 visits a year
        assert!((value.projected_ltv - 365.0 / 30.0 * 50.0 * 3.0).abs() < 0.01);
    }
}
