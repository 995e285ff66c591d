use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AppointmentRecord, AtRiskCustomer, ChurnRiskAssessment, ChurnRiskLevel, CustomerProfile,
    CustomerVisitProfile, InactiveCustomer, ReactivationCandidate, TopCustomer,
    STATUS_CANCELLED, STATUS_NO_SHOW,
};
use crate::visits::{aggregate_visits, days_since, mean_gap_days};

// Salon-level inactivity windows, inclusive on both ends.
pub const AT_RISK_MIN_DAYS: i64 = 60;
pub const AT_RISK_MAX_DAYS: i64 = 180;
pub const REACTIVATION_MIN_DAYS: i64 = 90;
pub const REACTIVATION_MAX_DAYS: i64 = 365;
pub const DEFAULT_AT_RISK_LIMIT: usize = 20;

const UNKNOWN_NAME: &str = "Unknown";

fn inactive_between(
    profiles: &HashMap<Uuid, CustomerVisitProfile>,
    min_days: i64,
    max_days: i64,
    now: DateTime<Utc>,
) -> Vec<InactiveCustomer> {
    profiles
        .values()
        .filter_map(|profile| {
            let days = days_since(profile.last_visit, now);
            (min_days..=max_days).contains(&days).then(|| InactiveCustomer {
                customer_id: profile.customer_id,
                last_visit: profile.last_visit,
                days_since_last_visit: days,
                visit_count: profile.visit_count,
            })
        })
        .collect()
}

/// Customers last seen 60 to 180 days ago, most lapsed first.
pub fn at_risk_from_profiles(
    profiles: &HashMap<Uuid, CustomerVisitProfile>,
    limit: usize,
    now: DateTime<Utc>,
) -> Vec<InactiveCustomer> {
    let mut customers = inactive_between(profiles, AT_RISK_MIN_DAYS, AT_RISK_MAX_DAYS, now);
    customers.sort_by(|a, b| {
        b.days_since_last_visit
            .cmp(&a.days_since_last_visit)
            .then_with(|| a.customer_id.cmp(&b.customer_id))
    });
    customers.truncate(limit);
    customers
}

/// Customers last seen 90 to 365 days ago, most recoverable first.
pub fn reactivation_from_profiles(
    profiles: &HashMap<Uuid, CustomerVisitProfile>,
    now: DateTime<Utc>,
) -> Vec<InactiveCustomer> {
    let mut customers =
        inactive_between(profiles, REACTIVATION_MIN_DAYS, REACTIVATION_MAX_DAYS, now);
    customers.sort_by(|a, b| {
        a.days_since_last_visit
            .cmp(&b.days_since_last_visit)
            .then_with(|| a.customer_id.cmp(&b.customer_id))
    });
    customers
}

pub fn select_at_risk(
    appointments: &[AppointmentRecord],
    limit: usize,
    now: DateTime<Utc>,
) -> Vec<InactiveCustomer> {
    at_risk_from_profiles(&aggregate_visits(appointments), limit, now)
}

pub fn select_reactivation(
    appointments: &[AppointmentRecord],
    now: DateTime<Utc>,
) -> Vec<InactiveCustomer> {
    reactivation_from_profiles(&aggregate_visits(appointments), now)
}

struct Contact {
    name: String,
    email: String,
    phone: String,
}

fn contact_for(profiles: &HashMap<Uuid, CustomerProfile>, customer_id: &Uuid) -> Contact {
    let profile = profiles.get(customer_id);
    let field = |value: Option<&String>| value.filter(|v| !v.is_empty()).cloned();

    Contact {
        name: profile
            .and_then(|p| field(p.full_name.as_ref()))
            .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
        email: profile.and_then(|p| field(p.email.as_ref())).unwrap_or_default(),
        phone: profile.and_then(|p| field(p.phone.as_ref())).unwrap_or_default(),
    }
}

pub fn enrich_at_risk(
    customers: &[InactiveCustomer],
    profiles: &HashMap<Uuid, CustomerProfile>,
) -> Vec<AtRiskCustomer> {
    customers
        .iter()
        .map(|customer| {
            let contact = contact_for(profiles, &customer.customer_id);
            AtRiskCustomer {
                id: customer.customer_id,
                name: contact.name,
                email: contact.email,
                phone: contact.phone,
                days_since_last_visit: customer.days_since_last_visit,
                visit_count: customer.visit_count,
            }
        })
        .collect()
}

pub fn enrich_reactivation(
    customers: &[InactiveCustomer],
    profiles: &HashMap<Uuid, CustomerProfile>,
) -> Vec<ReactivationCandidate> {
    customers
        .iter()
        .map(|customer| {
            let contact = contact_for(profiles, &customer.customer_id);
            ReactivationCandidate {
                id: customer.customer_id,
                name: contact.name,
                email: contact.email,
                phone: contact.phone,
                days_since_last_visit: customer.days_since_last_visit,
                last_visit: customer.last_visit,
            }
        })
        .collect()
}

/// Fills in names and emails of the top spenders.
pub fn enrich_top_customers(
    customers: &[TopCustomer],
    profiles: &HashMap<Uuid, CustomerProfile>,
) -> Vec<TopCustomer> {
    customers
        .iter()
        .map(|customer| {
            let contact = contact_for(profiles, &customer.customer_id);
            TopCustomer {
                name: contact.name,
                email: contact.email,
                ..customer.clone()
            }
        })
        .collect()
}

// Single-customer risk scoring.
const OVERDUE_GAP_MULTIPLIER: f64 = 2.0;
const APPROACHING_GAP_MULTIPLIER: f64 = 1.5;
const LONG_ABSENCE_DAYS: f64 = 90.0;
const HIGH_CANCELLATION_RATE: f64 = 0.30;
const MODERATE_CANCELLATION_RATE: f64 = 0.15;
const HIGH_NO_SHOW_RATE: f64 = 0.20;
const MODERATE_NO_SHOW_RATE: f64 = 0.10;
const FREQUENCY_DECLINE_MULTIPLIER: f64 = 1.3;
const MIN_VISITS_FOR_FREQUENCY: usize = 3;

fn risk_band(score: u32) -> (ChurnRiskLevel, &'static str) {
    match score {
        70.. => (
            ChurnRiskLevel::Critical,
            "Immediate action required: reach out with a personalized offer or exclusive promotion",
        ),
        50..=69 => (
            ChurnRiskLevel::High,
            "High risk: send a re-engagement campaign with a special incentive",
        ),
        30..=49 => (
            ChurnRiskLevel::Medium,
            "Medium risk: send a reminder or check-in message",
        ),
        _ => (ChurnRiskLevel::Low, "Low risk: continue regular engagement"),
    }
}

/// Scores one customer's churn risk from their full appointment history
/// (every status, one customer).
pub fn predict_churn_risk(
    appointments: &[AppointmentRecord],
    now: DateTime<Utc>,
) -> ChurnRiskAssessment {
    if appointments.is_empty() {
        return ChurnRiskAssessment {
            level: ChurnRiskLevel::Unknown,
            score: 0,
            factors: Vec::new(),
            recommendation: "No appointment history available".to_string(),
            days_since_last_visit: None,
            avg_days_between_visits: 0,
            total_visits: 0,
            cancellation_rate: 0,
            no_show_rate: 0,
        };
    }

    let total_visits = appointments.iter().filter(|a| a.is_completed()).count();
    let mut visits: Vec<DateTime<Utc>> = appointments
        .iter()
        .filter(|a| a.is_completed())
        .filter_map(|a| a.start_time)
        .collect();
    visits.sort_by(|a, b| b.cmp(a));

    let days_since_last_visit = visits
        .first()
        .map(|last| (now - *last).num_seconds() as f64 / 86_400.0);
    let avg_gap = mean_gap_days(&visits);

    let rate_of = |status: &str| {
        if total_visits == 0 {
            return 0.0;
        }
        let count = appointments.iter().filter(|a| a.status == status).count();
        count as f64 / total_visits as f64
    };
    let cancellation_rate = rate_of(STATUS_CANCELLED);
    let no_show_rate = rate_of(STATUS_NO_SHOW);

    let mut score = 0;
    let mut factors = Vec::new();
    let mut flag = |points: u32, factor: &str| {
        score += points;
        factors.push(factor.to_string());
    };

    let absence = days_since_last_visit.unwrap_or(f64::INFINITY);
    if avg_gap > 0.0 && absence > avg_gap * OVERDUE_GAP_MULTIPLIER {
        flag(30, "Overdue for return visit");
    } else if avg_gap > 0.0 && absence > avg_gap * APPROACHING_GAP_MULTIPLIER {
        flag(20, "Approaching typical return window");
    } else if absence > LONG_ABSENCE_DAYS {
        flag(25, "Long time since last visit");
    }

    if cancellation_rate > HIGH_CANCELLATION_RATE {
        flag(25, "High cancellation rate");
    } else if cancellation_rate > MODERATE_CANCELLATION_RATE {
        flag(15, "Moderate cancellation rate");
    }

    if no_show_rate > HIGH_NO_SHOW_RATE {
        flag(20, "High no-show rate");
    } else if no_show_rate > MODERATE_NO_SHOW_RATE {
        flag(10, "Some no-shows");
    }

    if visits.len() >= MIN_VISITS_FOR_FREQUENCY {
        let recent_gap = mean_gap_days(&visits[..MIN_VISITS_FOR_FREQUENCY]);
        if avg_gap > 0.0 && recent_gap > avg_gap * FREQUENCY_DECLINE_MULTIPLIER {
            flag(15, "Decreasing visit frequency");
        }
    }

    if total_visits < MIN_VISITS_FOR_FREQUENCY {
        flag(10, "New customer with few visits");
    }

    let (level, recommendation) = risk_band(score);

    ChurnRiskAssessment {
        level,
        score,
        factors,
        recommendation: recommendation.to_string(),
        days_since_last_visit: days_since_last_visit.map(|d| d.round() as i64),
        avg_days_between_visits: avg_gap.round() as i64,
        total_visits,
        cancellation_rate: (cancellation_rate * 100.0).round() as i64,
        no_show_rate: (no_show_rate * 100.0).round() as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::models::STATUS_COMPLETED;
    use crate::visits::tests::{visit, with_status};

    fn last_seen(now: DateTime<Utc>, days_ago: i64) -> AppointmentRecord {
        AppointmentRecord {
            customer_id: Some(Uuid::new_v4()),
            start_time: Some(now - Duration::days(days_ago)),
            status: STATUS_COMPLETED.to_string(),
            total_price: Some(45.0),
        }
    }

    fn selected_days(customers: &[InactiveCustomer]) -> Vec<i64> {
        customers.iter().map(|c| c.days_since_last_visit).collect()
    }

    #[test]
    fn at_risk_window_boundaries() {
        let now = Utc::now();
        let appointments: Vec<AppointmentRecord> = [59, 60, 180, 181]
            .iter()
            .map(|days| last_seen(now, *days))
            .collect();

        let selected = select_at_risk(&appointments, DEFAULT_AT_RISK_LIMIT, now);
        assert_eq!(selected_days(&selected), vec![180, 60]);
    }

    #[test]
    fn reactivation_window_boundaries() {
        let now = Utc::now();
        let appointments: Vec<AppointmentRecord> = [89, 90, 181, 365, 366]
            .iter()
            .map(|days| last_seen(now, *days))
            .collect();

        let selected = select_reactivation(&appointments, now);
        assert_eq!(selected_days(&selected), vec![90, 181, 365]);
    }

    #[test]
    fn only_the_most_recent_visit_counts() {
        let now = Utc::now();
        let customer = Uuid::new_v4();
        let appointments = vec![
            AppointmentRecord {
                customer_id: Some(customer),
                ..last_seen(now, 120)
            },
            AppointmentRecord {
                customer_id: Some(customer),
                ..last_seen(now, 10)
            },
        ];

        assert!(select_at_risk(&appointments, 20, now).is_empty());
        assert!(select_reactivation(&appointments, now).is_empty());
    }

    #[test]
    fn at_risk_is_truncated_after_sorting() {
        let now = Utc::now();
        let appointments: Vec<AppointmentRecord> = (60..=100)
            .map(|days| last_seen(now, days))
            .collect();

        let selected = select_at_risk(&appointments, 3, now);
        assert_eq!(selected_days(&selected), vec![100, 99, 98]);
    }

    #[test]
    fn enrichment_defaults_missing_contact_fields() {
        let now = Utc::now();
        let known = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let inactive = vec![
            InactiveCustomer {
                customer_id: known,
                last_visit: now - Duration::days(70),
                days_since_last_visit: 70,
                visit_count: 4,
            },
            InactiveCustomer {
                customer_id: stranger,
                last_visit: now - Duration::days(65),
                days_since_last_visit: 65,
                visit_count: 1,
            },
        ];
        let profiles = HashMap::from([(
            known,
            CustomerProfile {
                id: known,
                full_name: Some("Dana Ortiz".to_string()),
                email: Some("dana@example.com".to_string()),
                phone: None,
            },
        )]);

        let enriched = enrich_at_risk(&inactive, &profiles);
        assert_eq!(enriched[0].name, "Dana Ortiz");
        assert_eq!(enriched[0].email, "dana@example.com");
        assert_eq!(enriched[0].phone, "");
        assert_eq!(enriched[1].name, "Unknown");
        assert_eq!(enriched[1].email, "");

        let candidates = enrich_reactivation(&inactive, &profiles);
        assert_eq!(candidates[1].name, "Unknown");
        assert_eq!(candidates[0].last_visit, inactive[0].last_visit);
    }

    #[test]
    fn top_customers_get_names_from_profiles() {
        let known = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let top = vec![
            TopCustomer {
                customer_id: known,
                name: "Unknown".to_string(),
                email: String::new(),
                total_spent: 900.0,
                visit_count: 9,
            },
            TopCustomer {
                customer_id: stranger,
                name: "Unknown".to_string(),
                email: String::new(),
                total_spent: 300.0,
                visit_count: 3,
            },
        ];
        let profiles = HashMap::from([(
            known,
            CustomerProfile {
                id: known,
                full_name: Some("Lena Brooks".to_string()),
                email: Some("lena@example.com".to_string()),
                phone: Some("555-0199".to_string()),
            },
        )]);

        let named = enrich_top_customers(&top, &profiles);

        assert_eq!(named[0].name, "Lena Brooks");
        assert_eq!(named[0].email, "lena@example.com");
        assert_eq!(named[0].total_spent, 900.0);
        assert_eq!(named[1].name, "Unknown");
        assert_eq!(named[1].visit_count, 3);
    }

    #[test]
    fn empty_history_is_unknown_risk() {
        let assessment = predict_churn_risk(&[], Utc::now());
        assert_eq!(assessment.level, ChurnRiskLevel::Unknown);
        assert_eq!(assessment.score, 0);
        assert!(assessment.factors.is_empty());
    }

    #[test]
    fn steady_regular_is_low_risk() {
        let customer = Uuid::new_v4();
        let appointments: Vec<AppointmentRecord> = [5, 35, 65, 95, 125]
            .iter()
            .map(|days| visit(customer, *days, 60.0))
            .collect();

        let assessment = predict_churn_risk(&appointments, Utc::now());
        assert_eq!(assessment.level, ChurnRiskLevel::Low);
        assert_eq!(assessment.score, 0);
        assert_eq!(assessment.avg_days_between_visits, 30);
        assert_eq!(assessment.total_visits, 5);
    }

    #[test]
    fn lapsed_unreliable_customer_is_critical() {
        let customer = Uuid::new_v4();
        let appointments = vec![
            visit(customer, 200, 60.0),
            visit(customer, 230, 60.0),
            with_status(customer, 150, STATUS_CANCELLED),
            with_status(customer, 140, STATUS_NO_SHOW),
        ];

        let assessment = predict_churn_risk(&appointments, Utc::now());

        assert_eq!(
            assessment.factors,
            vec![
                "Overdue for return visit",
                "High cancellation rate",
                "High no-show rate",
                "New customer with few visits",
            ]
        );
        assert_eq!(assessment.score, 85);
        assert_eq!(assessment.level, ChurnRiskLevel::Critical);
        assert_eq!(assessment.cancellation_rate, 50);
        assert_eq!(assessment.no_show_rate, 50);
    }

    #[test]
    fn slowing_visits_are_flagged() {
        let customer = Uuid::new_v4();
        let appointments: Vec<AppointmentRecord> = [2, 62, 122, 132, 142, 152]
            .iter()
            .map(|days| visit(customer, *days, 60.0))
            .collect();

        let assessment = predict_churn_risk(&appointments, Utc::now());
        assert!(assessment
            .factors
            .contains(&"Decreasing visit frequency".to_string()));
        assert_eq!(assessment.level, ChurnRiskLevel::Low);
    }

    #[test]
    fn no_completed_visits_counts_as_long_absence() {
        let customer = Uuid::new_v4();
        let appointments = vec![with_status(customer, 3, STATUS_CANCELLED)];

        let assessment = predict_churn_risk(&appointments, Utc::now());
        assert_eq!(assessment.days_since_last_visit, None);
        assert_eq!(assessment.cancellation_rate, 0);
        assert_eq!(assessment.score, 35);
        assert_eq!(assessment.level, ChurnRiskLevel::Medium);
    }
}
