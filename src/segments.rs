use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{CustomerSegment, CustomerVisitProfile, SegmentedCustomer};
use crate::visits::days_since;

// Per-customer lifecycle thresholds. The salon-level inactivity windows in
// `churn` are a separate scale.
pub const CHURNED_AFTER_DAYS: i64 = 90;
pub const LAPSING_AFTER_DAYS: i64 = 45;
pub const NEW_MAX_VISITS: u32 = 2;
pub const VIP_MIN_VISITS: u32 = 10;
pub const VIP_MIN_LIFETIME_VALUE: f64 = 1000.0;
pub const LOYAL_MIN_VISITS: u32 = 5;
pub const AT_RISK_MIN_VISITS: u32 = 3;
pub const AT_RISK_CANCELLATION_RATE: f64 = 20.0;

/// Assigns exactly one lifecycle segment. The arms are ordered and the first
/// matching arm wins.
pub fn classify_segment(
    profile: &CustomerVisitProfile,
    cancellation_rate: f64,
    now: DateTime<Utc>,
) -> CustomerSegment {
    segment_for(
        profile.visit_count,
        days_since(profile.last_visit, now),
        profile.total_spent,
        cancellation_rate,
    )
}

pub fn segment_for(
    visit_count: u32,
    days_since_last_visit: i64,
    lifetime_value: f64,
    cancellation_rate: f64,
) -> CustomerSegment {
    match (visit_count, days_since_last_visit) {
        (_, days) if days > CHURNED_AFTER_DAYS => CustomerSegment::Churned,
        (visits, _) if visits <= NEW_MAX_VISITS => CustomerSegment::New,
        (visits, _) if visits >= VIP_MIN_VISITS && lifetime_value >= VIP_MIN_LIFETIME_VALUE => {
            CustomerSegment::Vip
        }
        (visits, _) if visits >= LOYAL_MIN_VISITS => CustomerSegment::Loyal,
        (visits, days)
            if visits >= AT_RISK_MIN_VISITS
                && (days > LAPSING_AFTER_DAYS || cancellation_rate > AT_RISK_CANCELLATION_RATE) =>
        {
            CustomerSegment::AtRisk
        }
        _ => CustomerSegment::Regular,
    }
}

/// Classifies every profile. Customers without a known cancellation rate are
/// scored with 0.
pub fn segment_customers(
    profiles: &HashMap<Uuid, CustomerVisitProfile>,
    cancellation_rates: &HashMap<Uuid, f64>,
    now: DateTime<Utc>,
) -> Vec<SegmentedCustomer> {
    let mut customers: Vec<SegmentedCustomer> = profiles
        .values()
        .map(|profile| {
            let cancellation_rate = cancellation_rates
                .get(&profile.customer_id)
                .copied()
                .unwrap_or(0.0);
            SegmentedCustomer {
                customer_id: profile.customer_id,
                segment: classify_segment(profile, cancellation_rate, now),
                visit_count: profile.visit_count,
                days_since_last_visit: days_since(profile.last_visit, now),
                lifetime_value: profile.total_spent,
                cancellation_rate,
            }
        })
        .collect();

    customers.sort_by(|a, b| {
        a.segment
            .cmp(&b.segment)
            .then_with(|| a.days_since_last_visit.cmp(&b.days_since_last_visit))
            .then_with(|| a.customer_id.cmp(&b.customer_id))
    });
    customers
}

/// Customer count per segment. Every segment is present, empty ones with 0.
pub fn segment_breakdown(customers: &[SegmentedCustomer]) -> BTreeMap<CustomerSegment, usize> {
    let mut counts: BTreeMap<CustomerSegment, usize> =
        CustomerSegment::ALL.iter().map(|segment| (*segment, 0)).collect();
    for customer in customers {
        *counts.entry(customer.segment).or_insert(0) += 1;
    }
    counts
}
