//! Salon compliance and health scoring.
//!
//! Every ceiling and weight here is a calibration constant. Changing one
//! changes what operators see on the admin console.

use chrono::NaiveDate;

use crate::models::{
    ComplianceInput, ComplianceLevel, ComplianceResult, HealthInput, LicenseStatus,
    SalonAssessment, SalonDashboardStats, SalonOverview, SalonSnapshot,
};

pub const COMPLIANCE_BASELINE: i32 = 80;
pub const HIGH_RISK_BELOW: u8 = 60;
pub const MEDIUM_RISK_BELOW: u8 = 80;
pub const LICENSE_EXPIRING_WITHIN_DAYS: i64 = 30;

const UNVERIFIED_PENALTY: i32 = 20;
const LICENSE_EXPIRED_PENALTY: i32 = 25;
const LICENSE_EXPIRING_PENALTY: i32 = 10;
const LICENSE_UNKNOWN_PENALTY: i32 = 5;
const OVERSTAFFED_PENALTY: i32 = 15;
const LOW_RATING_PENALTY: i32 = 10;
const LOW_RATING_BELOW: f64 = 3.0;
const HIGH_RATING_BONUS: i32 = 5;
const HIGH_RATING_ABOVE: f64 = 4.5;
const LOW_VOLUME_PENALTY: i32 = 5;
const LOW_VOLUME_BELOW: i64 = 5;

pub const RATING_CEILING: f64 = 5.0;
pub const BOOKINGS_CEILING: f64 = 200.0;
pub const REVENUE_CEILING: f64 = 150_000.0;
pub const RATING_WEIGHT: f64 = 0.35;
pub const BOOKINGS_WEIGHT: f64 = 0.25;
pub const REVENUE_WEIGHT: f64 = 0.30;
pub const STAFFING_WEIGHT: f64 = 0.10;

const MAX_STAFF_CAPACITY_RATIO: f64 = 2.0;
const INSIGHT_LIST_LEN: usize = 6;

pub fn compliance_level(score: u8) -> ComplianceLevel {
    if score < HIGH_RISK_BELOW {
        ComplianceLevel::High
    } else if score < MEDIUM_RISK_BELOW {
        ComplianceLevel::Medium
    } else {
        ComplianceLevel::Low
    }
}

pub fn compute_compliance(input: &ComplianceInput) -> ComplianceResult {
    let mut score = COMPLIANCE_BASELINE;
    let mut issues = Vec::new();

    if !input.is_verified {
        score -= UNVERIFIED_PENALTY;
        issues.push("Verification pending".to_string());
    }

    match input.license_status {
        LicenseStatus::Expired => {
            score -= LICENSE_EXPIRED_PENALTY;
            issues.push("License expired".to_string());
        }
        LicenseStatus::Expiring => {
            score -= LICENSE_EXPIRING_PENALTY;
            issues.push("License expiring soon".to_string());
        }
        LicenseStatus::Unknown => {
            score -= LICENSE_UNKNOWN_PENALTY;
            issues.push("License status unknown".to_string());
        }
        LicenseStatus::Valid => {}
    }

    if input.max_staff > 0 && input.employee_count > input.max_staff {
        score -= OVERSTAFFED_PENALTY;
        issues.push("Staff count exceeds limit".to_string());
    }

    // The high-rating bonus has no matching issue entry.
    match input.rating_average {
        Some(rating) if rating < LOW_RATING_BELOW => {
            score -= LOW_RATING_PENALTY;
            issues.push("Low customer rating".to_string());
        }
        Some(rating) if rating > HIGH_RATING_ABOVE => score += HIGH_RATING_BONUS,
        _ => {}
    }

    if input.total_bookings < LOW_VOLUME_BELOW {
        score -= LOW_VOLUME_PENALTY;
        issues.push("Low booking volume".to_string());
    }

    let score = score.clamp(0, 100) as u8;
    ComplianceResult {
        score,
        level: compliance_level(score),
        issues,
    }
}

fn normalized(value: f64, ceiling: f64) -> f64 {
    (value / ceiling).clamp(0.0, 1.0)
}

pub fn calculate_health_score(input: &HealthInput) -> u8 {
    let rating = normalized(input.rating_average.unwrap_or(0.0), RATING_CEILING);
    let bookings = normalized(input.total_bookings as f64, BOOKINGS_CEILING);
    let revenue = normalized(input.total_revenue, REVENUE_CEILING);

    let capacity = match input.max_staff {
        Some(max) if max > 0 => max,
        _ => input.employee_count,
    }
    .max(1);
    let staffing = normalized(input.employee_count as f64, capacity as f64);

    let blended = rating * RATING_WEIGHT
        + bookings * BOOKINGS_WEIGHT
        + revenue * REVENUE_WEIGHT
        + staffing * STAFFING_WEIGHT;

    (blended * 100.0).round().clamp(0.0, 100.0) as u8
}

/// License state and calendar days remaining until expiry.
pub fn derive_license_status(
    expires_at: Option<NaiveDate>,
    today: NaiveDate,
) -> (LicenseStatus, Option<i64>) {
    let Some(expires_at) = expires_at else {
        return (LicenseStatus::Unknown, None);
    };
    let days = (expires_at - today).num_days();
    let status = match days {
        d if d < 0 => LicenseStatus::Expired,
        d if d <= LICENSE_EXPIRING_WITHIN_DAYS => LicenseStatus::Expiring,
        _ => LicenseStatus::Valid,
    };
    (status, Some(days))
}

pub fn staff_capacity_ratio(employee_count: i64, max_staff: Option<i64>) -> f64 {
    match max_staff {
        Some(max) if max > 0 => (employee_count as f64 / max as f64).min(MAX_STAFF_CAPACITY_RATIO),
        _ => 0.0,
    }
}

pub fn assess_salon(salon: &SalonSnapshot, today: NaiveDate) -> SalonAssessment {
    let (license_status, license_days_remaining) =
        derive_license_status(salon.license_expires_at, today);
    let employee_count = salon.employee_count.unwrap_or(0);
    let total_bookings = salon.total_bookings.unwrap_or(0);
    let total_revenue = salon.total_revenue.unwrap_or(0.0);

    let compliance = compute_compliance(&ComplianceInput {
        is_verified: salon.is_verified,
        license_status,
        rating_average: salon.rating_average,
        total_bookings,
        total_revenue,
        employee_count,
        max_staff: salon.max_staff.unwrap_or(0),
    });

    let health_score = calculate_health_score(&HealthInput {
        rating_average: salon.rating_average,
        total_bookings,
        total_revenue,
        employee_count,
        max_staff: salon.max_staff,
    });

    SalonAssessment {
        salon_id: salon.salon_id,
        name: salon.name.clone(),
        is_verified: salon.is_verified,
        license_status,
        license_days_remaining,
        compliance,
        health_score,
        staff_capacity_ratio: staff_capacity_ratio(employee_count, salon.max_staff),
    }
}

pub fn assess_salons(salons: &[SalonSnapshot], today: NaiveDate) -> SalonOverview {
    let assessments: Vec<SalonAssessment> =
        salons.iter().map(|salon| assess_salon(salon, today)).collect();

    let mut high_risk: Vec<SalonAssessment> = assessments
        .iter()
        .filter(|a| a.compliance.level == ComplianceLevel::High)
        .cloned()
        .collect();
    let mut expiring: Vec<SalonAssessment> = assessments
        .iter()
        .filter(|a| matches!(a.license_status, LicenseStatus::Expiring | LicenseStatus::Expired))
        .cloned()
        .collect();

    let average_compliance = if assessments.is_empty() {
        0
    } else {
        let total: u32 = assessments.iter().map(|a| a.compliance.score as u32).sum();
        (total as f64 / assessments.len() as f64).round() as u8
    };

    let stats = SalonDashboardStats {
        total: assessments.len(),
        verified: assessments.iter().filter(|a| a.is_verified).count(),
        expiring_licenses: expiring.len(),
        high_risk: high_risk.len(),
        average_compliance,
    };

    high_risk.sort_by_key(|a| a.compliance.score);
    high_risk.truncate(INSIGHT_LIST_LEN);
    expiring.sort_by_key(|a| a.license_days_remaining.unwrap_or(i64::MAX));
    expiring.truncate(INSIGHT_LIST_LEN);

    SalonOverview {
        salons: assessments,
        stats,
        high_risk,
        expiring,
    }
}
