use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_CANCELLED: &str = "cancelled";
pub const STATUS_NO_SHOW: &str = "no_show";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown license status '{0}'")]
    LicenseStatus(String),
    #[error("unknown appointment status '{0}'")]
    AppointmentStatus(String),
}

/// One row of appointment history as handed over by the store.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentRecord {
    pub customer_id: Option<Uuid>,
    pub start_time: Option<DateTime<Utc>>,
    pub status: String,
    pub total_price: Option<f64>,
}

impl AppointmentRecord {
    pub fn is_completed(&self) -> bool {
        self.status == STATUS_COMPLETED
    }

    /// Customer and start time, when both are present.
    pub fn attributed(&self) -> Option<(Uuid, DateTime<Utc>)> {
        Some((self.customer_id?, self.start_time?))
    }
}

/// Statuses the booking side writes. Used to validate imported rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => STATUS_COMPLETED,
            AppointmentStatus::Cancelled => STATUS_CANCELLED,
            AppointmentStatus::NoShow => STATUS_NO_SHOW,
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" | "canceled" => Ok(AppointmentStatus::Cancelled),
            "no_show" | "no-show" => Ok(AppointmentStatus::NoShow),
            other => Err(ParseError::AppointmentStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerVisitProfile {
    pub customer_id: Uuid,
    pub visit_count: u32,
    pub first_visit: DateTime<Utc>,
    pub last_visit: DateTime<Utc>,
    pub total_spent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerSegment {
    Vip,
    Loyal,
    Regular,
    AtRisk,
    New,
    Churned,
}

impl CustomerSegment {
    pub const ALL: [CustomerSegment; 6] = [
        CustomerSegment::Vip,
        CustomerSegment::Loyal,
        CustomerSegment::Regular,
        CustomerSegment::AtRisk,
        CustomerSegment::New,
        CustomerSegment::Churned,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CustomerSegment::Vip => "VIP",
            CustomerSegment::Loyal => "Loyal",
            CustomerSegment::Regular => "Regular",
            CustomerSegment::AtRisk => "At Risk",
            CustomerSegment::New => "New",
            CustomerSegment::Churned => "Churned",
        }
    }
}

impl fmt::Display for CustomerSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentedCustomer {
    pub customer_id: Uuid,
    pub segment: CustomerSegment,
    pub visit_count: u32,
    pub days_since_last_visit: i64,
    pub lifetime_value: f64,
    pub cancellation_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cohort {
    pub cohort_label: String,
    pub size: usize,
    pub retention: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopCustomer {
    pub customer_id: Uuid,
    pub name: String,
    pub email: String,
    pub total_spent: f64,
    pub visit_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerSummary {
    pub total_customers: usize,
    pub new_customers: usize,
    pub returning_customers: usize,
    pub retention_rate: f64,
    pub churn_rate: f64,
    pub average_lifetime_value: f64,
    pub average_order_value: f64,
    pub top_customers: Vec<TopCustomer>,
}

/// Spend and visit rhythm of one customer, with a three-year projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerLifetimeValue {
    pub visit_count: usize,
    pub total_revenue: f64,
    pub average_order_value: f64,
    pub lifetime_value: f64,
    pub avg_days_between_visits: i64,
    pub tenure_days: i64,
    pub projected_ltv: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerProfile {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InactiveCustomer {
    pub customer_id: Uuid,
    pub last_visit: DateTime<Utc>,
    pub days_since_last_visit: i64,
    pub visit_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AtRiskCustomer {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub days_since_last_visit: i64,
    pub visit_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactivationCandidate {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub days_since_last_visit: i64,
    pub last_visit: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChurnRiskLevel {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChurnRiskAssessment {
    pub level: ChurnRiskLevel,
    pub score: u32,
    pub factors: Vec<String>,
    pub recommendation: String,
    pub days_since_last_visit: Option<i64>,
    pub avg_days_between_visits: i64,
    pub total_visits: usize,
    pub cancellation_rate: i64,
    pub no_show_rate: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    Valid,
    Expiring,
    Expired,
    Unknown,
}

impl FromStr for LicenseStatus {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "valid" => Ok(LicenseStatus::Valid),
            "expiring" => Ok(LicenseStatus::Expiring),
            "expired" => Ok(LicenseStatus::Expired),
            "unknown" => Ok(LicenseStatus::Unknown),
            other => Err(ParseError::LicenseStatus(other.to_string())),
        }
    }
}

/// Risk level of a compliance score. Inverse of the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceResult {
    pub score: u8,
    pub level: ComplianceLevel,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ComplianceInput {
    pub is_verified: bool,
    pub license_status: LicenseStatus,
    pub rating_average: Option<f64>,
    pub total_bookings: i64,
    pub total_revenue: f64,
    pub employee_count: i64,
    pub max_staff: i64,
}

#[derive(Debug, Clone)]
pub struct HealthInput {
    pub rating_average: Option<f64>,
    pub total_bookings: i64,
    pub total_revenue: f64,
    pub employee_count: i64,
    pub max_staff: Option<i64>,
}

/// Salon overview row as read from the store.
#[derive(Debug, Clone, Serialize)]
pub struct SalonSnapshot {
    pub salon_id: Uuid,
    pub name: String,
    pub is_verified: bool,
    pub license_expires_at: Option<NaiveDate>,
    pub rating_average: Option<f64>,
    pub total_bookings: Option<i64>,
    pub total_revenue: Option<f64>,
    pub employee_count: Option<i64>,
    pub max_staff: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalonAssessment {
    pub salon_id: Uuid,
    pub name: String,
    pub is_verified: bool,
    pub license_status: LicenseStatus,
    pub license_days_remaining: Option<i64>,
    pub compliance: ComplianceResult,
    pub health_score: u8,
    pub staff_capacity_ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalonDashboardStats {
    pub total: usize,
    pub verified: usize,
    pub expiring_licenses: usize,
    pub high_risk: usize,
    pub average_compliance: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalonOverview {
    pub salons: Vec<SalonAssessment>,
    pub stats: SalonDashboardStats,
    pub high_risk: Vec<SalonAssessment>,
    pub expiring: Vec<SalonAssessment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_parse_loosely() {
        assert_eq!("Completed".parse(), Ok(AppointmentStatus::Completed));
        assert_eq!("canceled".parse(), Ok(AppointmentStatus::Cancelled));
        assert_eq!("no-show".parse(), Ok(AppointmentStatus::NoShow));
        assert_eq!(
            "walk_in".parse::<AppointmentStatus>(),
            Err(ParseError::AppointmentStatus("walk_in".to_string()))
        );
    }

    #[test]
    fn license_status_rejects_unknown_text() {
        assert_eq!("EXPIRED".parse(), Ok(LicenseStatus::Expired));
        assert!("lapsed".parse::<LicenseStatus>().is_err());
    }

    #[test]
    fn unattributed_rows_are_detected() {
        let record = AppointmentRecord {
            customer_id: Some(Uuid::new_v4()),
            start_time: None,
            status: STATUS_COMPLETED.to_string(),
            total_price: None,
        };
        assert!(record.is_completed());
        assert!(record.attributed().is_none());
    }

    #[test]
    fn output_enums_serialize_as_snake_case() {
        assert_eq!(
            serde_json::to_value(CustomerSegment::AtRisk).unwrap(),
            serde_json::json!("at_risk")
        );
        assert_eq!(
            serde_json::to_value(LicenseStatus::Expiring).unwrap(),
            serde_json::json!("expiring")
        );
        assert_eq!(AppointmentStatus::NoShow.as_str(), STATUS_NO_SHOW);
    }
}
