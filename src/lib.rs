//! Customer analytics and segmentation for salons: visit aggregation,
//! lifecycle segments, monthly cohort retention, churn and reactivation
//! lists, and salon compliance scoring.

pub mod churn;
pub mod cohorts;
pub mod db;
pub mod insights;
pub mod models;
pub mod report;
pub mod scoring;
pub mod segments;
pub mod visits;
