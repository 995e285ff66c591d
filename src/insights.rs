//! Query-side services: fetch from an [`AnalyticsSource`], then run the pure
//! analytics over the rows. Fetch failures propagate unchanged.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::churn::{
    at_risk_from_profiles, enrich_at_risk, enrich_reactivation, enrich_top_customers,
    predict_churn_risk, reactivation_from_profiles, AT_RISK_MAX_DAYS, REACTIVATION_MAX_DAYS,
};
use crate::cohorts::{build_cohorts, cohort_fetch_start};
use crate::models::{
    AppointmentRecord, AtRiskCustomer, ChurnRiskAssessment, Cohort, CustomerLifetimeValue,
    CustomerProfile, CustomerSegment, CustomerSummary, ReactivationCandidate, SalonOverview, SalonSnapshot,
    SegmentedCustomer,
};
use crate::scoring::assess_salons;
use crate::segments::{segment_breakdown, segment_customers};
use crate::visits::{aggregate_visits, cancellation_rates, summarize_customers};

/// Upstream collaborators of the analytics engine.
#[allow(async_fn_in_trait)]
pub trait AnalyticsSource {
    /// Completed appointments of one salon starting at or after `since`.
    async fn completed_appointments(
        &self,
        salon_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<AppointmentRecord>>;

    /// Appointments of one salon in every status.
    async fn salon_appointments(
        &self,
        salon_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<AppointmentRecord>>;

    async fn customer_appointments(
        &self,
        salon_id: Uuid,
        customer_id: Uuid,
    ) -> anyhow::Result<Vec<AppointmentRecord>>;

    /// Contact profiles for a batch of ids, in one round trip.
    async fn profiles(&self, ids: &[Uuid]) -> anyhow::Result<Vec<CustomerProfile>>;

    async fn salon_snapshots(&self) -> anyhow::Result<Vec<SalonSnapshot>>;
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentReport {
    pub customers: Vec<SegmentedCustomer>,
    pub breakdown: BTreeMap<CustomerSegment, usize>,
    pub summary: CustomerSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactivationReport {
    pub total_opportunities: usize,
    pub customers: Vec<ReactivationCandidate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Watchlist {
    pub at_risk: Vec<AtRiskCustomer>,
    pub reactivation: ReactivationReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalonDashboard {
    pub salon_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub segments: SegmentReport,
    pub cohorts: Vec<Cohort>,
    pub watchlist: Watchlist,
}

fn trailing_window(days: i64, now: DateTime<Utc>) -> DateTime<Utc> {
    // One extra day so a visit whose floored age equals `days` is still fetched.
    now - Duration::days(days + 1)
}

async fn profile_map<S: AnalyticsSource>(
    source: &S,
    ids: &[Uuid],
) -> anyhow::Result<HashMap<Uuid, CustomerProfile>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let profiles = source.profiles(ids).await?;
    log::debug!("resolved {} of {} customer profiles", profiles.len(), ids.len());
    Ok(profiles.into_iter().map(|p| (p.id, p)).collect())
}

pub async fn customer_segments<S: AnalyticsSource>(
    source: &S,
    salon_id: Uuid,
    now: DateTime<Utc>,
) -> anyhow::Result<SegmentReport> {
    let appointments = source.salon_appointments(salon_id, None).await?;
    log::debug!("segmenting salon {salon_id} over {} appointments", appointments.len());

    let profiles = aggregate_visits(&appointments);
    let rates = cancellation_rates(&appointments);
    let customers = segment_customers(&profiles, &rates, now);

    let mut summary = summarize_customers(&profiles);
    let ids: Vec<Uuid> = summary.top_customers.iter().map(|c| c.customer_id).collect();
    let contacts = profile_map(source, &ids).await?;
    summary.top_customers = enrich_top_customers(&summary.top_customers, &contacts);

    Ok(SegmentReport {
        breakdown: segment_breakdown(&customers),
        summary,
        customers,
    })
}

pub async fn cohort_retention<S: AnalyticsSource>(
    source: &S,
    salon_id: Uuid,
    months: usize,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<Cohort>> {
    let since = cohort_fetch_start(months, now);
    let appointments = source.completed_appointments(salon_id, Some(since)).await?;
    log::debug!(
        "building {months} cohorts for salon {salon_id} from {} visits since {since}",
        appointments.len()
    );
    Ok(build_cohorts(&appointments, months, now))
}

pub async fn at_risk_customers<S: AnalyticsSource>(
    source: &S,
    salon_id: Uuid,
    limit: usize,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<AtRiskCustomer>> {
    let since = trailing_window(AT_RISK_MAX_DAYS, now);
    let appointments = source.completed_appointments(salon_id, Some(since)).await?;
    if appointments.is_empty() {
        return Ok(Vec::new());
    }

    let selected = at_risk_from_profiles(&aggregate_visits(&appointments), limit, now);
    let ids: Vec<Uuid> = selected.iter().map(|c| c.customer_id).collect();
    let profiles = profile_map(source, &ids).await?;
    Ok(enrich_at_risk(&selected, &profiles))
}

pub async fn reactivation_candidates<S: AnalyticsSource>(
    source: &S,
    salon_id: Uuid,
    now: DateTime<Utc>,
) -> anyhow::Result<ReactivationReport> {
    let since = trailing_window(REACTIVATION_MAX_DAYS, now);
    let appointments = source.completed_appointments(salon_id, Some(since)).await?;
    if appointments.is_empty() {
        return Ok(ReactivationReport {
            total_opportunities: 0,
            customers: Vec::new(),
        });
    }

    let selected = reactivation_from_profiles(&aggregate_visits(&appointments), now);
    let ids: Vec<Uuid> = selected.iter().map(|c| c.customer_id).collect();
    let profiles = profile_map(source, &ids).await?;
    let customers = enrich_reactivation(&selected, &profiles);

    Ok(ReactivationReport {
        total_opportunities: customers.len(),
        customers,
    })
}

/// At-risk and reactivation lists from a single fetch, aggregation and
/// profile lookup.
pub async fn churn_watchlist<S: AnalyticsSource>(
    source: &S,
    salon_id: Uuid,
    limit: usize,
    now: DateTime<Utc>,
) -> anyhow::Result<Watchlist> {
    let since = trailing_window(REACTIVATION_MAX_DAYS.max(AT_RISK_MAX_DAYS), now);
    let appointments = source.completed_appointments(salon_id, Some(since)).await?;
    if appointments.is_empty() {
        return Ok(Watchlist {
            at_risk: Vec::new(),
            reactivation: ReactivationReport {
                total_opportunities: 0,
                customers: Vec::new(),
            },
        });
    }

    let visits = aggregate_visits(&appointments);
    let at_risk = at_risk_from_profiles(&visits, limit, now);
    let reactivation = reactivation_from_profiles(&visits, now);

    let mut seen = HashSet::new();
    let ids: Vec<Uuid> = at_risk
        .iter()
        .chain(reactivation.iter())
        .map(|c| c.customer_id)
        .filter(|id| seen.insert(*id))
        .collect();
    let profiles = profile_map(source, &ids).await?;

    let customers = enrich_reactivation(&reactivation, &profiles);
    Ok(Watchlist {
        at_risk: enrich_at_risk(&at_risk, &profiles),
        reactivation: ReactivationReport {
            total_opportunities: customers.len(),
            customers,
        },
    })
}

pub async fn customer_churn_risk<S: AnalyticsSource>(
    source: &S,
    salon_id: Uuid,
    customer_id: Uuid,
    now: DateTime<Utc>,
) -> anyhow::Result<ChurnRiskAssessment> {
    let appointments = source.customer_appointments(salon_id, customer_id).await?;
    Ok(predict_churn_risk(&appointments, now))
}

pub async fn customer_lifetime_value<S: AnalyticsSource>(
    source: &S,
    salon_id: Uuid,
    customer_id: Uuid,
) -> anyhow::Result<CustomerLifetimeValue> {
    let appointments = source.customer_appointments(salon_id, customer_id).await?;
    Ok(crate::visits::customer_lifetime_value(&appointments))
}

pub async fn salon_overview<S: AnalyticsSource>(
    source: &S,
    today: NaiveDate,
) -> anyhow::Result<SalonOverview> {
    let salons = source.salon_snapshots().await?;
    log::debug!("scoring {} salons", salons.len());
    Ok(assess_salons(&salons, today))
}

/// Everything the salon dashboard shows. The three lookups are independent
/// and run concurrently.
pub async fn salon_dashboard<S: AnalyticsSource>(
    source: &S,
    salon_id: Uuid,
    months: usize,
    limit: usize,
    now: DateTime<Utc>,
) -> anyhow::Result<SalonDashboard> {
    let (segments, cohorts, watchlist) = tokio::try_join!(
        customer_segments(source, salon_id, now),
        cohort_retention(source, salon_id, months, now),
        churn_watchlist(source, salon_id, limit, now),
    )?;

    log::info!(
        "dashboard for salon {salon_id}: {} customers, {} at risk, {} reactivation candidates",
        segments.customers.len(),
        watchlist.at_risk.len(),
        watchlist.reactivation.total_opportunities
    );

    Ok(SalonDashboard {
        salon_id,
        generated_at: now,
        segments,
        cohorts,
        watchlist,
    })
}
