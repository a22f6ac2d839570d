// certmig-core/src/domain/district.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-store and aggregate footprint metrics for one district.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictMetrics {
    pub students: u64,
    #[serde(default)]
    pub staff: u64,
    #[serde(default)]
    pub schools: u64,
    pub total_records: u64,
    #[serde(default)]
    pub recent_updates_30d: u64,
    #[serde(default = "full_completeness")]
    pub data_completeness_pct: f64,
}

fn full_completeness() -> f64 {
    100.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    pub metrics: DistrictMetrics,
    #[serde(default)]
    pub footprint_by_store: BTreeMap<String, u64>,
    /// Manual override, 0-100. Defaults to the neutral midpoint.
    #[serde(default = "default_business_priority")]
    pub business_priority: f64,
}

fn default_business_priority() -> f64 {
    50.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionCriteria {
    pub min_students: u64,
    pub min_schools: u64,
    pub min_total_records: u64,
    pub max_total_records: u64,
    pub min_completeness_pct: f64,
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        Self {
            min_students: 5_000,
            min_schools: 10,
            min_total_records: 50_000,
            max_total_records: 2_000_000,
            min_completeness_pct: 85.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeCategory {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedDistrict {
    #[serde(flatten)]
    pub profile: DistrictProfile,
    pub priority_score: f64,
    pub priority: usize,
    pub estimated_migration_hours: f64,
    pub size_category: SizeCategory,
    pub recommended_for_pilot: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingSummary {
    pub total_students: u64,
    pub total_staff: u64,
    pub total_schools: u64,
    pub total_records: u64,
    pub estimated_total_migration_hours: f64,
    pub districts_by_size: BTreeMap<String, usize>,
    pub pilot_recommended: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingOutcome {
    pub total_districts_analyzed: usize,
    pub recommended_districts: usize,
    pub selection_criteria: SelectionCriteria,
    pub districts: Vec<RankedDistrict>,
    pub summary: RankingSummary,
}

// Historical per-phase throughput, records per minute. Loading is the
// bottleneck.
const EXTRACTION_PER_MIN: f64 = 50_000.0;
const ANONYMIZATION_PER_MIN: f64 = 100_000.0;
const VALIDATION_PER_MIN: f64 = 200_000.0;
const LOADING_PER_MIN: f64 = 30_000.0;
const OVERHEAD_FACTOR: f64 = 1.1;

const LARGE_THRESHOLD: u64 = 700_000;
const MEDIUM_THRESHOLD: u64 = 300_000;

/// Weighted priority: size 40%, activity 30%, completeness 20%,
/// business priority 10%. Each factor normalized onto 0-100.
pub fn priority_score(profile: &DistrictProfile) -> f64 {
    let m = &profile.metrics;
    let size_score = ((m.total_records as f64 / 1_000_000.0) * 100.0).min(100.0);
    let activity_score = ((m.recent_updates_30d as f64 / 10_000.0) * 100.0).min(100.0);
    let completeness_score = m.data_completeness_pct;
    let business_score = profile.business_priority;

    let weighted = size_score * 0.40
        + activity_score * 0.30
        + completeness_score * 0.20
        + business_score * 0.10;
    (weighted * 100.0).round() / 100.0
}

/// Wall-clock estimate in hours, including 10% overhead for setup,
/// monitoring and reporting.
pub fn estimate_migration_hours(total_records: u64) -> f64 {
    let records = total_records as f64;
    let minutes = (records / EXTRACTION_PER_MIN
        + records / ANONYMIZATION_PER_MIN
        + records / VALIDATION_PER_MIN
        + records / LOADING_PER_MIN)
        * OVERHEAD_FACTOR;
    (minutes / 60.0 * 10.0).round() / 10.0
}

pub fn size_category(total_records: u64) -> SizeCategory {
    if total_records >= LARGE_THRESHOLD {
        SizeCategory::Large
    } else if total_records >= MEDIUM_THRESHOLD {
        SizeCategory::Medium
    } else {
        SizeCategory::Small
    }
}

/// Filters by the selection criteria, ranks by priority score and
/// recommends one pilot district per size category.
pub fn rank_districts(
    districts: Vec<DistrictProfile>,
    criteria: &SelectionCriteria,
    top_n: usize,
) -> RankingOutcome {
    let analyzed = districts.len();

    let mut candidates: Vec<RankedDistrict> = districts
        .into_iter()
        .filter(|d| {
            let m = &d.metrics;
            m.students >= criteria.min_students
                && m.schools >= criteria.min_schools
                && m.total_records >= criteria.min_total_records
                && m.total_records <= criteria.max_total_records
                && m.data_completeness_pct >= criteria.min_completeness_pct
        })
        .map(|profile| {
            let score = priority_score(&profile);
            let hours = estimate_migration_hours(profile.metrics.total_records);
            let category = size_category(profile.metrics.total_records);
            RankedDistrict {
                profile,
                priority_score: score,
                priority: 0,
                estimated_migration_hours: hours,
                size_category: category,
                recommended_for_pilot: false,
            }
        })
        .collect();

    // Highest score first; equal scores keep a stable id order
    candidates.sort_by(|a, b| {
        b.priority_score
            .partial_cmp(&a.priority_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.profile.id.cmp(&b.profile.id))
    });

    candidates.truncate(top_n);
    for (idx, district) in candidates.iter_mut().enumerate() {
        district.priority = idx + 1;
    }

    let pilots = select_pilots(&candidates);
    for district in candidates.iter_mut() {
        district.recommended_for_pilot = pilots.contains(&district.profile.id);
    }

    let mut by_size: BTreeMap<String, usize> = BTreeMap::new();
    for district in &candidates {
        let key = match district.size_category {
            SizeCategory::Large => "large",
            SizeCategory::Medium => "medium",
            SizeCategory::Small => "small",
        };
        *by_size.entry(key.to_string()).or_insert(0) += 1;
    }

    let summary = RankingSummary {
        total_students: candidates.iter().map(|d| d.profile.metrics.students).sum(),
        total_staff: candidates.iter().map(|d| d.profile.metrics.staff).sum(),
        total_schools: candidates.iter().map(|d| d.profile.metrics.schools).sum(),
        total_records: candidates
            .iter()
            .map(|d| d.profile.metrics.total_records)
            .sum(),
        estimated_total_migration_hours: candidates
            .iter()
            .map(|d| d.estimated_migration_hours)
            .sum(),
        districts_by_size: by_size,
        pilot_recommended: pilots,
    };

    RankingOutcome {
        total_districts_analyzed: analyzed,
        recommended_districts: candidates.len(),
        selection_criteria: criteria.clone(),
        districts: candidates,
        summary,
    }
}

/// One large, one medium, one small — the first of each in ranking
/// order — so the pilot covers the whole size spectrum.
fn select_pilots(ranked: &[RankedDistrict]) -> Vec<String> {
    let mut large = None;
    let mut medium = None;
    let mut small = None;

    for district in ranked {
        let slot = match district.size_category {
            SizeCategory::Large => &mut large,
            SizeCategory::Medium => &mut medium,
            SizeCategory::Small => &mut small,
        };
        if slot.is_none() {
            *slot = Some(district.profile.id.clone());
        }
        if large.is_some() && medium.is_some() && small.is_some() {
            break;
        }
    }

    [large, medium, small].into_iter().flatten().collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn district(id: &str, records: u64, students: u64) -> DistrictProfile {
        DistrictProfile {
            id: id.into(),
            name: format!("District {}", id),
            state: Some("CA".into()),
            metrics: DistrictMetrics {
                students,
                staff: 500,
                schools: 20,
                total_records: records,
                recent_updates_30d: 5_000,
                data_completeness_pct: 95.0,
            },
            footprint_by_store: BTreeMap::new(),
            business_priority: 50.0,
        }
    }

    #[test]
    fn test_size_categories() {
        assert_eq!(size_category(100_000), SizeCategory::Small);
        assert_eq!(size_category(300_000), SizeCategory::Medium);
        assert_eq!(size_category(700_000), SizeCategory::Large);
    }

    #[test]
    fn test_ranking_filters_and_orders() {
        let districts = vec![
            district("d-small", 100_000, 6_000),
            district("d-large", 900_000, 40_000),
            district("d-tiny", 10_000, 800), // fails min_students + min_records
            district("d-medium", 400_000, 15_000),
        ];

        let outcome = rank_districts(districts, &SelectionCriteria::default(), 15);
        assert_eq!(outcome.total_districts_analyzed, 4);
        assert_eq!(outcome.recommended_districts, 3);
        // Larger footprint scores higher with equal activity/completeness
        assert_eq!(outcome.districts[0].profile.id, "d-large");
        assert_eq!(outcome.districts[0].priority, 1);

        // One pilot per size category
        assert_eq!(outcome.summary.pilot_recommended.len(), 3);
        assert!(outcome
            .districts
            .iter()
            .filter(|d| d.recommended_for_pilot)
            .count()
            == 3);
    }

    #[test]
    fn test_migration_estimate_scales() {
        let small = estimate_migration_hours(50_000);
        let large = estimate_migration_hours(1_000_000);
        assert!(large > small);
        // 1M records: 20 + 10 + 5 + 33.3 min, +10% overhead ≈ 1.3h
        assert!((large - 1.3).abs() < 0.05, "got {}", large);
    }

    #[test]
    fn test_priority_score_weighting() {
        let mut d = district("d", 1_000_000, 20_000);
        d.metrics.recent_updates_30d = 10_000;
        d.metrics.data_completeness_pct = 100.0;
        d.business_priority = 100.0;
        // All factors saturated -> 100
        assert!((priority_score(&d) - 100.0).abs() < f64::EPSILON);
    }
}
