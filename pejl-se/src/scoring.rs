//! Scoring & aggregation engine
//!
//! Turns raw ordinal responses into directional, comparable friction
//! indicators: per-dimension averages, severity bands, inter-category gaps,
//! and the data-quality signals (substitution pattern, uniform dispersion).
//!
//! All thresholds are expressed on the canonical 1-5 scale and multiplied by
//! `scale_max / 5` before comparison, so the 1-5 and 1-7 deployments
//! classify identically. Data-quality signals are advisory annotations and
//! never block an operation.

use crate::error::Result;
use crate::responses::{self, AdjustedScore};
use pejl_common::config::ScaleConfig;
use pejl_common::fields::{Field, RespondentCategory};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;

/// Scoring thresholds, loaded from database settings
///
/// The substitution thresholds are an empirically tuned judgment call;
/// they live in settings rather than code so domain experts can adjust
/// them without a release.
#[derive(Debug, Clone, Copy)]
pub struct ScoringConfig {
    pub scale: ScaleConfig,
    /// Below this (scale-relative): Critical
    pub severity_critical: f64,
    /// Below this (scale-relative): Warning
    pub severity_warning: f64,
    /// Inter-category gap above this (scale-relative): critical gap
    pub gap_critical: f64,
    /// Substitution signal: TRYGHED and KAN at or above this
    pub substitution_high: f64,
    /// Substitution signal: MENING and BESVAER at or below this
    pub substitution_low: f64,
    /// Population variance below this: uniform (data-quality flag)
    pub uniform_variance: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            scale: ScaleConfig::default(),
            severity_critical: 2.5,
            severity_warning: 3.5,
            gap_critical: 1.5,
            substitution_high: 3.5,
            substitution_low: 2.5,
            uniform_variance: 0.05,
        }
    }
}

impl ScoringConfig {
    /// Load scoring configuration from database settings
    ///
    /// Missing or malformed settings fall back to compiled defaults.
    pub async fn from_database(pool: &SqlitePool) -> Self {
        let mut config = Self::default();
        config.scale = ScaleConfig::from_database(pool).await;

        if let Some(v) = load_threshold(pool, "severity_critical_threshold").await {
            config.severity_critical = v;
        }
        if let Some(v) = load_threshold(pool, "severity_warning_threshold").await {
            config.severity_warning = v;
        }
        if let Some(v) = load_threshold(pool, "gap_critical_threshold").await {
            config.gap_critical = v;
        }
        if let Some(v) = load_threshold(pool, "substitution_high_threshold").await {
            config.substitution_high = v;
        }
        if let Some(v) = load_threshold(pool, "substitution_low_threshold").await {
            config.substitution_low = v;
        }
        if let Some(v) = load_threshold(pool, "uniform_variance_threshold").await {
            config.uniform_variance = v;
        }

        config
    }
}

async fn load_threshold(pool: &SqlitePool, key: &str) -> Option<f64> {
    sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .ok()
        .flatten()
        .and_then(|v| v.parse::<f64>().ok())
}

/// Severity classification for a dimension average
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Healthy,
}

/// Normalize a raw score to consistent polarity
///
/// Reverse-scored questions are mirrored within the scale, so a higher
/// adjusted score always means less friction regardless of phrasing. The
/// transform is an involution: applying it twice returns the raw score.
pub fn normalize_score(raw: i64, reverse_scored: bool, scale: ScaleConfig) -> i64 {
    if reverse_scored {
        (scale.max + scale.min) - raw
    } else {
        raw
    }
}

/// Aggregate for one dimension within one respondent group
#[derive(Debug, Clone, Serialize)]
pub struct DimensionAggregate {
    pub field: Field,
    pub display_name: &'static str,
    /// None when there are no responses; never a division by zero
    pub average: Option<f64>,
    pub response_count: i64,
    /// Absent without data
    pub severity: Option<Severity>,
}

/// Classify an average into a severity band
pub fn classify_severity(average: f64, config: &ScoringConfig) -> Severity {
    let relative = config.scale.relative();
    if average < config.severity_critical * relative {
        Severity::Critical
    } else if average < config.severity_warning * relative {
        Severity::Warning
    } else {
        Severity::Healthy
    }
}

/// Aggregate adjusted scores per dimension
///
/// Output order is the fixed display order (MENING, TRYGHED, KAN, BESVAER),
/// never sorted by score. Dimensions without responses appear with a None
/// average so the report shows "no data" instead of dropping the row.
pub fn aggregate(scores: &[AdjustedScore], config: &ScoringConfig) -> Vec<DimensionAggregate> {
    let mut sums: HashMap<Field, (i64, i64)> = HashMap::new();
    for score in scores {
        let entry = sums.entry(score.field).or_insert((0, 0));
        entry.0 += score.adjusted;
        entry.1 += 1;
    }

    Field::ALL
        .iter()
        .map(|&field| {
            let (sum, count) = sums.get(&field).copied().unwrap_or((0, 0));
            let average = if count > 0 {
                Some(sum as f64 / count as f64)
            } else {
                None
            };
            DimensionAggregate {
                field,
                display_name: field.display_name(),
                average,
                response_count: count,
                severity: average.map(|avg| classify_severity(avg, config)),
            }
        })
        .collect()
}

/// Aggregate an assessment straight from the store
pub async fn aggregate_assessment(
    pool: &SqlitePool,
    customer_id: &str,
    assessment_id: &str,
    category: Option<RespondentCategory>,
    config: &ScoringConfig,
) -> Result<Vec<DimensionAggregate>> {
    let scores =
        responses::adjusted_scores(pool, customer_id, assessment_id, category, config.scale)
            .await?;
    Ok(aggregate(&scores, config))
}

/// Every dimension below the warning threshold, worst first
///
/// Distinct from `lowest_dimension`: this is the full critical-area list for
/// the report, not the single headline pick.
pub fn critical_areas<'a>(
    aggregates: &'a [DimensionAggregate],
    config: &ScoringConfig,
) -> Vec<&'a DimensionAggregate> {
    let threshold = config.severity_warning * config.scale.relative();
    let mut areas: Vec<&DimensionAggregate> = aggregates
        .iter()
        .filter(|a| a.average.map(|avg| avg < threshold).unwrap_or(false))
        .collect();
    areas.sort_by(|a, b| {
        a.average
            .partial_cmp(&b.average)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    areas
}

/// The single worst dimension, for headline recommendations
pub fn lowest_dimension<'a>(
    aggregates: &'a [DimensionAggregate],
) -> Option<&'a DimensionAggregate> {
    aggregates
        .iter()
        .filter(|a| a.average.is_some())
        .min_by(|a, b| {
            a.average
                .partial_cmp(&b.average)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

/// Gap between employee and leader-assessment averages for one dimension
#[derive(Debug, Clone, Serialize)]
pub struct GapEntry {
    pub field: Field,
    pub employee_average: f64,
    pub leader_average: f64,
    pub gap: f64,
    /// Rater groups fundamentally disagree; independent of severity
    pub critical: bool,
}

/// Per-dimension gap analysis between employee and leader_assess groups
///
/// Dimensions missing either group are omitted: a gap against no data is
/// not a gap. A dimension can be healthy for both groups and still carry a
/// critical gap.
pub fn gap_analysis(scores: &[AdjustedScore], config: &ScoringConfig) -> Vec<GapEntry> {
    let employee = aggregate_group(scores, RespondentCategory::Employee);
    let leader = aggregate_group(scores, RespondentCategory::LeaderAssess);
    let threshold = config.gap_critical * config.scale.relative();

    Field::ALL
        .iter()
        .filter_map(|&field| {
            let employee_average = employee.get(&field).copied()?;
            let leader_average = leader.get(&field).copied()?;
            let gap = (leader_average - employee_average).abs();
            Some(GapEntry {
                field,
                employee_average,
                leader_average,
                gap,
                critical: gap > threshold,
            })
        })
        .collect()
}

fn aggregate_group(scores: &[AdjustedScore], category: RespondentCategory) -> HashMap<Field, f64> {
    let mut sums: HashMap<Field, (i64, i64)> = HashMap::new();
    for score in scores.iter().filter(|s| s.category == category) {
        let entry = sums.entry(score.field).or_insert((0, 0));
        entry.0 += score.adjusted;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(field, (sum, count))| (field, sum as f64 / count as f64))
        .collect()
}

/// Substitution-pattern heuristic
///
/// Raised when, within one respondent group, the comfortable dimensions
/// (TRYGHED, KAN) average high while the harder-to-admit dimensions
/// (MENING, BESVAER) average low. Respondents showing this pattern are
/// unlikely to be masking low scores behind inflated comfortable answers,
/// which validates the low scores as genuine. Advisory only.
pub fn substitution_signal(aggregates: &[DimensionAggregate], config: &ScoringConfig) -> bool {
    let relative = config.scale.relative();
    let high = config.substitution_high * relative;
    let low = config.substitution_low * relative;

    let avg = |field: Field| -> Option<f64> {
        aggregates
            .iter()
            .find(|a| a.field == field)
            .and_then(|a| a.average)
    };

    match (
        avg(Field::Tryghed),
        avg(Field::Kan),
        avg(Field::Mening),
        avg(Field::Besvaer),
    ) {
        (Some(tryghed), Some(kan), Some(mening), Some(besvaer)) => {
            tryghed >= high && kan >= high && mening <= low && besvaer <= low
        }
        _ => false,
    }
}

/// Dimensions whose adjusted scores barely vary
///
/// Low population variance is common in synthetic or low-effort data. This
/// is a data-quality signal, not a friction signal. Fewer than three
/// responses cannot meaningfully show variation, so small groups are never
/// flagged.
pub fn dispersion_flags(scores: &[AdjustedScore], config: &ScoringConfig) -> Vec<Field> {
    let mut by_field: HashMap<Field, Vec<f64>> = HashMap::new();
    for score in scores {
        by_field
            .entry(score.field)
            .or_default()
            .push(score.adjusted as f64);
    }

    Field::ALL
        .iter()
        .filter(|&&field| {
            by_field
                .get(&field)
                .map(|values| values.len() >= 3 && population_variance(values) < config.uniform_variance)
                .unwrap_or(false)
        })
        .copied()
        .collect()
}

fn population_variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}
