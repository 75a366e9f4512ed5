//! Aggregate results handler
//!
//! One query surface for everything the report needs: per-dimension
//! aggregates (overall and per respondent category), the critical-area
//! list, gap analysis, and the advisory data-quality annotations. None of
//! the annotations ever withhold data; they ride alongside it.

use super::CustomerScope;
use crate::error::Result;
use crate::lifecycle;
use crate::responses::{self, AdjustedScore};
use crate::scoring::{self, DimensionAggregate, GapEntry};
use crate::tokens::{self, RespondentCount};
use crate::AppState;
use axum::extract::{Path, State};
use axum::Json;
use pejl_common::fields::{Field, RespondentCategory};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct ResultsView {
    pub assessment_id: String,
    /// All respondent categories pooled
    pub overall: Vec<DimensionAggregate>,
    /// Keyed by respondent category code
    pub by_category: BTreeMap<&'static str, Vec<DimensionAggregate>>,
    /// Dimensions below the warning threshold, worst first
    pub critical_areas: Vec<DimensionAggregate>,
    /// Single worst dimension, for the headline recommendation
    pub lowest_dimension: Option<Field>,
    /// Employee vs leader-assessment disagreement per dimension
    pub gaps: Vec<GapEntry>,
    /// Substitution-pattern signal per respondent category (advisory)
    pub substitution: BTreeMap<&'static str, bool>,
    /// Dimensions with suspiciously uniform scores (advisory)
    pub uniform_dimensions: Vec<Field>,
    /// Used/total token counts per category
    pub respondents: Vec<RespondentCount>,
    /// Advisory: employee participation below the configured minimum.
    /// Results are still returned; the presentation layer decides what to
    /// show for small groups.
    pub below_min_responses: bool,
    /// Frequent words from free-text comments
    pub comment_keywords: Vec<(String, usize)>,
}

/// GET /api/assessments/:id/results
pub async fn get_results(
    State(state): State<AppState>,
    CustomerScope(customer_id): CustomerScope,
    Path(id): Path<String>,
) -> Result<Json<ResultsView>> {
    let config = &state.scoring;

    // Scope check happens here: an id owned by another customer is 404
    let assessment = lifecycle::get_assessment(&state.db, &customer_id, &id).await?;

    let scores = responses::adjusted_scores(
        &state.db,
        &customer_id,
        &assessment.id,
        None,
        config.scale,
    )
    .await?;

    let overall = scoring::aggregate(&scores, config);

    let mut by_category = BTreeMap::new();
    let mut substitution = BTreeMap::new();
    for category in RespondentCategory::ALL {
        let group: Vec<AdjustedScore> = scores
            .iter()
            .filter(|s| s.category == category)
            .copied()
            .collect();
        let aggregates = scoring::aggregate(&group, config);
        substitution.insert(
            category.as_str(),
            scoring::substitution_signal(&aggregates, config),
        );
        by_category.insert(category.as_str(), aggregates);
    }

    let critical_areas: Vec<DimensionAggregate> = scoring::critical_areas(&overall, config)
        .into_iter()
        .cloned()
        .collect();
    let lowest_dimension = scoring::lowest_dimension(&overall).map(|a| a.field);
    let gaps = scoring::gap_analysis(&scores, config);
    let uniform_dimensions = scoring::dispersion_flags(&scores, config);

    let respondents = tokens::respondent_counts(&state.db, &assessment.id).await?;
    let employee_used = respondents
        .iter()
        .find(|r| r.category == RespondentCategory::Employee)
        .map(|r| r.used)
        .unwrap_or(0);
    let below_min_responses = employee_used < assessment.min_responses;

    let comment_texts = responses::comments(&state.db, &customer_id, &assessment.id).await?;
    let comment_keywords = responses::comment_keywords(&comment_texts, 10);

    Ok(Json(ResultsView {
        assessment_id: assessment.id,
        overall,
        by_category,
        critical_areas,
        lowest_dimension,
        gaps,
        substitution,
        uniform_dimensions,
        respondents,
        below_min_responses,
        comment_keywords,
    }))
}
