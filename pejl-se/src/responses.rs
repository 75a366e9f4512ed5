//! Response store reads
//!
//! Responses are append-only: the only writer is the redemption transaction
//! in the token ledger. Everything here is read-side support for the scoring
//! engine and the results view, always filtered by the caller's customer
//! scope.

use crate::error::{Error, Result};
use pejl_common::config::ScaleConfig;
use pejl_common::fields::{Field, RespondentCategory};
use sqlx::SqlitePool;
use std::collections::HashMap;

/// One response joined to its question, with normalization applied
#[derive(Debug, Clone, Copy)]
pub struct AdjustedScore {
    pub field: Field,
    pub category: RespondentCategory,
    /// Polarity-consistent score: higher always means less friction
    pub adjusted: i64,
}

/// Fetch adjusted scores for an assessment, optionally filtered by
/// respondent category
///
/// Reverse-scored questions are folded here: `adjusted = (max + min) - raw`.
/// The customer filter is part of the join, so an id belonging to another
/// tenant yields no rows rather than foreign data.
pub async fn adjusted_scores(
    pool: &SqlitePool,
    customer_id: &str,
    assessment_id: &str,
    category: Option<RespondentCategory>,
    scale: ScaleConfig,
) -> Result<Vec<AdjustedScore>> {
    let rows: Vec<(String, String, i64, i64)> = match category {
        Some(category) => {
            sqlx::query_as(
                r#"
                SELECT q.field, r.respondent_category, r.score, q.reverse_scored
                FROM responses r
                JOIN questions q ON q.id = r.question_id
                JOIN assessments a ON a.id = r.assessment_id
                WHERE r.assessment_id = ? AND a.customer_id = ? AND r.respondent_category = ?
                "#,
            )
            .bind(assessment_id)
            .bind(customer_id)
            .bind(category.as_str())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                r#"
                SELECT q.field, r.respondent_category, r.score, q.reverse_scored
                FROM responses r
                JOIN questions q ON q.id = r.question_id
                JOIN assessments a ON a.id = r.assessment_id
                WHERE r.assessment_id = ? AND a.customer_id = ?
                "#,
            )
            .bind(assessment_id)
            .bind(customer_id)
            .fetch_all(pool)
            .await?
        }
    };

    rows.into_iter()
        .map(|(field, category, score, reverse_scored)| {
            let field = Field::parse(&field)
                .ok_or_else(|| Error::Internal(format!("unknown field code {}", field)))?;
            let category = RespondentCategory::parse(&category)
                .ok_or_else(|| Error::Internal(format!("unknown category {}", category)))?;
            let adjusted = crate::scoring::normalize_score(score, reverse_scored != 0, scale);
            Ok(AdjustedScore {
                field,
                category,
                adjusted,
            })
        })
        .collect()
}

/// Free-text comments for an assessment (customer-scoped)
pub async fn comments(
    pool: &SqlitePool,
    customer_id: &str,
    assessment_id: &str,
) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT r.comment
        FROM responses r
        JOIN assessments a ON a.id = r.assessment_id
        WHERE r.assessment_id = ? AND a.customer_id = ?
          AND r.comment IS NOT NULL AND r.comment != ''
        "#,
    )
    .bind(assessment_id)
    .bind(customer_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(c,)| c).collect())
}

/// Words too common to be informative in either survey language
const STOPWORDS: &[&str] = &[
    // English
    "the", "and", "for", "that", "with", "this", "are", "was", "not", "but", "have", "has",
    "our", "out", "too", "very", "can", "its", "all", "they", "them", "you", "your", "get",
    // Danish
    "og", "i", "at", "det", "der", "den", "til", "er", "som", "de", "med", "har",
    "ikke", "jeg", "men", "af", "vi", "kan", "os", "du", "min", "mit", "meget", "mere",
];

/// Simple keyword extraction over free-text comments
///
/// Lowercase tokenization, stopword filter, frequency ordering. Anything
/// beyond this is out of scope for the core.
pub fn comment_keywords(texts: &[String], limit: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for text in texts {
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .map(|w| w.to_lowercase())
            .filter(|w| w.len() >= 3 && !STOPWORDS.contains(&w.as_str()))
        {
            *counts.entry(word).or_insert(0) += 1;
        }
    }

    let mut keywords: Vec<(String, usize)> = counts.into_iter().collect();
    // Frequency first, then alphabetical so equal counts are deterministic
    keywords.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    keywords.truncate(limit);
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_frequency_ordered() {
        let texts = vec![
            "Too many meetings and broken tooling".to_string(),
            "Meetings all day, the tooling is broken".to_string(),
            "Broken processes".to_string(),
        ];

        let keywords = comment_keywords(&texts, 3);
        assert_eq!(keywords[0].0, "broken");
        assert_eq!(keywords[0].1, 3);
        assert!(keywords.iter().any(|(w, n)| w == "meetings" && *n == 2));
    }

    #[test]
    fn keywords_skip_stopwords_and_short_words() {
        let texts = vec!["det er ikke og i at ok".to_string()];
        let keywords = comment_keywords(&texts, 10);
        assert!(keywords.is_empty());
    }

    #[test]
    fn keyword_limit_is_honored() {
        let texts = vec!["alpha beta gamma delta".to_string()];
        let keywords = comment_keywords(&texts, 2);
        assert_eq!(keywords.len(), 2);
    }
}
