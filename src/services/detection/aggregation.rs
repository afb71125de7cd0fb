// Aggregation Logic
// Merges two independently scored results into one weighted verdict

use crate::models::{CombinedResult, ConfidenceLevel, Factor, ScoredResult};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CombineError {
    #[error("no scored results to combine")]
    NoResults,
    #[error("combiner weights must be non-negative with a positive finite sum (got {weight_a} + {weight_b})")]
    InvalidWeights { weight_a: f64, weight_b: f64 },
}

struct MergedFactor {
    factor: Factor,
    value_sum: f64,
    share_sum: f64,
    lead_contribution: f64,
}

/// Merge factor lists keyed by name. Weights accumulate across sources (scaled by
/// each source's share), values are share-weighted averages, and the impact comes
/// from whichever source contributed more weight.
fn merge_factors(sources: [(&[Factor], f64); 2]) -> Vec<Factor> {
    let mut merged: Vec<MergedFactor> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (factors, share) in sources {
        for f in factors {
            let contribution = f.weight * share;
            match index.get(&f.name) {
                Some(&i) => {
                    let m = &mut merged[i];
                    m.factor.weight += contribution;
                    m.value_sum += f.value * share;
                    m.share_sum += share;
                    if contribution > m.lead_contribution {
                        m.lead_contribution = contribution;
                        m.factor.impact = f.impact;
                    }
                }
                None => {
                    index.insert(f.name.clone(), merged.len());
                    merged.push(MergedFactor {
                        factor: Factor {
                            weight: contribution,
                            ..f.clone()
                        },
                        value_sum: f.value * share,
                        share_sum: share,
                        lead_contribution: contribution,
                    });
                }
            }
        }
    }

    let mut out: Vec<Factor> = merged
        .into_iter()
        .map(|m| {
            let mut factor = m.factor;
            if m.share_sum > 0.0 {
                factor.value = m.value_sum / m.share_sum;
            }
            factor
        })
        .collect();

    out.sort_by(|x, y| {
        y.weight
            .partial_cmp(&x.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    out
}

fn combined_explanation(is_ai: bool, confidence: u8) -> String {
    let verdict = if is_ai {
        "parece generado por IA"
    } else {
        "parece escrito por un humano"
    };
    format!(
        "Resultado combinado de varios análisis: el contenido {} (confianza {}).",
        verdict,
        ConfidenceLevel::from_confidence(confidence).as_str()
    )
}

/// Weighted merge of two scored results. Weights are normalized by their sum,
/// which must be positive.
pub fn combine(
    a: &ScoredResult,
    b: &ScoredResult,
    weight_a: f64,
    weight_b: f64,
) -> Result<CombinedResult, CombineError> {
    let total = weight_a + weight_b;
    if weight_a < 0.0 || weight_b < 0.0 || !total.is_finite() || total <= 0.0 {
        return Err(CombineError::InvalidWeights { weight_a, weight_b });
    }
    let share_a = weight_a / total;
    let share_b = weight_b / total;

    let confidence = (a.confidence as f64 * share_a + b.confidence as f64 * share_b)
        .round()
        .clamp(0.0, 100.0) as u8;
    let probability_ai = (a.probability_ai as f64 * share_a + b.probability_ai as f64 * share_b)
        .round()
        .clamp(0.0, 100.0) as u8;
    let is_ai = probability_ai > 50;

    Ok(CombinedResult {
        is_ai,
        confidence,
        probability_ai,
        probability_human: 100 - probability_ai,
        explanation: combined_explanation(is_ai, confidence),
        factors: merge_factors([(a.factors.as_slice(), share_a), (b.factors.as_slice(), share_b)]),
    })
}

/// Combine whatever results are available. A single result passes through
/// unchanged; none at all is an error.
pub fn combine_available(
    a: Option<ScoredResult>,
    b: Option<ScoredResult>,
    weight_a: f64,
    weight_b: f64,
) -> Result<CombinedResult, CombineError> {
    match (a, b) {
        (Some(a), Some(b)) => combine(&a, &b, weight_a, weight_b),
        (Some(only), None) | (None, Some(only)) => Ok(only),
        (None, None) => Err(CombineError::NoResults),
    }
}
