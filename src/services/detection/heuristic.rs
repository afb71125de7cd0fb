// Heuristic Scorer
// Maps extracted text features (plus an optional sentiment signal) to a scored verdict
// using fixed point rules and fixed factor weights.

use crate::models::{ConfidenceLevel, ExternalSignal, Factor, FactorImpact, ScoredResult, TextFeatures};

const LOW_DIVERSITY: f64 = 0.30;
const VERY_LOW_DIVERSITY: f64 = 0.20;
const LOW_COMPLEXITY: f64 = 10.0;
const VERY_LOW_COMPLEXITY: f64 = 5.0;
const LONG_SENTENCES: f64 = 25.0;
const DENSE_PUNCTUATION: f64 = 0.05;
const NEUTRAL_SIGNAL_MIN: f64 = 0.80;

/// Verdict threshold on the point total.
const AI_SCORE_THRESHOLD: u32 = 50;

const CONFIDENCE_BASE: i32 = 50;
const CONFIDENCE_MIN: i32 = 30;
const CONFIDENCE_MAX: i32 = 95;

/// Sentiment labels meaning "neutral" for the hosted sentiment models we call.
fn is_neutral_label(label: &str) -> bool {
    matches!(label.trim().to_lowercase().as_str(), "neutral" | "label_1")
}

/// Running point total; only used to derive the verdict.
fn ai_score(features: &TextFeatures, signal: Option<&ExternalSignal>) -> u32 {
    let mut points = 0;
    if features.has_repetitive_patterns {
        points += 20;
    }
    if features.has_unusual_transitions {
        points += 15;
    }
    if features.vocabulary_diversity < LOW_DIVERSITY {
        points += 25;
    }
    if features.complexity_score < LOW_COMPLEXITY {
        points += 15;
    }
    if features.average_words_per_sentence > LONG_SENTENCES {
        points += 10;
    }
    if features.punctuation_density > DENSE_PUNCTUATION {
        points += 10;
    }
    if let Some(s) = signal {
        if is_neutral_label(&s.label) && s.score > NEUTRAL_SIGNAL_MIN {
            points += 15;
        }
    }
    points
}

fn confidence(features: &TextFeatures) -> u8 {
    let mut c = CONFIDENCE_BASE;
    if features.has_repetitive_patterns {
        c += 15;
    }
    if features.vocabulary_diversity < VERY_LOW_DIVERSITY {
        c += 20;
    }
    if features.complexity_score < VERY_LOW_COMPLEXITY {
        c += 15;
    }
    c.clamp(CONFIDENCE_MIN, CONFIDENCE_MAX) as u8
}

fn impact(indicates_ai: bool) -> FactorImpact {
    if indicates_ai {
        FactorImpact::Negative
    } else {
        FactorImpact::Positive
    }
}

fn build_factors(features: &TextFeatures) -> Vec<Factor> {
    vec![
        Factor {
            name: "Diversidad de vocabulario".to_string(),
            weight: 0.30,
            value: (features.vocabulary_diversity * 100.0).clamp(0.0, 100.0),
            description: "Proporción de palabras únicas sobre el total".to_string(),
            impact: impact(features.vocabulary_diversity < LOW_DIVERSITY),
        },
        Factor {
            name: "Complejidad".to_string(),
            weight: 0.25,
            value: features.complexity_score.clamp(0.0, 100.0),
            description: "Índice de legibilidad según palabras por oración y sílabas por palabra".to_string(),
            impact: impact(features.complexity_score < LOW_COMPLEXITY),
        },
        Factor {
            name: "Patrones repetitivos".to_string(),
            weight: 0.20,
            value: if features.has_repetitive_patterns { 80.0 } else { 20.0 },
            description: "Frecuencia de la palabra más repetida".to_string(),
            impact: impact(features.has_repetitive_patterns),
        },
        Factor {
            name: "Transiciones naturales".to_string(),
            weight: 0.15,
            value: if features.has_unusual_transitions { 30.0 } else { 70.0 },
            description: "Uso de conectores formales típicos de texto generado".to_string(),
            impact: impact(features.has_unusual_transitions),
        },
        Factor {
            name: "Densidad de puntuación".to_string(),
            weight: 0.10,
            value: (features.punctuation_density * 1000.0).clamp(0.0, 100.0),
            description: "Signos de puntuación por carácter".to_string(),
            impact: impact(features.punctuation_density > DENSE_PUNCTUATION),
        },
    ]
}

fn build_explanation(features: &TextFeatures, is_ai: bool, confidence: u8) -> String {
    let level = ConfidenceLevel::from_confidence(confidence).as_str();
    if !is_ai {
        return format!("El texto parece escrito por un humano (confianza {}).", level);
    }

    let mut indicators = Vec::new();
    if features.has_repetitive_patterns {
        indicators.push("patrones repetitivos");
    }
    if features.vocabulary_diversity < LOW_DIVERSITY {
        indicators.push("vocabulario limitado");
    }
    if features.complexity_score < LOW_COMPLEXITY {
        indicators.push("estructura simplificada");
    }

    let mut explanation = format!("El texto parece generado por IA (confianza {}).", level);
    if !indicators.is_empty() {
        explanation.push_str(&format!(" Indicadores: {}.", indicators.join(", ")));
    }
    explanation
}

/// Score a feature vector. Pure; never touches the network.
pub fn score(features: &TextFeatures, signal: Option<&ExternalSignal>) -> ScoredResult {
    let is_ai = ai_score(features, signal) > AI_SCORE_THRESHOLD;
    let confidence = confidence(features);

    // Probability follows confidence rather than the point total.
    let probability_ai = if is_ai { confidence } else { 100 - confidence };

    ScoredResult {
        is_ai,
        confidence,
        probability_ai,
        probability_human: 100 - probability_ai,
        explanation: build_explanation(features, is_ai, confidence),
        factors: build_factors(features),
    }
}
