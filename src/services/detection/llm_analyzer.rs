// LLM Analyzer
// Asks the generative backend for a structured verdict and validates its answer.
// Unreadable answers degrade to a neutral result instead of an error.

use crate::models::{BackendVerdict, Factor, FactorImpact, ScoredResult};
use crate::services::providers::{json_object_spans, GenerativeBackend};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Maximum characters of the sample embedded in the prompt.
const PROMPT_TEXT_MAX_CHARS: usize = 12_000;

const DETECTION_SYSTEM_PROMPT: &str = r#"Eres un experto en detección de contenido generado por inteligencia artificial.
Analiza el texto proporcionado y determina si fue escrito por una IA o por un humano.
Considera la fluidez, la naturalidad, la repetición de estructuras, el uso de conectores formales,
la especificidad del contenido y la presencia de rasgos personales.

Responde únicamente con un objeto JSON con este formato:
{
  "isAI": true,
  "confidence": 0-100,
  "probabilityAI": 0-100,
  "probabilityHuman": 0-100,
  "explanation": "explicación breve",
  "methodology": "cómo llegaste a la conclusión",
  "factors": [
    {"name": "nombre", "weight": 0.0-1.0, "value": 0-100, "description": "detalle", "impact": "positive|negative|neutral"}
  ]
}
probabilityAI y probabilityHuman deben sumar 100. No añadas texto fuera del JSON."#;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawVerdict {
    #[serde(default, rename = "isAI", alias = "isAi", alias = "is_ai")]
    is_ai: Option<bool>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default, rename = "probabilityAI", alias = "probabilityAi", alias = "probability_ai")]
    probability_ai: Option<f64>,
    #[serde(default, alias = "probability_human")]
    probability_human: Option<f64>,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    methodology: Option<String>,
    #[serde(default)]
    factors: Vec<RawFactor>,
}

#[derive(Debug, Deserialize, Default)]
struct RawFactor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    impact: Option<String>,
}

/// Outcome of validating a generative backend answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedVerdict {
    pub result: ScoredResult,
    pub methodology: Option<String>,
    pub fallback: bool,
}

impl ParsedVerdict {
    fn fallback() -> Self {
        Self {
            result: ScoredResult::neutral_fallback(),
            methodology: None,
            fallback: true,
        }
    }
}

pub fn build_detection_prompt(text: &str) -> (String, String) {
    let sample: String = text.chars().take(PROMPT_TEXT_MAX_CHARS).collect();
    let user = format!(
        "Analiza el siguiente texto y responde en formato JSON:\n\n\"\"\"\n{}\n\"\"\"",
        sample
    );
    (DETECTION_SYSTEM_PROMPT.to_string(), user)
}

/// Accept 0-1 fractions as well as 0-100 percentages.
fn to_percent(v: f64) -> Option<f64> {
    if !v.is_finite() {
        return None;
    }
    let scaled = if (0.0..=1.0).contains(&v) && v.fract() != 0.0 {
        v * 100.0
    } else {
        v
    };
    Some(scaled.clamp(0.0, 100.0))
}

fn parse_impact(raw: Option<&str>) -> FactorImpact {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("positive") | Some("positivo") => FactorImpact::Positive,
        Some("negative") | Some("negativo") => FactorImpact::Negative,
        _ => FactorImpact::Neutral,
    }
}

fn convert_factor(raw: RawFactor) -> Option<Factor> {
    let name = raw.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())?;
    let weight = raw
        .weight
        .filter(|w| w.is_finite())
        .map(|w| if w > 1.0 { w / 100.0 } else { w })
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    let value = raw.value.and_then(to_percent).unwrap_or(0.0);
    Some(Factor {
        name,
        weight,
        value,
        description: raw.description.unwrap_or_default(),
        impact: parse_impact(raw.impact.as_deref()),
    })
}

fn validate(raw: RawVerdict) -> Option<ParsedVerdict> {
    let confidence = raw.confidence.and_then(to_percent);
    let probability_ai = raw
        .probability_ai
        .and_then(to_percent)
        .or_else(|| raw.probability_human.and_then(to_percent).map(|h| 100.0 - h))
        .or_else(|| match (raw.is_ai, confidence) {
            (Some(true), Some(c)) => Some(c),
            (Some(false), Some(c)) => Some(100.0 - c),
            _ => None,
        });

    // Without a verdict or a probability there is nothing to trust.
    if raw.is_ai.is_none() && probability_ai.is_none() {
        return None;
    }

    let probability_ai = probability_ai
        .unwrap_or(if raw.is_ai == Some(true) { 100.0 } else { 0.0 })
        .round() as u8;
    let is_ai = raw.is_ai.unwrap_or(probability_ai > 50);
    let confidence = confidence
        .map(|c| c.round() as u8)
        .unwrap_or_else(|| probability_ai.max(100 - probability_ai));

    let explanation = raw
        .explanation
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| {
            if is_ai {
                "El modelo considera que el texto fue generado por IA.".to_string()
            } else {
                "El modelo considera que el texto fue escrito por un humano.".to_string()
            }
        });

    Some(ParsedVerdict {
        result: ScoredResult {
            is_ai,
            confidence,
            probability_ai,
            probability_human: 100 - probability_ai,
            explanation,
            factors: raw.factors.into_iter().filter_map(convert_factor).collect(),
        },
        methodology: raw.methodology.filter(|m| !m.trim().is_empty()),
        fallback: false,
    })
}

/// Parse the structured verdict embedded in a model answer.
/// The first JSON object that carries a usable verdict wins; prose around it is ignored.
pub fn parse_verdict(content: &str) -> ParsedVerdict {
    let mut objects = 0usize;
    for span in json_object_spans(content) {
        objects += 1;
        match serde_json::from_str::<RawVerdict>(span) {
            Ok(raw) => {
                if let Some(parsed) = validate(raw) {
                    return parsed;
                }
            }
            Err(e) => debug!("[LLM_ANALYZER] Skipping JSON object: {}", e),
        }
    }

    if objects == 0 {
        warn!("[LLM_ANALYZER] No JSON object in verdict, using neutral fallback");
    } else {
        warn!("[LLM_ANALYZER] Verdict without isAI or probability, using neutral fallback");
    }
    ParsedVerdict::fallback()
}

/// Ask the generative backend for a verdict. Transport failures and timeouts
/// yield `None` (backend unavailable); malformed answers yield the fallback verdict.
pub async fn request_verdict<G: GenerativeBackend>(
    backend: &G,
    text: &str,
    timeout: Duration,
) -> Option<BackendVerdict> {
    let (system, user) = build_detection_prompt(text);
    let model = backend.model_label();

    match tokio::time::timeout(timeout, backend.generate(&system, &user)).await {
        Ok(Ok(chat)) => {
            let parsed = parse_verdict(&chat.content);
            info!(
                model = %model,
                latency_ms = chat.latency_ms,
                fallback = parsed.fallback,
                "[LLM_ANALYZER] Generative verdict received"
            );
            Some(BackendVerdict::Generative {
                model,
                methodology: parsed.methodology,
                fallback: parsed.fallback,
                latency_ms: chat.latency_ms,
                result: parsed.result,
            })
        }
        Ok(Err(e)) => {
            warn!("[LLM_ANALYZER] Generative backend {} failed: {}", model, e);
            None
        }
        Err(_) => {
            warn!(
                "[LLM_ANALYZER] Generative backend {} timeout ({}s)",
                model,
                timeout.as_secs()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_verdict_in_prose() {
        let content = r#"Claro, aquí está el análisis:
```json
{"isAI": true, "confidence": 87, "probabilityAI": 82, "probabilityHuman": 18,
 "explanation": "Estructura muy uniforme", "methodology": "análisis estilométrico",
 "factors": [{"name": "Uniformidad", "weight": 0.6, "value": 90, "description": "frases similares", "impact": "negative"},
             {"name": "Detalle personal", "weight": 40, "value": 0.2, "impact": "positivo"}]}
```"#;
        let parsed = parse_verdict(content);
        assert!(!parsed.fallback);
        assert!(parsed.result.is_ai);
        assert_eq!(parsed.result.confidence, 87);
        assert_eq!(parsed.result.probability_ai, 82);
        assert_eq!(parsed.result.probability_human, 18);
        assert_eq!(parsed.methodology.as_deref(), Some("análisis estilométrico"));
        assert_eq!(parsed.result.factors.len(), 2);
        assert_eq!(parsed.result.factors[0].impact, FactorImpact::Negative);
        let second = &parsed.result.factors[1];
        assert!((second.weight - 0.4).abs() < 1e-9);
        assert!((second.value - 20.0).abs() < 1e-9);
        assert_eq!(second.impact, FactorImpact::Positive);
    }

    #[test]
    fn test_probability_split_is_repaired() {
        let parsed = parse_verdict(r#"{"isAI": false, "confidence": 70, "probabilityAI": 30, "probabilityHuman": 90}"#);
        assert_eq!(parsed.result.probability_ai, 30);
        assert_eq!(parsed.result.probability_human, 70);
    }

    #[test]
    fn test_probability_derived_from_confidence() {
        let parsed = parse_verdict(r#"{"is_ai": true, "confidence": 0.75}"#);
        assert!(!parsed.fallback);
        assert_eq!(parsed.result.confidence, 75);
        assert_eq!(parsed.result.probability_ai, 75);

        let parsed = parse_verdict(r#"{"probabilityHuman": 64}"#);
        assert!(!parsed.result.is_ai);
        assert_eq!(parsed.result.probability_ai, 36);
        assert_eq!(parsed.result.confidence, 64);
    }

    #[test]
    fn test_malformed_answers_fall_back() {
        for content in [
            "I cannot determine that.",
            "{not json at all}",
            r#"{"explanation": "sin veredicto"}"#,
            "} backwards {",
            "",
        ] {
            let parsed = parse_verdict(content);
            assert!(parsed.fallback, "{content}");
            assert_eq!(parsed.result, ScoredResult::neutral_fallback());
        }
    }

    #[test]
    fn test_verdict_followed_by_prose() {
        let parsed = parse_verdict(
            "{\"isAI\": true, \"confidence\": 88, \"probabilityAI\": 85, \"probabilityHuman\": 15}\nEspero que este análisis sea útil.",
        );
        assert!(!parsed.fallback);
        assert!(parsed.result.is_ai);
        assert_eq!(parsed.result.confidence, 88);
        assert_eq!(parsed.result.probability_ai, 85);
        assert_eq!(parsed.result.probability_human, 15);
    }

    #[test]
    fn test_braces_in_leading_prose_are_skipped() {
        let parsed = parse_verdict(
            r#"Nota {breve}: aquí va el resultado {"isAI": false, "confidence": 72, "probabilityAI": 28} y {fin}"#,
        );
        assert!(!parsed.fallback);
        assert!(!parsed.result.is_ai);
        assert_eq!(parsed.result.confidence, 72);
        assert_eq!(parsed.result.probability_ai, 28);
        assert_eq!(parsed.result.probability_human, 72);
    }

    #[test]
    fn test_empty_object_before_verdict_is_skipped() {
        let parsed = parse_verdict(r#"Contexto: {} Resultado: {"probabilityAI": 0.9}"#);
        assert!(!parsed.fallback);
        assert!(parsed.result.is_ai);
        assert_eq!(parsed.result.probability_ai, 90);
    }

    #[test]
    fn test_nameless_factors_dropped() {
        let parsed = parse_verdict(r#"{"isAI": true, "probabilityAI": 60, "factors": [{"weight": 0.5}, {"name": " "}]}"#);
        assert!(parsed.result.factors.is_empty());
    }

    #[test]
    fn test_prompt_embeds_text() {
        let (system, user) = build_detection_prompt("texto de prueba");
        assert!(system.contains("JSON"));
        assert!(user.contains("texto de prueba"));
    }
}
