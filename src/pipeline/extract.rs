//! Result extraction: free-text model reply → [`AnalysisResult`].
//!
//! Vision models rarely return bare JSON. The verdict usually arrives after a
//! paragraph of commentary, often inside a ```` ```json ```` fence, and
//! sometimes truncated by the token limit. [`extract`] is therefore a total
//! function: whatever the input, it returns a fully populated result.
//!
//! ## Search order
//!
//! 1. A fenced block labelled `json` containing an object (lazy match, so the
//!    first fence wins).
//! 2. Otherwise the widest `{ … }` span: first `{` to last `}`.
//! 3. No candidate, a syntax error, or a non-object value → the default
//!    `{"suspicious_chunks": [], "explanation": [], "overall_risk": "low"}`.
//!
//! A parsed object with missing or ill-typed keys is normalised key by key
//! rather than rejected. The fallback is "no tampering found": a broken reply
//! never flags anything on its own.

use crate::analysis::{AnalysisResult, Explanation, RiskLevel};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, warn};

static RE_FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").unwrap());

static RE_BARE_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Where the verdict came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionSource {
    /// Parsed from a ```` ```json ```` fence.
    FencedBlock,
    /// Parsed from the widest brace span.
    BareObject,
    /// Nothing usable; the default verdict was returned.
    Fallback(FallbackReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    NoJson,
    Syntax(String),
    NotAnObject,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::NoJson => f.write_str("no JSON object in reply"),
            FallbackReason::Syntax(e) => write!(f, "JSON syntax error: {e}"),
            FallbackReason::NotAnObject => f.write_str("JSON value is not an object"),
        }
    }
}

/// An extracted verdict plus its provenance.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub result: AnalysisResult,
    pub source: ExtractionSource,
}

impl Extraction {
    pub fn is_degraded(&self) -> bool {
        matches!(self.source, ExtractionSource::Fallback(_))
    }
}

/// Extract the verdict from a model reply. Never fails.
pub fn extract(raw: &str) -> AnalysisResult {
    extract_detailed(raw).result
}

/// Like [`extract`], also reporting which rule produced the result.
pub fn extract_detailed(raw: &str) -> Extraction {
    let (candidate, source) =
        if let Some(m) = RE_FENCED_JSON.captures(raw).and_then(|caps| caps.get(1)) {
            (m.as_str(), ExtractionSource::FencedBlock)
        } else if let Some(m) = RE_BARE_OBJECT.find(raw) {
            (m.as_str(), ExtractionSource::BareObject)
        } else {
            return fallback(FallbackReason::NoJson);
        };

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(obj)) => {
            debug!("Extracted verdict via {:?}", source);
            Extraction {
                result: normalise(&obj),
                source,
            }
        }
        Ok(_) => fallback(FallbackReason::NotAnObject),
        Err(e) => fallback(FallbackReason::Syntax(e.to_string())),
    }
}

fn fallback(reason: FallbackReason) -> Extraction {
    warn!("Model reply unusable ({}); assuming no tampering", reason);
    Extraction {
        result: AnalysisResult::default(),
        source: ExtractionSource::Fallback(reason),
    }
}

/// Build a result from a parsed object, defaulting each absent key.
fn normalise(obj: &Map<String, Value>) -> AnalysisResult {
    let suspicious_chunks: BTreeSet<u32> = obj
        .get("suspicious_chunks")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(chunk_number).collect())
        .unwrap_or_default();

    let explanation: Vec<Explanation> = obj
        .get("explanation")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(explanation_entry).collect())
        .unwrap_or_default();

    let overall_risk = obj
        .get("overall_risk")
        .and_then(Value::as_str)
        .and_then(RiskLevel::parse)
        .unwrap_or_default();

    AnalysisResult {
        suspicious_chunks,
        explanation,
        overall_risk,
    }
}

/// A positive integer chunk number: `3`, `3.0` or `"3"`.
fn chunk_number(v: &Value) -> Option<u32> {
    let n = match v {
        Value::Number(n) => match n.as_u64() {
            Some(u) => u,
            None => {
                let f = n.as_f64()?;
                if f.fract() != 0.0 || f < 1.0 {
                    return None;
                }
                f as u64
            }
        },
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    if n == 0 {
        return None;
    }
    u32::try_from(n).ok()
}

fn explanation_entry(v: &Value) -> Option<Explanation> {
    let obj = v.as_object()?;
    let chunk = chunk_number(obj.get("chunk")?)?;

    let confidence = obj
        .get("confidence")
        .and_then(|c| c.as_f64().or_else(|| c.as_str()?.trim().parse().ok()))
        .map(|c| {
            c.round().clamp(
                Explanation::MIN_CONFIDENCE as f64,
                Explanation::MAX_CONFIDENCE as f64,
            ) as u8
        })
        .unwrap_or(Explanation::MIN_CONFIDENCE);

    let risk = obj
        .get("risk")
        .and_then(Value::as_str)
        .and_then(RiskLevel::parse)
        .unwrap_or_default();

    let reasoning = obj
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(Explanation {
        chunk,
        confidence,
        risk,
        reasoning,
    })
}
