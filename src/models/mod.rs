//! Data models for Backlog Lens.
//!
//! This module defines the core data structures:
//! - `WorkItem` - A backlog item fetched from the tracker
//! - `EvaluationRecord` - The LLM's INVEST assessment of one work item
//! - `TeamCapacity` - Run-scoped team load used by the estimate
//! - `ResultSnapshot` - The persisted result of a run

pub mod estimation;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

pub use estimation::{DEFAULT_COMPLEXITY, estimate_days};

/// Tracker-assigned work item identifier.
pub type WorkItemId = u64;

/// A backlog item fetched from the tracker. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Tracker-assigned identifier
    pub id: WorkItemId,

    /// Item title
    pub title: String,

    /// Browser URL of the item
    pub url: String,

    /// Description converted to plain/markdown text
    #[serde(default)]
    pub description: String,

    /// Acceptance criteria converted to plain/markdown text
    #[serde(default)]
    pub acceptance_criteria: String,
}

/// The six INVEST criteria every record is scored against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Criterion {
    Independent,
    Negotiable,
    Valuable,
    Estimable,
    Small,
    Testable,
}

impl Criterion {
    /// All criteria in rubric order.
    pub const ALL: [Criterion; 6] = [
        Criterion::Independent,
        Criterion::Negotiable,
        Criterion::Valuable,
        Criterion::Estimable,
        Criterion::Small,
        Criterion::Testable,
    ];

    /// Key used for the criterion in evaluation JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::Independent => "Independent",
            Criterion::Negotiable => "Negotiable",
            Criterion::Valuable => "Valuable",
            Criterion::Estimable => "Estimable",
            Criterion::Small => "Small",
            Criterion::Testable => "Testable",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Score and justification for a single criterion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    /// Score from 1 (poor) to 5 (excellent); not validated
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub score: Option<u8>,

    /// Short reasoning for the score
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub justification: Option<String>,
}

/// Per-criterion scores. Any criterion may be missing from model output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CriteriaScores {
    #[serde(
        rename = "Independent",
        default,
        deserialize_with = "lenient_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub independent: Option<CriterionScore>,
    #[serde(
        rename = "Negotiable",
        default,
        deserialize_with = "lenient_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub negotiable: Option<CriterionScore>,
    #[serde(
        rename = "Valuable",
        default,
        deserialize_with = "lenient_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub valuable: Option<CriterionScore>,
    #[serde(
        rename = "Estimable",
        default,
        deserialize_with = "lenient_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub estimable: Option<CriterionScore>,
    #[serde(
        rename = "Small",
        default,
        deserialize_with = "lenient_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub small: Option<CriterionScore>,
    #[serde(
        rename = "Testable",
        default,
        deserialize_with = "lenient_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub testable: Option<CriterionScore>,
}

impl CriteriaScores {
    /// Look up the score for a criterion.
    pub fn get(&self, criterion: Criterion) -> Option<&CriterionScore> {
        match criterion {
            Criterion::Independent => self.independent.as_ref(),
            Criterion::Negotiable => self.negotiable.as_ref(),
            Criterion::Valuable => self.valuable.as_ref(),
            Criterion::Estimable => self.estimable.as_ref(),
            Criterion::Small => self.small.as_ref(),
            Criterion::Testable => self.testable.as_ref(),
        }
    }

    /// Mean of the criteria that carry a score, if any do.
    pub fn average(&self) -> Option<f64> {
        let scores: Vec<f64> = Criterion::ALL
            .iter()
            .filter_map(|c| self.get(*c).and_then(|s| s.score))
            .map(f64::from)
            .collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }
}

/// The LLM's assessment of one work item.
///
/// Every field is optional: the upstream tool makes no structural promises,
/// so consumers must tolerate gaps. Fields the model adds beyond the known
/// shape are kept in `extra` and written back out unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// Id of the evaluated work item (integral number or numeric string accepted)
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<WorkItemId>,

    /// Title as echoed by the model
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<String>,

    /// INVEST scores
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub criteria_scores: CriteriaScores,

    /// Complexity from 1.0 (very simple) to 5.0 (very complex); not validated
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub complexity: Option<f64>,

    /// Suggestions for improving the item, in model order
    #[serde(default, deserialize_with = "lenient_text_list")]
    pub suggested_improvements: Vec<String>,

    /// Estimated days, attached during aggregation
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub days: Option<f64>,

    /// Browser URL of the matching work item, attached during aggregation
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub url: Option<String>,

    /// Unrecognized fields emitted by the model
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Run-scoped team load used by the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamCapacity {
    /// Extra load on the team, in percent (0 = nominal)
    pub load_percent: f64,

    /// Number of stories sharing the sprint's ceremony overhead
    pub story_count: i64,
}

impl TeamCapacity {
    /// Capacity for a sprint with `story_count` stories.
    pub fn new(load_percent: f64, story_count: usize) -> Self {
        Self {
            load_percent,
            story_count: i64::try_from(story_count).unwrap_or(i64::MAX),
        }
    }
}

/// Run configuration echoed into the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Tracker organization
    pub org: String,

    /// Tracker project
    pub project: String,

    /// Iteration path the items were selected from
    pub sprint_path: String,

    /// Maximum number of items evaluated
    pub max_items: usize,

    /// Sprint length in working days
    pub sprint_days: f64,

    /// Days per unit of complexity
    #[serde(default)]
    pub days_per_complexity_unit: f64,

    /// Team load in percent
    #[serde(default)]
    pub load_percent: f64,

    /// When the snapshot was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

/// The persisted result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSnapshot {
    pub metadata: SnapshotMetadata,
    pub data: Vec<EvaluationRecord>,
}

// Model output is plain JSON with no schema guarantees. The helpers below
// never fail on a well-formed value: a field of the wrong type is dropped.

/// Accept a JSON number or a numeric string; anything else becomes `None`.
///
/// Integer targets also accept integral floats, so `101.0` reads as `101`.
fn lenient_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(number_from_value))
}

fn number_from_value<T: DeserializeOwned>(value: Value) -> Option<T> {
    let number = match value {
        Value::Number(n) => n,
        Value::String(s) => serde_json::Number::from_f64(s.trim().parse().ok()?)?,
        _ => return None,
    };
    if let Ok(exact) = serde_json::from_value(Value::Number(number.clone())) {
        return Some(exact);
    }
    let float = number.as_f64()?;
    if float.fract() != 0.0 || float.abs() >= i64::MAX as f64 {
        return None;
    }
    serde_json::from_value(Value::from(float as i64)).ok()
}

/// Accept a string; other scalars are kept as their JSON text.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(text_from_value))
}

fn text_from_value(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        v @ (Value::Number(_) | Value::Bool(_)) => Some(v.to_string()),
        _ => None,
    }
}

/// Accept a list of texts. A lone string becomes a one-item list; `null`
/// and other shapes become an empty list.
fn lenient_text_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items.into_iter().filter_map(text_from_value).collect(),
        Some(Value::String(s)) => vec![s],
        _ => Vec::new(),
    })
}

/// Decode `T` if the value has its shape, otherwise `None`.
fn lenient_value<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Decode `T` if the value has its shape, otherwise `T::default()`.
fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient_value(deserializer)?.unwrap_or_default())
}
