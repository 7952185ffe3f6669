//! Merge evaluations with work item metadata and render reports.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::models::{
    Criterion, DEFAULT_COMPLEXITY, EvaluationRecord, ResultSnapshot, SnapshotMetadata,
    TeamCapacity, WorkItem, WorkItemId, estimate_days,
};

/// Attach an estimate and the item URL to every record.
///
/// Record order is preserved. Records without a complexity are estimated at
/// [`DEFAULT_COMPLEXITY`]. Records whose id matches no item keep no URL.
pub fn aggregate(
    records: Vec<EvaluationRecord>,
    items: &[WorkItem],
    capacity: &TeamCapacity,
    sprint_days: f64,
    days_per_complexity_unit: f64,
    metadata: SnapshotMetadata,
) -> ResultSnapshot {
    // Later duplicates win, matching insertion into a map.
    let by_id: HashMap<WorkItemId, &WorkItem> = items.iter().map(|item| (item.id, item)).collect();

    let data = records
        .into_iter()
        .map(|mut record| {
            let complexity = record.complexity.unwrap_or(DEFAULT_COMPLEXITY);
            record.days = Some(estimate_days(
                complexity,
                capacity,
                sprint_days,
                days_per_complexity_unit,
            ));

            match record.id.and_then(|id| by_id.get(&id)) {
                Some(item) => record.url = Some(item.url.clone()),
                None => tracing::debug!(id = ?record.id, "no work item matches evaluation record"),
            }
            record
        })
        .collect();

    ResultSnapshot { metadata, data }
}

/// Render a snapshot as a Markdown report.
pub fn render_markdown(snapshot: &ResultSnapshot) -> String {
    let meta = &snapshot.metadata;
    let mut md = String::from("# User Story Report\n\n");

    let _ = writeln!(md, "- **Organization:** {}", meta.org);
    let _ = writeln!(md, "- **Project:** {}", meta.project);
    let _ = writeln!(md, "- **Sprint:** {}", meta.sprint_path);
    let _ = writeln!(md, "- **Sprint days:** {}", meta.sprint_days);
    if let Some(generated_at) = meta.generated_at {
        let _ = writeln!(md, "- **Generated:** {}", generated_at.to_rfc3339());
    }
    md.push('\n');

    if snapshot.data.is_empty() {
        md.push_str("_No evaluated stories._\n");
        return md;
    }

    for record in &snapshot.data {
        let id = record
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "?".to_string());
        let _ = writeln!(md, "## Story {}\n", id);
        let _ = writeln!(
            md,
            "**Title:** {}\n",
            record.title.as_deref().unwrap_or("(untitled)")
        );
        if let Some(url) = &record.url {
            let _ = writeln!(md, "**Link:** {}\n", url);
        }
        if let Some(days) = record.days {
            let _ = writeln!(md, "**Estimated days:** {}\n", days);
        }
        if let Some(complexity) = record.complexity {
            let _ = writeln!(md, "**Complexity:** {}\n", complexity);
        }

        md.push_str("### INVEST\n\n| Criterion | Score | Justification |\n|---|---|---|\n");
        for criterion in Criterion::ALL {
            let entry = record.criteria_scores.get(criterion);
            let score = entry
                .and_then(|e| e.score)
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            let justification = entry
                .and_then(|e| e.justification.as_deref())
                .unwrap_or("")
                .replace('|', "\\|")
                .replace('\n', " ");
            let _ = writeln!(md, "| {} | {} | {} |", criterion, score, justification);
        }
        md.push('\n');

        if !record.suggested_improvements.is_empty() {
            md.push_str("### Suggested improvements\n\n");
            for suggestion in &record.suggested_improvements {
                let _ = writeln!(md, "- {}", suggestion);
            }
            md.push('\n');
        }
    }

    md
}
