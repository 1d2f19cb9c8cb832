use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{ExportRow, ScoreDelta, Snapshot, SubItemDraft};
use crate::{stats, store};

pub const UNSCORED: &str = "unscored";

pub fn to_export_rows(tree: &Snapshot) -> Vec<ExportRow> {
    stats::walk(tree)
        .map(|(group, criterion, item)| ExportRow {
            group: group.name.clone(),
            department: group.department.clone(),
            criterion: criterion.name.clone(),
            sub_item: item.description.clone(),
            status: match &item.score {
                Some(score) => score
                    .status
                    .map(|status| status.to_string())
                    .unwrap_or_default(),
                None => UNSCORED.to_string(),
            },
            date: item.score.as_ref().map(|score| score.date),
            notes: item
                .score
                .as_ref()
                .map(|score| score.notes.clone())
                .unwrap_or_default(),
            scoring_type: item.scoring_type,
            weight: item.weight,
        })
        .collect()
}

/// Rebuilds a tree from flat rows, assigning fresh ids.
///
/// Rows are merged into groups by name and department and into criteria by
/// name, in order of first appearance. Two distinct groups sharing a name and
/// department come back as one group, and likewise for same-named criteria
/// within a group. Scoring guides and evidence are not carried by rows.
pub fn from_export_rows(rows: &[ExportRow]) -> Result<Snapshot> {
    let mut tree = Snapshot::default();
    let mut groups: HashMap<(&str, &str), String> = HashMap::new();
    let mut criteria: HashMap<(String, &str), String> = HashMap::new();

    for row in rows {
        let group_id = match groups.get(&(row.group.as_str(), row.department.as_str())) {
            Some(id) => id.clone(),
            None => {
                let (next, id) = store::add_group(&tree, &row.group, &row.department);
                tree = next;
                groups.insert((row.group.as_str(), row.department.as_str()), id.clone());
                id
            }
        };

        let criterion_key = (group_id.clone(), row.criterion.as_str());
        let criterion_id = match criteria.get(&criterion_key) {
            Some(id) => id.clone(),
            None => {
                let (next, id) = store::add_criterion(&tree, &group_id, &row.criterion)?;
                tree = next;
                criteria.insert(criterion_key, id.clone());
                id
            }
        };

        let (next, sub_item_id) = store::add_sub_item(
            &tree,
            &group_id,
            &criterion_id,
            SubItemDraft {
                description: row.sub_item.clone(),
                scoring_guide: String::new(),
                scoring_type: row.scoring_type,
                weight: row.weight,
            },
        )?;
        tree = next;

        if row.status == UNSCORED {
            continue;
        }
        let status = if row.status.trim().is_empty() {
            Some(None)
        } else {
            Some(Some(row.scoring_type.parse_status(&row.status)?))
        };
        tree = store::set_score(
            &tree,
            &group_id,
            &criterion_id,
            &sub_item_id,
            ScoreDelta {
                status,
                date: row.date,
                notes: Some(row.notes.clone()),
                evidence: None,
            },
        )?;
    }

    Ok(tree)
}

pub fn build_report(tree: &Snapshot, generated_on: NaiveDate) -> String {
    let summary = stats::summarize(tree);
    let distribution = stats::status_distribution(tree);
    let averages = stats::department_average_score(tree);

    let mut output = String::new();

    let _ = writeln!(output, "# Quality Assessment Report");
    let _ = writeln!(output, "Generated on {}", generated_on);
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "Completion: {:.2}% ({} of {} sub-items scored)",
        summary.completion * 100.0,
        summary.scored,
        summary.total
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Status Mix");

    if distribution.is_empty() {
        let _ = writeln!(output, "No scores recorded yet.");
    } else {
        for (status, count) in distribution.iter() {
            let label = if status.is_empty() { "(unset)" } else { status.as_str() };
            let _ = writeln!(output, "- {}: {}", label, count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Average Score by Department");

    if averages.is_empty() {
        let _ = writeln!(output, "No departments defined.");
    } else {
        for (department, average) in averages.iter() {
            let _ = writeln!(output, "- {}: {:.2}", department, average);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Sub-items");

    let rows = to_export_rows(tree);
    if rows.is_empty() {
        let _ = writeln!(output, "No sub-items defined.");
    } else {
        let _ = writeln!(output, "| Sub-item | Status | Date | Notes |");
        let _ = writeln!(output, "|---|---|---|---|");
        for row in rows.iter() {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} |",
                cell(&row.sub_item),
                cell(&row.status),
                row.date.map(|date| date.to_string()).unwrap_or_default(),
                cell(&row.notes)
            );
        }
    }

    output
}

fn cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScoringType, Status};
    use crate::workbook;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn rows_follow_tree_order_with_unscored_marker() {
        let tree = workbook::seed();
        let rows = to_export_rows(&tree);
        assert_eq!(rows.len(), stats::flatten_sub_items(&tree).count());
        assert_eq!(rows[0].group, tree.groups[0].name);
        assert_eq!(rows[0].status, UNSCORED);
        assert_eq!(rows[0].date, None);

        let scored = rows.iter().find(|row| row.status == "8").unwrap();
        assert_eq!(scored.scoring_type, ScoringType::Scale10);
        assert_eq!(scored.department, "Khoa Ngoại");
        assert_eq!(scored.date, Some(date(2023, 10, 26)));
    }

    #[test]
    fn reimport_reconstructs_rows() {
        let tree = workbook::seed();
        let rows = to_export_rows(&tree);
        let rebuilt = from_export_rows(&rows).unwrap();

        assert_eq!(rebuilt.groups.len(), tree.groups.len());
        assert_eq!(to_export_rows(&rebuilt), rows);
        assert_eq!(stats::completion_ratio(&rebuilt), stats::completion_ratio(&tree));
    }

    #[test]
    fn reimport_rejects_status_outside_scoring_type() {
        let rows = vec![ExportRow {
            group: "A".to_string(),
            department: "Dept1".to_string(),
            criterion: "C1".to_string(),
            sub_item: "desc".to_string(),
            status: "Yes".to_string(),
            date: Some(date(2024, 5, 1)),
            notes: String::new(),
            scoring_type: ScoringType::PassFail,
            weight: 10.0,
        }];
        assert!(from_export_rows(&rows).is_err());
    }

    #[test]
    fn end_to_end_scoring_scenario() {
        let tree = Snapshot::default();
        let (tree, g1) = store::add_group(&tree, "A", "Dept1");
        let (tree, c1) = store::add_criterion(&tree, &g1, "C1").unwrap();
        let (tree, s1) = store::add_sub_item(
            &tree,
            &g1,
            &c1,
            SubItemDraft {
                description: "desc".to_string(),
                scoring_guide: "guide".to_string(),
                scoring_type: ScoringType::PassFail,
                weight: 10.0,
            },
        )
        .unwrap();
        let tree = store::set_score(
            &tree,
            &g1,
            &c1,
            &s1,
            ScoreDelta {
                status: Some(Some(Status::Pass)),
                date: Some(date(2024, 5, 1)),
                ..ScoreDelta::default()
            },
        )
        .unwrap();

        assert_eq!(stats::completion_ratio(&tree), 1.0);
        let distribution = stats::status_distribution(&tree);
        assert_eq!(distribution.len(), 1);
        assert_eq!(distribution.get("Pass"), Some(&1));

        let report = build_report(&tree, date(2024, 5, 2));
        assert!(report.contains("Completion: 100.00% (1 of 1 sub-items scored)"));
        assert!(report.contains("- Pass: 1"));
        assert!(report.contains("- Dept1: 0.00"));
        assert!(report.contains("| desc | Pass | 2024-05-01 |  |"));
    }

    #[test]
    fn report_handles_empty_tree() {
        let report = build_report(&Snapshot::default(), date(2024, 1, 1));
        assert!(report.contains("Completion: 0.00% (0 of 0 sub-items scored)"));
        assert!(report.contains("No scores recorded yet."));
        assert!(report.contains("No sub-items defined."));
    }
}
