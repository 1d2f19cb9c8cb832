use std::collections::BTreeMap;

use crate::models::{Criterion, CriterionGroup, ScoringType, Snapshot, SubItem, Summary};

/// Walks every sub-item in tree order together with its owning group and criterion.
pub fn walk(tree: &Snapshot) -> impl Iterator<Item = (&CriterionGroup, &Criterion, &SubItem)> + '_ {
    tree.groups.iter().flat_map(|group| {
        group.criteria.iter().flat_map(move |criterion| {
            criterion
                .sub_items
                .iter()
                .map(move |sub_item| (group.as_ref(), criterion.as_ref(), sub_item.as_ref()))
        })
    })
}

pub fn flatten_sub_items(tree: &Snapshot) -> impl Iterator<Item = &SubItem> + '_ {
    walk(tree).map(|(_, _, sub_item)| sub_item)
}

pub fn completion_ratio(tree: &Snapshot) -> f64 {
    summarize(tree).completion
}

pub fn summarize(tree: &Snapshot) -> Summary {
    let (total, scored) = flatten_sub_items(tree).fold((0usize, 0usize), |(total, scored), item| {
        (total + 1, scored + usize::from(item.is_scored()))
    });
    Summary {
        total,
        scored,
        completion: if total == 0 {
            0.0
        } else {
            scored as f64 / total as f64
        },
    }
}

/// Counts scored sub-items by status. An unset status is counted under `""`.
pub fn status_distribution(tree: &Snapshot) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for score in flatten_sub_items(tree).filter_map(|item| item.score.as_ref()) {
        let key = score.status.map(|status| status.to_string()).unwrap_or_default();
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// Average SCALE_10 score per department, rounded to two decimals.
///
/// Groups sharing a department name are pooled. Departments without any
/// scored SCALE_10 item report `0.0`.
pub fn department_average_score(tree: &Snapshot) -> BTreeMap<String, f64> {
    let mut totals: BTreeMap<String, (u32, usize)> = BTreeMap::new();

    for group in tree.groups.iter() {
        let entry = totals.entry(group.department.clone()).or_insert((0, 0));
        let scored = group
            .criteria
            .iter()
            .flat_map(|criterion| criterion.sub_items.iter())
            .filter(|item| item.scoring_type == ScoringType::Scale10)
            .filter_map(|item| item.score.as_ref());
        for score in scored {
            entry.0 += score.status.and_then(|status| status.points()).unwrap_or(0) as u32;
            entry.1 += 1;
        }
    }

    totals
        .into_iter()
        .map(|(department, (total, count))| {
            let average = if count == 0 {
                0.0
            } else {
                round2(total as f64 / count as f64)
            };
            (department, average)
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::*;
    use crate::models::{Score, Status};

    fn sub_item(
        id: &str,
        scoring_type: ScoringType,
        status: Option<Option<Status>>,
    ) -> Arc<SubItem> {
        Arc::new(SubItem {
            id: id.to_string(),
            description: format!("item {id}"),
            scoring_guide: String::new(),
            scoring_type,
            weight: 1.0,
            score: status.map(|status| Score {
                status,
                date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                notes: String::new(),
                evidence: Vec::new(),
            }),
        })
    }

    fn group(id: &str, department: &str, sub_items: Vec<Arc<SubItem>>) -> Arc<CriterionGroup> {
        Arc::new(CriterionGroup {
            id: id.to_string(),
            name: format!("group {id}"),
            department: department.to_string(),
            criteria: vec![Arc::new(Criterion {
                id: format!("{id}-c"),
                name: "criterion".to_string(),
                sub_items,
            })],
        })
    }

    #[test]
    fn empty_tree_has_zero_completion() {
        let tree = Snapshot::default();
        assert_eq!(completion_ratio(&tree), 0.0);
        assert!(status_distribution(&tree).is_empty());
        assert!(department_average_score(&tree).is_empty());
    }

    #[test]
    fn completion_counts_scored_items() {
        let tree = Snapshot {
            groups: vec![
                group(
                    "g1",
                    "Khoa Nội",
                    vec![
                        sub_item("a", ScoringType::PassFail, Some(Some(Status::Pass))),
                        sub_item("b", ScoringType::PassFail, Some(Some(Status::Fail))),
                    ],
                ),
                group(
                    "g2",
                    "Khoa Ngoại",
                    vec![
                        sub_item("c", ScoringType::YesNo, Some(Some(Status::Yes))),
                        sub_item("d", ScoringType::YesNo, None),
                    ],
                ),
            ],
        };
        assert_eq!(completion_ratio(&tree), 0.75);
        let summary = summarize(&tree);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.scored, 3);
    }

    #[test]
    fn flatten_follows_tree_order_and_restarts() {
        let tree = Snapshot {
            groups: vec![
                group("g1", "A", vec![sub_item("a", ScoringType::PassFail, None)]),
                group("g2", "B", vec![sub_item("b", ScoringType::PassFail, None)]),
            ],
        };
        let first: Vec<&str> = flatten_sub_items(&tree).map(|item| item.id.as_str()).collect();
        let second: Vec<&str> = flatten_sub_items(&tree).map(|item| item.id.as_str()).collect();
        assert_eq!(first, vec!["a", "b"]);
        assert_eq!(first, second);
    }

    #[test]
    fn distribution_skips_unscored_and_keeps_unset() {
        let tree = Snapshot {
            groups: vec![group(
                "g1",
                "A",
                vec![
                    sub_item("a", ScoringType::PassFail, Some(Some(Status::Pass))),
                    sub_item("b", ScoringType::PassFail, Some(Some(Status::Pass))),
                    sub_item("c", ScoringType::Scale10, Some(Some(Status::Points(8)))),
                    sub_item("d", ScoringType::YesNo, Some(None)),
                    sub_item("e", ScoringType::YesNo, None),
                ],
            )],
        };
        let counts = status_distribution(&tree);
        assert_eq!(counts.get("Pass"), Some(&2));
        assert_eq!(counts.get("8"), Some(&1));
        assert_eq!(counts.get(""), Some(&1));
        assert_eq!(counts.values().sum::<usize>(), 4);
    }

    fn points(id: &str, value: u8) -> Arc<SubItem> {
        sub_item(id, ScoringType::Scale10, Some(Some(Status::Points(value))))
    }

    #[test]
    fn department_average_pools_groups_by_name() {
        let tree = Snapshot {
            groups: vec![
                group("g1", "Khoa Nội", vec![points("a", 8)]),
                group("g2", "Khoa Nội", vec![points("b", 6)]),
                group(
                    "g3",
                    "Khoa Ngoại",
                    vec![sub_item("c", ScoringType::PassFail, Some(Some(Status::Pass)))],
                ),
            ],
        };
        let averages = department_average_score(&tree);
        assert_eq!(averages.get("Khoa Nội"), Some(&7.0));
        assert_eq!(averages.get("Khoa Ngoại"), Some(&0.0));
    }

    #[test]
    fn department_average_rounds_to_two_decimals() {
        let tree = Snapshot {
            groups: vec![group(
                "g1",
                "Khoa Nhi",
                vec![
                    sub_item("a", ScoringType::Scale10, Some(Some(Status::Points(10)))),
                    sub_item("b", ScoringType::Scale10, Some(Some(Status::Points(9)))),
                    sub_item("c", ScoringType::Scale10, Some(Some(Status::Points(9)))),
                    sub_item("d", ScoringType::Scale10, None),
                ],
            )],
        };
        assert_eq!(department_average_score(&tree).get("Khoa Nhi"), Some(&9.33));
    }
}
