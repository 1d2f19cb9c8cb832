use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use tracing::info;

use crate::error::Error;
use crate::models::{
    Criterion, CriterionGroup, ExportRow, Score, ScoringType, Snapshot, Status, SubItem,
};
use crate::stats;

pub fn load(path: &Path) -> anyhow::Result<Snapshot> {
    if !path.exists() {
        info!(path = %path.display(), "workbook not found, starting empty");
        return Ok(Snapshot::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read workbook {}", path.display()))?;
    let tree = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse workbook {}", path.display()))?;
    check_statuses(&tree)
        .with_context(|| format!("inconsistent score in workbook {}", path.display()))?;
    Ok(tree)
}

/// Rejects any recorded status that its sub-item's scoring type does not accept.
fn check_statuses(tree: &Snapshot) -> crate::error::Result<()> {
    for (_, _, item) in stats::walk(tree) {
        let status = item.score.as_ref().and_then(|score| score.status);
        if let Some(status) = status {
            if !item.scoring_type.accepts(status) {
                return Err(Error::InvalidStatus {
                    value: status.to_string(),
                    scoring_type: item.scoring_type,
                });
            }
        }
    }
    Ok(())
}

pub fn save(path: &Path, tree: &Snapshot) -> anyhow::Result<()> {
    let raw = serde_json::to_string_pretty(tree)?;
    std::fs::write(path, raw)
        .with_context(|| format!("failed to write workbook {}", path.display()))?;
    info!(path = %path.display(), groups = tree.groups.len(), "workbook saved");
    Ok(())
}

pub fn export_csv(path: &Path, rows: &[ExportRow]) -> anyhow::Result<usize> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(rows.len())
}

pub fn import_csv(path: &Path) -> anyhow::Result<Vec<ExportRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<ExportRow>().enumerate() {
        let row = result
            .with_context(|| format!("invalid row {} in {}", index + 1, path.display()))?;
        rows.push(row);
    }

    Ok(rows)
}

fn sub_item(
    id: &str,
    description: &str,
    scoring_guide: &str,
    scoring_type: ScoringType,
    weight: f64,
    score: Option<Score>,
) -> Arc<SubItem> {
    Arc::new(SubItem {
        id: id.to_string(),
        description: description.to_string(),
        scoring_guide: scoring_guide.to_string(),
        scoring_type,
        weight,
        score,
    })
}

/// Sample hospital assessment: two departments, four sub-items, one scored.
pub fn seed() -> Snapshot {
    let records = Arc::new(Criterion {
        id: "criterion-1-1".to_string(),
        name: "Quản lý hồ sơ bệnh án".to_string(),
        sub_items: vec![
            sub_item(
                "sub-1-1-1",
                "Hồ sơ được điền đầy đủ thông tin hành chính.",
                "Kiểm tra các trường thông tin bắt buộc.",
                ScoringType::PassFail,
                10.0,
                None,
            ),
            sub_item(
                "sub-1-1-2",
                "Chữ ký bác sĩ và dấu mộc hợp lệ.",
                "Đối chiếu chữ ký và mộc với mẫu đã đăng ký.",
                ScoringType::YesNo,
                5.0,
                None,
            ),
        ],
    });

    let hand_hygiene = Arc::new(Criterion {
        id: "criterion-2-1".to_string(),
        name: "Tuân thủ quy trình rửa tay".to_string(),
        sub_items: vec![sub_item(
            "sub-2-1-1",
            "Thực hiện rửa tay trước khi tiếp xúc bệnh nhân.",
            "Quan sát trực tiếp.",
            ScoringType::PassFail,
            15.0,
            None,
        )],
    });

    let communication = Arc::new(Criterion {
        id: "criterion-2-2".to_string(),
        name: "Giao tiếp với người bệnh".to_string(),
        sub_items: vec![sub_item(
            "sub-2-2-1",
            "Thái độ giao tiếp thân thiện, tôn trọng.",
            "Đánh giá dựa trên phản hồi của người bệnh và quan sát.",
            ScoringType::Scale10,
            10.0,
            Some(Score {
                status: Some(Status::Points(8)),
                date: NaiveDate::from_ymd_opt(2023, 10, 26).unwrap_or_default(),
                notes: "Giao tiếp tốt, cần phát huy.".to_string(),
                evidence: Vec::new(),
            }),
        )],
    });

    Snapshot {
        groups: vec![
            Arc::new(CriterionGroup {
                id: "group-1".to_string(),
                name: "Nhóm A – Quản trị & Vận hành".to_string(),
                department: "Khoa Nội".to_string(),
                criteria: vec![records],
            }),
            Arc::new(CriterionGroup {
                id: "group-2".to_string(),
                name: "Nhóm B – Chăm sóc người bệnh".to_string(),
                department: "Khoa Ngoại".to_string(),
                criteria: vec![hand_hygiene, communication],
            }),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Evidence;
    use crate::{report, stats, store};

    #[test]
    fn seed_has_expected_shape() {
        let tree = seed();
        assert_eq!(tree.groups.len(), 2);
        assert_eq!(stats::flatten_sub_items(&tree).count(), 4);
        assert_eq!(stats::completion_ratio(&tree), 0.25);
        let averages = stats::department_average_score(&tree);
        assert_eq!(averages.get("Khoa Ngoại"), Some(&8.0));
        assert_eq!(averages.get("Khoa Nội"), Some(&0.0));
    }

    #[test]
    fn missing_workbook_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tree = load(&dir.path().join("absent.json")).unwrap();
        assert!(tree.groups.is_empty());
    }

    #[test]
    fn workbook_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workbook.json");
        let tree = store::add_evidence(
            &seed(),
            "group-2",
            "criterion-2-2",
            "sub-2-2-1",
            Evidence::new("photo.jpg", "image/jpeg", "blob:photo"),
        )
        .unwrap();

        save(&path, &tree).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, tree);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"SCALE_10\""));
        assert!(raw.contains("\"type\": \"image/jpeg\""));
    }

    #[test]
    fn out_of_range_status_in_workbook_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workbook.json");
        save(&path, &seed()).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"status\": 8"));
        std::fs::write(&path, raw.replace("\"status\": 8", "\"status\": 42")).unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidStatus { .. })
        ));
    }

    #[test]
    fn status_from_another_scoring_type_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workbook.json");
        save(&path, &seed()).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, raw.replace("\"status\": 8", "\"status\": \"Pass\"")).unwrap();

        assert!(load(&path).is_err());
    }

    #[test]
    fn corrupt_workbook_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load(&path).is_err());
    }

    #[test]
    fn csv_export_reimports_the_same_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let rows = report::to_export_rows(&seed());

        let written = export_csv(&path, &rows).unwrap();
        assert_eq!(written, 4);

        let imported = import_csv(&path).unwrap();
        assert_eq!(imported, rows);
    }
}
