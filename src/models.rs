use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// The fixed evaluation scale a sub-item is scored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoringType {
    #[serde(rename = "PASS_FAIL")]
    PassFail,
    #[serde(rename = "SCALE_10")]
    Scale10,
    #[serde(rename = "YES_NO")]
    YesNo,
}

impl ScoringType {
    pub fn options(self) -> Vec<Status> {
        match self {
            ScoringType::PassFail => vec![Status::Pass, Status::Fail],
            ScoringType::Scale10 => (0..=10).map(Status::Points).collect(),
            ScoringType::YesNo => vec![Status::Yes, Status::No],
        }
    }

    pub fn accepts(self, status: Status) -> bool {
        match (self, status) {
            (ScoringType::PassFail, Status::Pass | Status::Fail) => true,
            (ScoringType::Scale10, Status::Points(points)) => points <= 10,
            (ScoringType::YesNo, Status::Yes | Status::No) => true,
            _ => false,
        }
    }

    /// Parses a status as entered by an evaluator, e.g. `pass` or `7`.
    pub fn parse_status(self, raw: &str) -> Result<Status, Error> {
        let invalid = || Error::InvalidStatus {
            value: raw.to_string(),
            scoring_type: self,
        };
        let status = Status::from_str(raw).map_err(|_| invalid())?;
        if self.accepts(status) {
            Ok(status)
        } else {
            Err(invalid())
        }
    }
}

impl fmt::Display for ScoringType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ScoringType::PassFail => "PASS_FAIL",
            ScoringType::Scale10 => "SCALE_10",
            ScoringType::YesNo => "YES_NO",
        };
        f.write_str(label)
    }
}

impl FromStr for ScoringType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "PASS_FAIL" => Ok(ScoringType::PassFail),
            "SCALE_10" => Ok(ScoringType::Scale10),
            "YES_NO" => Ok(ScoringType::YesNo),
            _ => Err(Error::UnknownScoringType(s.to_string())),
        }
    }
}

/// A recorded outcome. Serialized as a string label or a bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "StatusValue", try_from = "StatusValue")]
pub enum Status {
    Pass,
    Fail,
    Yes,
    No,
    Points(u8),
}

impl Status {
    pub fn points(self) -> Option<u8> {
        match self {
            Status::Points(points) => Some(points),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pass => f.write_str("Pass"),
            Status::Fail => f.write_str("Fail"),
            Status::Yes => f.write_str("Yes"),
            Status::No => f.write_str("No"),
            Status::Points(points) => write!(f, "{points}"),
        }
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(points) = trimmed.parse::<u8>() {
            return Ok(Status::Points(points));
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "pass" => Ok(Status::Pass),
            "fail" => Ok(Status::Fail),
            "yes" => Ok(Status::Yes),
            "no" => Ok(Status::No),
            _ => Err(Error::UnknownStatus(s.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StatusValue {
    Points(u8),
    Label(String),
}

impl From<Status> for StatusValue {
    fn from(status: Status) -> Self {
        match status {
            Status::Points(points) => StatusValue::Points(points),
            other => StatusValue::Label(other.to_string()),
        }
    }
}

impl TryFrom<StatusValue> for Status {
    type Error = Error;

    fn try_from(value: StatusValue) -> Result<Self, Self::Error> {
        match value {
            StatusValue::Points(points) => Ok(Status::Points(points)),
            StatusValue::Label(label) => label.parse(),
        }
    }
}

/// A supporting attachment. `url` only locates the content; bytes live elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub media_type: String,
    pub url: String,
}

impl Evidence {
    pub fn new(
        name: impl Into<String>,
        media_type: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Evidence {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            media_type: media_type.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    #[serde(default)]
    pub status: Option<Status>,
    pub date: NaiveDate,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
}

impl Default for Score {
    /// Unset status dated today, used when an unscored item is first edited.
    fn default() -> Self {
        Score {
            status: None,
            date: Utc::now().date_naive(),
            notes: String::new(),
            evidence: Vec::new(),
        }
    }
}

impl Score {
    pub fn apply(&self, delta: ScoreDelta) -> Score {
        Score {
            status: match delta.status {
                Some(status) => status,
                None => self.status,
            },
            date: delta.date.unwrap_or(self.date),
            notes: delta.notes.unwrap_or_else(|| self.notes.clone()),
            evidence: delta.evidence.unwrap_or_else(|| self.evidence.clone()),
        }
    }
}

/// Partial score update: `None` fields keep their previous value.
///
/// `status: Some(None)` clears the status back to unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreDelta {
    pub status: Option<Option<Status>>,
    pub date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub evidence: Option<Vec<Evidence>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubItem {
    pub id: String,
    pub description: String,
    pub scoring_guide: String,
    pub scoring_type: ScoringType,
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
}

impl SubItem {
    pub fn is_scored(&self) -> bool {
        self.score.is_some()
    }
}

/// Fields supplied when creating a sub-item; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct SubItemDraft {
    pub description: String,
    pub scoring_guide: String,
    pub scoring_type: ScoringType,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sub_items: Vec<Arc<SubItem>>,
}

impl Criterion {
    pub fn with_sub_items(&self, sub_items: Vec<Arc<SubItem>>) -> Criterion {
        Criterion {
            id: self.id.clone(),
            name: self.name.clone(),
            sub_items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionGroup {
    pub id: String,
    pub name: String,
    pub department: String,
    #[serde(default)]
    pub criteria: Vec<Arc<Criterion>>,
}

impl CriterionGroup {
    pub fn with_criteria(&self, criteria: Vec<Arc<Criterion>>) -> CriterionGroup {
        CriterionGroup {
            id: self.id.clone(),
            name: self.name.clone(),
            department: self.department.clone(),
            criteria,
        }
    }
}

/// An immutable view of the whole hierarchy. Cloning only bumps reference counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub groups: Vec<Arc<CriterionGroup>>,
}

impl Snapshot {
    pub fn group(&self, group_id: &str) -> Option<&CriterionGroup> {
        self.groups
            .iter()
            .find(|group| group.id == group_id)
            .map(Arc::as_ref)
    }

    pub fn criterion(&self, group_id: &str, criterion_id: &str) -> Option<&Criterion> {
        self.group(group_id)?
            .criteria
            .iter()
            .find(|criterion| criterion.id == criterion_id)
            .map(Arc::as_ref)
    }

    pub fn sub_item(
        &self,
        group_id: &str,
        criterion_id: &str,
        sub_item_id: &str,
    ) -> Option<&SubItem> {
        self.criterion(group_id, criterion_id)?
            .sub_items
            .iter()
            .find(|sub_item| sub_item.id == sub_item_id)
            .map(Arc::as_ref)
    }

    /// True when no group was replaced, added or removed between the two snapshots.
    pub fn ptr_eq(&self, other: &Snapshot) -> bool {
        self.groups.len() == other.groups.len()
            && self
                .groups
                .iter()
                .zip(other.groups.iter())
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }

    /// True when `group_id` is the same allocation in both snapshots.
    pub fn shares_group_with(&self, other: &Snapshot, group_id: &str) -> bool {
        let mine = self.groups.iter().find(|group| group.id == group_id);
        let theirs = other.groups.iter().find(|group| group.id == group_id);
        match (mine, theirs) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub group: String,
    pub department: String,
    pub criterion: String,
    pub sub_item: String,
    pub status: String,
    pub date: Option<NaiveDate>,
    pub notes: String,
    pub scoring_type: ScoringType,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub total: usize,
    pub scored: usize,
    pub completion: f64,
}
