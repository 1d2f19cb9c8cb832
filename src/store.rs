//! Structural edits over a [`Snapshot`].
//!
//! Every operation takes the current snapshot by reference and returns a new
//! one. Only the path from the root to the edited node is rebuilt; every other
//! group, criterion and sub-item is shared with the input.
//!
//! Updates and deletes addressed at an id that does not exist leave the tree
//! unchanged. Adds (including evidence) fail with [`Error::ParentNotFound`]
//! when their parent path does not resolve.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    Criterion, CriterionGroup, Evidence, ScoreDelta, Snapshot, SubItem, SubItemDraft,
};

fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

fn unchanged(tree: &Snapshot, edited: Option<Snapshot>, target: &str) -> Snapshot {
    match edited {
        Some(next) => next,
        None => {
            warn!(target_id = target, "no matching node, snapshot left unchanged");
            tree.clone()
        }
    }
}

fn edit_group<F>(tree: &Snapshot, group_id: &str, edit: F) -> Result<Option<Snapshot>>
where
    F: FnOnce(&CriterionGroup) -> Result<Option<CriterionGroup>>,
{
    let Some(index) = tree.groups.iter().position(|group| group.id == group_id) else {
        return Ok(None);
    };
    let Some(group) = edit(&tree.groups[index])? else {
        return Ok(None);
    };
    let mut groups = tree.groups.clone();
    groups[index] = Arc::new(group);
    Ok(Some(Snapshot { groups }))
}

fn edit_criterion<F>(
    tree: &Snapshot,
    group_id: &str,
    criterion_id: &str,
    edit: F,
) -> Result<Option<Snapshot>>
where
    F: FnOnce(&Criterion) -> Result<Option<Criterion>>,
{
    edit_group(tree, group_id, |group| {
        let Some(index) = group
            .criteria
            .iter()
            .position(|criterion| criterion.id == criterion_id)
        else {
            return Ok(None);
        };
        let Some(criterion) = edit(&group.criteria[index])? else {
            return Ok(None);
        };
        let mut criteria = group.criteria.clone();
        criteria[index] = Arc::new(criterion);
        Ok(Some(group.with_criteria(criteria)))
    })
}

fn edit_sub_item<F>(
    tree: &Snapshot,
    group_id: &str,
    criterion_id: &str,
    sub_item_id: &str,
    edit: F,
) -> Result<Option<Snapshot>>
where
    F: FnOnce(&SubItem) -> Result<Option<SubItem>>,
{
    edit_criterion(tree, group_id, criterion_id, |criterion| {
        let Some(index) = criterion
            .sub_items
            .iter()
            .position(|sub_item| sub_item.id == sub_item_id)
        else {
            return Ok(None);
        };
        let Some(sub_item) = edit(&criterion.sub_items[index])? else {
            return Ok(None);
        };
        let mut sub_items = criterion.sub_items.clone();
        sub_items[index] = Arc::new(sub_item);
        Ok(Some(criterion.with_sub_items(sub_items)))
    })
}

pub fn add_group(tree: &Snapshot, name: &str, department: &str) -> (Snapshot, String) {
    let id = new_id("group");
    let mut groups = tree.groups.clone();
    groups.push(Arc::new(CriterionGroup {
        id: id.clone(),
        name: name.to_string(),
        department: department.to_string(),
        criteria: Vec::new(),
    }));
    debug!(group_id = %id, "group added");
    (Snapshot { groups }, id)
}

pub fn update_group(tree: &Snapshot, group_id: &str, name: &str, department: &str) -> Snapshot {
    let edited = edit_group(tree, group_id, |group| {
        Ok(Some(CriterionGroup {
            name: name.to_string(),
            department: department.to_string(),
            ..group.clone()
        }))
    });
    // The edit closure never fails.
    unchanged(tree, edited.unwrap_or(None), group_id)
}

pub fn delete_group(tree: &Snapshot, group_id: &str) -> Snapshot {
    if tree.group(group_id).is_none() {
        return unchanged(tree, None, group_id);
    }
    let groups = tree
        .groups
        .iter()
        .filter(|group| group.id != group_id)
        .cloned()
        .collect();
    debug!(group_id, "group deleted");
    Snapshot { groups }
}

pub fn add_criterion(tree: &Snapshot, group_id: &str, name: &str) -> Result<(Snapshot, String)> {
    let id = new_id("criterion");
    let next = edit_group(tree, group_id, |group| {
        let mut criteria = group.criteria.clone();
        criteria.push(Arc::new(Criterion {
            id: id.clone(),
            name: name.to_string(),
            sub_items: Vec::new(),
        }));
        Ok(Some(group.with_criteria(criteria)))
    })?
    .ok_or_else(|| Error::ParentNotFound(group_id.to_string()))?;
    debug!(group_id, criterion_id = %id, "criterion added");
    Ok((next, id))
}

pub fn update_criterion(
    tree: &Snapshot,
    group_id: &str,
    criterion_id: &str,
    name: &str,
) -> Snapshot {
    let edited = edit_criterion(tree, group_id, criterion_id, |criterion| {
        Ok(Some(Criterion {
            name: name.to_string(),
            ..criterion.clone()
        }))
    });
    unchanged(tree, edited.unwrap_or(None), criterion_id)
}

pub fn delete_criterion(tree: &Snapshot, group_id: &str, criterion_id: &str) -> Snapshot {
    let edited = edit_group(tree, group_id, |group| {
        if !group.criteria.iter().any(|criterion| criterion.id == criterion_id) {
            return Ok(None);
        }
        let criteria = group
            .criteria
            .iter()
            .filter(|criterion| criterion.id != criterion_id)
            .cloned()
            .collect();
        Ok(Some(group.with_criteria(criteria)))
    });
    unchanged(tree, edited.unwrap_or(None), criterion_id)
}

pub fn add_sub_item(
    tree: &Snapshot,
    group_id: &str,
    criterion_id: &str,
    draft: SubItemDraft,
) -> Result<(Snapshot, String)> {
    let id = new_id("sub");
    let next = edit_criterion(tree, group_id, criterion_id, |criterion| {
        let mut sub_items = criterion.sub_items.clone();
        sub_items.push(Arc::new(SubItem {
            id: id.clone(),
            description: draft.description,
            scoring_guide: draft.scoring_guide,
            scoring_type: draft.scoring_type,
            weight: draft.weight,
            score: None,
        }));
        Ok(Some(criterion.with_sub_items(sub_items)))
    })?
    .ok_or_else(|| Error::ParentNotFound(format!("{group_id}/{criterion_id}")))?;
    debug!(group_id, criterion_id, sub_item_id = %id, "sub-item added");
    Ok((next, id))
}

/// Replaces the sub-item with the same id as `sub_item`.
///
/// Fails with [`Error::IncompatibleScoreState`] when the replacement carries a
/// status its scoring type does not accept, which is what happens when the
/// scoring type is changed on an item that was already scored.
pub fn update_sub_item(
    tree: &Snapshot,
    group_id: &str,
    criterion_id: &str,
    sub_item: SubItem,
) -> Result<Snapshot> {
    let sub_item_id = sub_item.id.clone();
    let edited = edit_sub_item(tree, group_id, criterion_id, &sub_item_id, |_| {
        let status = sub_item.score.as_ref().and_then(|score| score.status);
        if let Some(status) = status {
            if !sub_item.scoring_type.accepts(status) {
                return Err(Error::IncompatibleScoreState {
                    sub_item: sub_item.id.clone(),
                    status,
                    scoring_type: sub_item.scoring_type,
                });
            }
        }
        Ok(Some(sub_item))
    })?;
    Ok(unchanged(tree, edited, &sub_item_id))
}

pub fn delete_sub_item(
    tree: &Snapshot,
    group_id: &str,
    criterion_id: &str,
    sub_item_id: &str,
) -> Snapshot {
    let edited = edit_criterion(tree, group_id, criterion_id, |criterion| {
        if !criterion.sub_items.iter().any(|sub_item| sub_item.id == sub_item_id) {
            return Ok(None);
        }
        let sub_items = criterion
            .sub_items
            .iter()
            .filter(|sub_item| sub_item.id != sub_item_id)
            .cloned()
            .collect();
        Ok(Some(criterion.with_sub_items(sub_items)))
    });
    unchanged(tree, edited.unwrap_or(None), sub_item_id)
}

/// Merges `delta` over the existing score, or over a blank score dated today.
pub fn set_score(
    tree: &Snapshot,
    group_id: &str,
    criterion_id: &str,
    sub_item_id: &str,
    delta: ScoreDelta,
) -> Result<Snapshot> {
    let edited = edit_sub_item(tree, group_id, criterion_id, sub_item_id, |sub_item| {
        if let Some(Some(status)) = delta.status {
            if !sub_item.scoring_type.accepts(status) {
                return Err(Error::InvalidStatus {
                    value: status.to_string(),
                    scoring_type: sub_item.scoring_type,
                });
            }
        }
        let score = sub_item.score.clone().unwrap_or_default().apply(delta);
        Ok(Some(SubItem {
            score: Some(score),
            ..sub_item.clone()
        }))
    })?;
    Ok(unchanged(tree, edited, sub_item_id))
}

pub fn add_evidence(
    tree: &Snapshot,
    group_id: &str,
    criterion_id: &str,
    sub_item_id: &str,
    evidence: Evidence,
) -> Result<Snapshot> {
    let evidence_id = evidence.id.clone();
    let next = edit_sub_item(tree, group_id, criterion_id, sub_item_id, |sub_item| {
        let mut score = sub_item.score.clone().unwrap_or_default();
        if score.evidence.iter().any(|existing| existing.id == evidence.id) {
            return Err(Error::DuplicateEvidence(evidence.id));
        }
        score.evidence.push(evidence);
        Ok(Some(SubItem {
            score: Some(score),
            ..sub_item.clone()
        }))
    })?
    .ok_or_else(|| {
        Error::ParentNotFound(format!("{group_id}/{criterion_id}/{sub_item_id}"))
    })?;
    debug!(sub_item_id, evidence_id = %evidence_id, "evidence attached");
    Ok(next)
}

pub fn remove_evidence(
    tree: &Snapshot,
    group_id: &str,
    criterion_id: &str,
    sub_item_id: &str,
    evidence_id: &str,
) -> Snapshot {
    let edited = edit_sub_item(tree, group_id, criterion_id, sub_item_id, |sub_item| {
        let Some(score) = &sub_item.score else {
            return Ok(None);
        };
        if !score.evidence.iter().any(|evidence| evidence.id == evidence_id) {
            return Ok(None);
        }
        let mut score = score.clone();
        score.evidence.retain(|evidence| evidence.id != evidence_id);
        Ok(Some(SubItem {
            score: Some(score),
            ..sub_item.clone()
        }))
    });
    unchanged(tree, edited.unwrap_or(None), evidence_id)
}
