//! Target resolution from trigger labels and manual overrides.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{BackportError, Result};

const REFS_HEADS: &str = "refs/heads/";

/// A normalized release branch a merged change should be backported to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Label (or `input:<branch>` for manual overrides) the target came from.
    pub source_label: String,
    pub branch: String,
}

impl Target {
    pub fn new(source_label: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            source_label: source_label.into(),
            branch: branch.into(),
        }
    }
}

/// Extract targets from `label_names` that start with `prefix` (case-insensitive).
///
/// Returns targets deduplicated by normalized branch, in first-seen order.
pub fn collect_targets<S: AsRef<str>>(label_names: &[S], prefix: &str) -> Result<Vec<Target>> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(BackportError::InvalidConfiguration(
            "label prefix cannot be empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut targets = Vec::with_capacity(label_names.len());

    for name in label_names {
        let name = name.as_ref();
        let Some(branch) = parse_branch(name, prefix) else {
            continue;
        };
        if seen.insert(branch.clone()) {
            targets.push(Target::new(name, branch));
        }
    }

    Ok(targets)
}

fn parse_branch(label_name: &str, prefix: &str) -> Option<String> {
    let label_name = label_name.trim();
    if label_name.len() < prefix.len() {
        return None;
    }
    let (head, rest) = label_name.split_at_checked(prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }

    let branch = normalize_branch(rest);
    (!branch.is_empty()).then_some(branch)
}

/// Trim whitespace and surrounding slashes and strip a leading `refs/heads/`.
pub fn normalize_branch(branch: &str) -> String {
    let branch = branch.trim().trim_matches('/');

    let branch = match branch.split_at_checked(REFS_HEADS.len()) {
        Some((head, rest)) if head.eq_ignore_ascii_case(REFS_HEADS) => rest,
        _ => branch,
    };

    branch.trim().trim_matches('/').trim().to_string()
}

/// Reject branch names git would refuse as refs. Never repairs.
pub fn validate_targets(targets: &[Target]) -> Result<()> {
    for target in targets {
        if let Err(reason) = validate_branch_name(&target.branch) {
            return Err(BackportError::InvalidTarget {
                branch: target.branch.clone(),
                label: target.source_label.clone(),
                reason: reason.to_string(),
            });
        }
    }
    Ok(())
}

fn validate_branch_name(branch: &str) -> std::result::Result<(), &'static str> {
    if branch.is_empty() {
        return Err("branch cannot be empty");
    }
    if branch.chars().any(char::is_whitespace) {
        return Err("branch cannot contain whitespace");
    }
    if branch.contains("..") {
        return Err("branch cannot contain '..'");
    }
    if branch.contains(['~', '^', ':', '?', '*', '[', ']', '@', '{', '\\']) {
        return Err("branch contains forbidden git characters");
    }
    Ok(())
}

/// Merge target groups, preserving first-seen order and dropping duplicate branches.
pub fn merge_targets<I>(groups: I) -> Vec<Target>
where
    I: IntoIterator,
    I::Item: IntoIterator<Item = Target>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for group in groups {
        for target in group {
            if seen.insert(target.branch.clone()) {
                merged.push(target);
            }
        }
    }
    merged
}

/// Targets for operator-supplied branches that bypass labels.
pub fn manual_targets<S: AsRef<str>>(branches: &[S]) -> Vec<Target> {
    branches
        .iter()
        .filter_map(|raw| {
            let trimmed = raw.as_ref().trim();
            let branch = normalize_branch(trimmed);
            (!branch.is_empty()).then(|| Target::new(format!("input:{trimmed}"), branch))
        })
        .collect()
}

/// Branch names of `targets`, sorted and deduplicated.
pub fn sorted_branches(targets: &[Target]) -> Vec<String> {
    let mut branches: Vec<String> = targets.iter().map(|t| t.branch.clone()).collect();
    branches.sort();
    branches.dedup();
    branches
}
