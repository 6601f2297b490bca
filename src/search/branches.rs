use anyhow::Result;
use std::collections::HashMap;

use crate::git::{BranchRef, ObjectStore, ISSUES_BRANCH};
use crate::models::RepositoryModel;

/// Commit id → names of the annotated tags pointing at it.
pub type TagMap = HashMap<String, Vec<String>>;

pub fn tag_map(store: &dyn ObjectStore) -> Result<TagMap> {
    let mut tags: TagMap = HashMap::new();
    for tag in store.annotated_tags()? {
        tags.entry(tag.target).or_default().push(tag.name);
    }
    for names in tags.values_mut() {
        names.sort();
    }
    Ok(tags)
}

/// The local branches `repo` wants indexed, most recently changed first with
/// the default branch forced to the front.
///
/// A wanted entry matches a branch by full name (`refs/heads/x`) or short name
/// (`x`); `default` matches whatever branch HEAD resolves to. The issues branch
/// is only appended when `include_issues` is set.
pub fn indexed_branches(
    store: &dyn ObjectStore,
    repo: &RepositoryModel,
    include_issues: bool,
) -> Result<Vec<BranchRef>> {
    let default = store.default_branch()?;
    let wants_default = repo
        .indexed_branches
        .iter()
        .any(|b| b.eq_ignore_ascii_case("default"));

    let mut branches: Vec<BranchRef> = store
        .local_branches()?
        .into_iter()
        .filter(|b| b.name != ISSUES_BRANCH)
        .filter(|b| {
            (wants_default && default.as_deref() == Some(b.name.as_str()))
                || repo
                    .indexed_branches
                    .iter()
                    .any(|wanted| *wanted == b.name || wanted == b.short_name())
        })
        .collect();

    branches.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.name.cmp(&b.name)));
    if let Some(default) = default {
        if let Some(pos) = branches.iter().position(|b| b.name == default) {
            let branch = branches.remove(pos);
            branches.insert(0, branch);
        }
    }

    if include_issues {
        if let Some(issues) = store.issues_branch()? {
            branches.push(issues);
        }
    }
    Ok(branches)
}
