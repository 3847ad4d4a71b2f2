//! Entity identity resolution
//!
//! Computes the stable identifier joining config history, state references,
//! and plan artifacts for one provisioned resource set. The id is recomputed
//! on every invocation and never stored as its own entity.
//!
//! Two schemes exist because history has been written under two hashing
//! generations: the current scheme folds branch and normalized source path
//! into a digest, the legacy scheme predates that component. Lookups consult
//! the ordered candidate list so records written under the old scheme are
//! still found.

use sha2::{Digest, Sha256};

use crate::types::EntityId;

/// Separator between the identifier body and the workspace suffix.
/// Hex digits and the id charset never contain it, so it cannot collide.
const WORKSPACE_SEPARATOR: char = '#';

/// Number of hex characters kept from the branch/path digest
const DIGEST_LEN: usize = 16;

/// Inputs to entity identity resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityScope<'a> {
    pub provisioner_id: &'a str,
    pub environment_id: &'a str,
    pub branch: &'a str,
    pub path: &'a str,
    pub workspace: Option<&'a str>,
}

/// Resolver strategies, ordered newest scheme first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityScheme {
    /// Current: base + digest of (branch, normalized path) + workspace
    BranchPathHash,
    /// Legacy: base + workspace, no digest component
    Legacy,
}

impl IdentityScheme {
    /// All schemes in lookup order (current first)
    pub fn lookup_order() -> [IdentityScheme; 2] {
        [IdentityScheme::BranchPathHash, IdentityScheme::Legacy]
    }
}

/// Resolve the entity id under one scheme. Pure and deterministic: identical
/// inputs always produce the identical id.
pub fn resolve(scope: &EntityScope<'_>, scheme: IdentityScheme) -> EntityId {
    let mut id = format!("{}-{}", scope.provisioner_id, scope.environment_id);

    if scheme == IdentityScheme::BranchPathHash {
        if let Some(normalized) = normalize_path(scope.path) {
            id.push('-');
            id.push_str(&branch_path_digest(scope.branch, &normalized));
        }
    }

    match scope.workspace {
        Some(workspace) if !workspace.is_empty() => {
            id.push(WORKSPACE_SEPARATOR);
            id.push_str(workspace);
        }
        _ => {}
    }

    id
}

/// All candidate ids for lookup, current scheme first, deduplicated.
/// History queries try each in order until one yields records.
pub fn candidates(scope: &EntityScope<'_>) -> Vec<EntityId> {
    let mut ids = Vec::with_capacity(2);
    for scheme in IdentityScheme::lookup_order() {
        let id = resolve(scope, scheme);
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// Lexical normalization toward an absolute-ish stable form: strips `.`
/// components, resolves `..` where possible, collapses separators. Returns
/// None when nothing meaningful remains, in which case the digest component
/// is omitted entirely.
fn normalize_path(path: &str) -> Option<String> {
    let mut components: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            other => components.push(other),
        }
    }

    if components.is_empty() {
        return None;
    }
    Some(format!("/{}", components.join("/")))
}

fn branch_path_digest(branch: &str, normalized_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(branch.as_bytes());
    hasher.update(b"\n");
    hasher.update(normalized_path.as_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(DIGEST_LEN);
    for byte in digest.iter().take(DIGEST_LEN / 2) {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope<'a>(path: &'a str, workspace: Option<&'a str>) -> EntityScope<'a> {
        EntityScope {
            provisioner_id: "prov-1",
            environment_id: "env-1",
            branch: "main",
            path,
            workspace,
        }
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let a = resolve(&scope("infra/network", None), IdentityScheme::BranchPathHash);
        let b = resolve(&scope("infra/network", None), IdentityScheme::BranchPathHash);
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_paths_produce_distinct_ids() {
        let a = resolve(&scope("infra/network", None), IdentityScheme::BranchPathHash);
        let b = resolve(&scope("infra/compute", None), IdentityScheme::BranchPathHash);
        assert_ne!(a, b);
    }

    #[test]
    fn test_path_normalization_is_stable_across_spellings() {
        let a = resolve(
            &scope("./infra//network/", None),
            IdentityScheme::BranchPathHash,
        );
        let b = resolve(&scope("infra/network", None), IdentityScheme::BranchPathHash);
        assert_eq!(a, b);
    }

    #[test]
    fn test_legacy_scheme_omits_digest() {
        let legacy = resolve(&scope("infra/network", None), IdentityScheme::Legacy);
        assert_eq!(legacy, "prov-1-env-1");

        let current = resolve(&scope("infra/network", None), IdentityScheme::BranchPathHash);
        assert!(current.starts_with("prov-1-env-1-"));
        assert_ne!(current, legacy);
    }

    #[test]
    fn test_workspace_appended_with_separator() {
        let id = resolve(
            &scope("infra/network", Some("staging")),
            IdentityScheme::BranchPathHash,
        );
        assert!(id.ends_with("#staging"));

        let empty = resolve(&scope("infra/network", Some("")), IdentityScheme::Legacy);
        assert!(!empty.contains('#'));
    }

    #[test]
    fn test_candidates_current_scheme_first() {
        let ids = candidates(&scope("infra/network", Some("ws")));
        assert_eq!(ids.len(), 2);
        assert!(ids[0].len() > ids[1].len());
        assert_eq!(ids[1], "prov-1-env-1#ws");
    }

    #[test]
    fn test_candidates_deduplicate_when_path_vanishes() {
        // A path that normalizes to nothing leaves both schemes identical.
        let ids = candidates(&scope("./", None));
        assert_eq!(ids, vec!["prov-1-env-1".to_string()]);
    }

    #[test]
    fn test_dot_dot_components_resolve_lexically() {
        let a = resolve(
            &scope("infra/unused/../network", None),
            IdentityScheme::BranchPathHash,
        );
        let b = resolve(&scope("infra/network", None), IdentityScheme::BranchPathHash);
        assert_eq!(a, b);
    }
}
