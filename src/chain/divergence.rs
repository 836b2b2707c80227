//! Cross-Chain Divergence
//!
//! Bilateral dispute resolution: two parties each hold a copy of what
//! should be the same chain; this locates the first atom where their
//! records disagree. Timestamps are reported but never compared, since
//! honest parties stamp the same action microseconds apart.

use serde::Serialize;
use tracing::{debug, warn};

use crate::atom::Atom;

/// Why two chains were judged diverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceReason {
    /// Atoms at the divergence index differ in action or state hashes.
    ContentMismatch,
    /// One chain is a strict prefix of the other.
    LengthMismatch,
}

/// Result of comparing two chains pairwise.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Divergence {
    pub diverged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DivergenceReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_match: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_match: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub a_when: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b_when: Option<i64>,
    pub a_len: usize,
    pub b_len: usize,
}

/// Compare atoms pairwise up to the shorter length; the first index
/// where `(action, from, to)` differ is the divergence point. Chains
/// that agree pairwise but differ in length diverge at the shorter
/// chain's end.
pub fn find_divergence(a: &[Atom], b: &[Atom]) -> Divergence {
    let min_len = a.len().min(b.len());

    for i in 0..min_len {
        let action_match = a[i].action == b[i].action;
        let state_match = a[i].from == b[i].from && a[i].to == b[i].to;

        if !(action_match && state_match) {
            warn!(
                "chains diverge at atom {} (action_match={}, state_match={})",
                i, action_match, state_match
            );
            return Divergence {
                diverged: true,
                at_index: Some(i),
                reason: Some(DivergenceReason::ContentMismatch),
                action_match: Some(action_match),
                state_match: Some(state_match),
                a_when: Some(a[i].when),
                b_when: Some(b[i].when),
                a_len: a.len(),
                b_len: b.len(),
            };
        }
    }

    if a.len() != b.len() {
        warn!(
            "chains agree on {} atoms but lengths differ ({} vs {})",
            min_len,
            a.len(),
            b.len()
        );
        return Divergence {
            diverged: true,
            at_index: Some(min_len),
            reason: Some(DivergenceReason::LengthMismatch),
            action_match: None,
            state_match: None,
            a_when: None,
            b_when: None,
            a_len: a.len(),
            b_len: b.len(),
        };
    }

    debug!("chains agree on all {} atoms", min_len);
    Divergence {
        diverged: false,
        at_index: None,
        reason: None,
        action_match: None,
        state_match: None,
        a_when: None,
        b_when: None,
        a_len: a.len(),
        b_len: b.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Chain, Operation};
    use crate::store::{MemoryStore, Store};

    fn atoms_for(identity: &str, actions: &[&str]) -> Vec<Atom> {
        let mut chain = Chain::new(identity, MemoryStore::new()).unwrap();
        for action in actions {
            chain.record(&Operation::new(action)).unwrap();
        }
        chain.store().get_atoms(0..actions.len()).unwrap()
    }

    #[test]
    fn test_identical_chains_do_not_diverge() {
        let a = atoms_for("ops@a", &["update", "deploy", "restart"]);
        let result = find_divergence(&a, &a);
        assert!(!result.diverged);
        assert_eq!(result.at_index, None);
    }

    #[test]
    fn test_same_actions_different_identities_agree() {
        // `who` differs across parties but is not part of the content
        // equality test.
        let a = atoms_for("ops@a", &["update", "deploy"]);
        let b = atoms_for("ops@b", &["update", "deploy"]);
        assert!(!find_divergence(&a, &b).diverged);
    }

    #[test]
    fn test_divergence_after_shared_prefix() {
        let a = atoms_for("ops@a", &["update", "deploy", "restart", "scale up"]);
        let b = atoms_for("ops@b", &["update", "deploy", "restart", "scale down"]);

        let result = find_divergence(&a, &b);
        assert!(result.diverged);
        assert_eq!(result.at_index, Some(3));
        assert_eq!(result.reason, Some(DivergenceReason::ContentMismatch));
        assert_eq!(result.action_match, Some(false));
        assert_eq!(result.state_match, Some(true));
        assert!(result.a_when.is_some());
        assert!(result.b_when.is_some());
    }

    #[test]
    fn test_length_mismatch_at_prefix_end() {
        let a = atoms_for("ops@a", &["update", "deploy", "restart"]);
        let b = atoms_for("ops@b", &["update", "deploy"]);

        let result = find_divergence(&a, &b);
        assert!(result.diverged);
        assert_eq!(result.at_index, Some(2));
        assert_eq!(result.reason, Some(DivergenceReason::LengthMismatch));
        assert_eq!(result.a_len, 3);
        assert_eq!(result.b_len, 2);
    }

    #[test]
    fn test_both_empty_chains_agree() {
        let result = find_divergence(&[], &[]);
        assert!(!result.diverged);
    }

    #[test]
    fn test_empty_versus_nonempty_is_length_mismatch() {
        let a = atoms_for("ops@a", &["update"]);
        let result = find_divergence(&a, &[]);
        assert!(result.diverged);
        assert_eq!(result.at_index, Some(0));
        assert_eq!(result.reason, Some(DivergenceReason::LengthMismatch));
    }
}
