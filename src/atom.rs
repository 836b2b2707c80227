//! Atoms
//!
//! One atom records a single state transition as a set of content
//! hashes linked to its predecessors. The `proof` field is the atom's
//! identity: a hash over every other field, so any mutation is
//! detectable and the chain of `prev` references is tamper-evident.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::hash::{hash_many, Canonical};

/// Predecessor marker for the first atom in a chain.
pub const GENESIS: &str = "genesis";

/// Immutable state-transition record.
///
/// All content fields (`who`, `from`, `action`, `to`) are hashes; the
/// plaintext they were derived from never enters the atom.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Atom {
    /// Hash of the recording identity.
    pub who: String,
    /// Hash of the pre-state snapshot.
    pub from: String,
    /// Hash of the operation description.
    pub action: String,
    /// Hash of the post-state snapshot.
    pub to: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub when: i64,
    /// Proof hashes of predecessor atoms; `["genesis"]` for the first.
    /// A peer may serialise a lone predecessor as a bare string.
    #[serde(deserialize_with = "scalar_or_seq")]
    pub prev: Vec<String>,
    /// `hash_many(who, from, action, to, when, *prev)`.
    pub proof: String,
}

impl Atom {
    pub fn is_genesis(&self) -> bool {
        self.prev.iter().any(|p| p == GENESIS)
    }
}

/// Accepts `prev` as either a single scalar or an ordered sequence.
fn scalar_or_seq<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Shape::deserialize(deserializer)? {
        Shape::One(p) => vec![p],
        Shape::Many(ps) => ps,
    })
}

/// Compute the proof hash for an atom's fields.
pub fn compute_proof(
    who: &str,
    from: &str,
    action: &str,
    to: &str,
    when: i64,
    prev: &[String],
) -> String {
    let mut parts: Vec<&dyn Canonical> = vec![&who, &from, &action, &to, &when];
    for p in prev {
        parts.push(p);
    }
    hash_many(&parts)
}

/// Create an atom stamped with the current wall clock.
///
/// An empty `prev` normalises to `["genesis"]`; a single predecessor is
/// passed as a one-element sequence.
pub fn create_atom(who: &str, from: &str, action: &str, to: &str, prev: Vec<String>) -> Atom {
    let prev = if prev.is_empty() {
        vec![GENESIS.to_string()]
    } else {
        prev
    };
    let when = chrono::Utc::now().timestamp_millis();
    let proof = compute_proof(who, from, action, to, when, &prev);

    debug!("created atom {} with {} predecessor(s)", proof, prev.len());

    Atom {
        who: who.to_string(),
        from: from.to_string(),
        action: action.to_string(),
        to: to.to_string(),
        when,
        prev,
        proof,
    }
}

/// Recompute the proof and compare with the stored value.
pub fn verify_atom(atom: &Atom) -> bool {
    compute_proof(
        &atom.who,
        &atom.from,
        &atom.action,
        &atom.to,
        atom.when,
        &atom.prev,
    ) == atom.proof
}

/// Why a chain failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakReason {
    /// An atom's stored proof does not match its recomputed hash.
    ProofMismatch,
    /// An atom does not reference its predecessor's proof.
    ChainBreak,
    /// An atom's timestamp precedes its predecessor's.
    TimeReversal,
}

/// Outcome of verifying an ordered sequence of atoms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainCheck {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<BreakReason>,
}

impl ChainCheck {
    pub fn intact() -> Self {
        Self {
            valid: true,
            broken_at: None,
            reason: None,
        }
    }

    fn broken(at: usize, reason: BreakReason) -> Self {
        Self {
            valid: false,
            broken_at: Some(at),
            reason: Some(reason),
        }
    }
}

/// Verify a linear chain: per-atom proofs, predecessor linkage, and
/// non-decreasing timestamps. Returns the first failure found.
///
/// Linkage is a membership test on `prev`, so multi-parent atoms from a
/// converging branch verify as long as one parent is the predecessor.
/// An empty sequence is trivially valid.
pub fn verify_chain(atoms: &[Atom]) -> ChainCheck {
    for (i, atom) in atoms.iter().enumerate() {
        if !verify_atom(atom) {
            return ChainCheck::broken(i, BreakReason::ProofMismatch);
        }

        if i > 0 {
            let prev_proof = &atoms[i - 1].proof;
            if !atom.prev.iter().any(|p| p == prev_proof) {
                return ChainCheck::broken(i, BreakReason::ChainBreak);
            }

            // Equal millisecond timestamps pass; only strict reversals fail.
            if atom.when < atoms[i - 1].when {
                return ChainCheck::broken(i, BreakReason::TimeReversal);
            }
        }
    }

    ChainCheck::intact()
}
