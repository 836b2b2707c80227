//! Chain Aggregate
//!
//! Ordered atoms plus the sealed blocks that cover them. Records new
//! operations against the store, seals the uncovered suffix into a
//! Merkle block, and serves selective-disclosure proofs for individual
//! atoms out of sealed blocks.

pub mod audit;
pub mod divergence;

pub use divergence::{find_divergence, Divergence, DivergenceReason};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::atom::{create_atom, verify_chain, Atom, ChainCheck, GENESIS};
use crate::error::Result;
use crate::hash::hash;
use crate::merkle::{build_tree, merkle_proof, verify_merkle_proof, ProofStep};
use crate::store::Store;

/// A sealed Merkle tree over a contiguous range of atoms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    /// Merkle root over the atom proofs, in chain order.
    pub root: String,
    /// Tree layers, kept in memory for proving; stripped on persist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layers: Option<Vec<Vec<String>>>,
    pub atom_count: usize,
    /// Inclusive global atom indices `[start, end]` this block covers.
    pub atom_range: (usize, usize),
    /// Previous block's hash, or `"genesis"` for the first block.
    pub prev_block: String,
    /// `hash(root || prev_block || created_at)`; links blocks into a
    /// higher-order chain.
    pub block_hash: String,
    pub created_at: i64,
}

impl Block {
    pub fn covers(&self, index: usize) -> bool {
        index >= self.atom_range.0 && index <= self.atom_range.1
    }

    pub fn without_layers(&self) -> Block {
        Block {
            layers: None,
            ..self.clone()
        }
    }

    /// Recompute the block hash from the stored fields.
    pub fn compute_hash(root: &str, prev_block: &str, created_at: i64) -> String {
        hash(&format!("{}{}{}", root, prev_block, created_at))
    }
}

/// One operation to record: plaintext action plus optional pre/post
/// state snapshots. Only hashes of these enter the chain.
#[derive(Debug, Clone, Default)]
pub struct Operation {
    pub action: String,
    pub from: Option<Value>,
    pub to: Option<Value>,
}

impl Operation {
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            from: None,
            to: None,
        }
    }
}

/// Everything needed to verify one atom without the rest of the chain:
/// the atom, its inclusion path, and the sealed root the path folds to.
#[derive(Debug, Clone, Serialize)]
pub struct AtomProof {
    pub atom: Atom,
    pub merkle_proof: Vec<ProofStep>,
    pub merkle_root: String,
    pub block_hash: String,
}

/// Export shape shared with peers: hashes only, no layers, no sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainExport {
    pub identity_hash: String,
    pub atom_count: usize,
    pub block_count: usize,
    pub atoms: Vec<Atom>,
    pub blocks: Vec<Block>,
    pub exported_at: i64,
}

/// Point-in-time summary for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct ChainStatus {
    pub identity_hash: String,
    pub atom_count: usize,
    pub block_count: usize,
    /// Highest atom index covered by a sealed block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sealed_through: Option<usize>,
    pub unsealed_atoms: usize,
    pub last_proof: String,
}

/// Owned aggregate over a store: one identity appending to one journal.
pub struct Chain<S: Store> {
    identity: String,
    identity_hash: String,
    store: S,
}

impl<S: Store> Chain<S> {
    pub fn new(identity: &str, store: S) -> Result<Self> {
        let identity_hash = hash(identity);
        let mut chain = Self {
            identity: identity.to_string(),
            identity_hash,
            store,
        };
        if chain.store.get_meta("identity_hash")?.is_none() {
            let value = Value::String(chain.identity_hash.clone());
            chain.store.set_meta("identity_hash", value)?;
        }
        Ok(chain)
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn identity_hash(&self) -> &str {
        &self.identity_hash
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Record one operation: hash the action and state snapshots,
    /// link the atom to the current chain head, and keep the action
    /// plaintext in the local sidecar.
    pub fn record(&mut self, op: &Operation) -> Result<Atom> {
        let action_hash = hash(op.action.as_str());
        let from_hash = hash(&op.from);
        let to_hash = hash(&op.to);
        let prev = vec![self.store.last_proof()?];

        let atom = create_atom(&self.identity_hash, &from_hash, &action_hash, &to_hash, prev);
        let index = self.store.append_atom(&atom)?;
        self.store
            .save_action(&action_hash, &op.action, HashMap::new())?;

        debug!("recorded atom {} as index {}", atom.proof, index);
        Ok(atom)
    }

    /// Seal the suffix of atoms not yet covered by any block. Returns
    /// `None` when every atom is already sealed.
    pub fn seal(&mut self) -> Result<Option<Block>> {
        let total = self.store.atom_count()?;
        let blocks = self.store.get_blocks()?;
        let start = blocks.last().map(|b| b.atom_range.1 + 1).unwrap_or(0);
        if start >= total {
            return Ok(None);
        }

        let atoms = self.store.get_atoms(start..total)?;
        let leaves: Vec<String> = atoms.iter().map(|a| a.proof.clone()).collect();
        let tree = build_tree(&leaves);

        let prev_block = blocks
            .last()
            .map(|b| b.block_hash.clone())
            .unwrap_or_else(|| GENESIS.to_string());
        let created_at = chrono::Utc::now().timestamp_millis();
        let block_hash = Block::compute_hash(&tree.root, &prev_block, created_at);

        let block = Block {
            root: tree.root,
            layers: Some(tree.layers),
            atom_count: leaves.len(),
            atom_range: (start, total - 1),
            prev_block,
            block_hash,
            created_at,
        };
        self.store.append_block(&block)?;

        info!(
            "sealed block over atoms {}..={} with root {}",
            start,
            total - 1,
            block.root
        );
        Ok(Some(block))
    }

    /// Inclusion proof for the atom at `index`, or `None` when no
    /// sealed block covers it yet. Blocks loaded without layers have
    /// their tree rebuilt from the covered atoms.
    pub fn prove_atom(&self, index: usize) -> Result<Option<AtomProof>> {
        let blocks = self.store.get_blocks()?;
        let block = match blocks.iter().find(|b| b.covers(index)) {
            Some(b) => b,
            None => return Ok(None),
        };
        let atom = match self.store.get_atom(index)? {
            Some(a) => a,
            None => return Ok(None),
        };

        let layers = match &block.layers {
            Some(layers) => layers.clone(),
            None => {
                let atoms = self
                    .store
                    .get_atoms(block.atom_range.0..block.atom_range.1 + 1)?;
                let leaves: Vec<String> = atoms.iter().map(|a| a.proof.clone()).collect();
                build_tree(&leaves).layers
            }
        };

        let leaf_index = index - block.atom_range.0;
        let proof = match merkle_proof(&layers, leaf_index) {
            Some(p) => p,
            None => return Ok(None),
        };

        Ok(Some(AtomProof {
            atom,
            merkle_proof: proof,
            merkle_root: block.root.clone(),
            block_hash: block.block_hash.clone(),
        }))
    }

    /// Delegates to the Merkle verifier; a peer holding only an atom,
    /// a path, and an anchored root needs nothing else.
    pub fn verify_proof(leaf_hash: &str, proof: &[ProofStep], expected_root: &str) -> bool {
        verify_merkle_proof(leaf_hash, proof, expected_root)
    }

    /// Verify every atom and linkage in the journal.
    pub fn verify(&self) -> Result<ChainCheck> {
        let count = self.store.atom_count()?;
        let atoms = self.store.get_atoms(0..count)?;
        Ok(verify_chain(&atoms))
    }

    pub fn status(&self) -> Result<ChainStatus> {
        let atom_count = self.store.atom_count()?;
        let blocks = self.store.get_blocks()?;
        let sealed_through = blocks.last().map(|b| b.atom_range.1);
        let unsealed_atoms = match sealed_through {
            Some(end) => atom_count.saturating_sub(end + 1),
            None => atom_count,
        };

        Ok(ChainStatus {
            identity_hash: self.identity_hash.clone(),
            atom_count,
            block_count: blocks.len(),
            sealed_through,
            unsealed_atoms,
            last_proof: self.store.last_proof()?,
        })
    }

    /// Shareable snapshot: atoms and blocks minus anything local-only.
    pub fn export(&self) -> Result<ChainExport> {
        let data = self.store.export_all()?;
        Ok(ChainExport {
            identity_hash: self.identity_hash.clone(),
            atom_count: data.atoms.len(),
            block_count: data.blocks.len(),
            atoms: data.atoms,
            blocks: data.blocks,
            exported_at: data.exported_at,
        })
    }

    /// Replace local atoms and blocks with an exported snapshot.
    pub fn import(&mut self, export: ChainExport) -> Result<()> {
        let mut meta = HashMap::new();
        meta.insert(
            "imported_identity_hash".to_string(),
            Value::String(export.identity_hash),
        );

        self.store.import_chain(crate::store::ChainData {
            atoms: export.atoms,
            blocks: export.blocks,
            meta,
            exported_at: export.exported_at,
        })
    }
}
