//! Persistence Contract
//!
//! Append-only journal of atoms and blocks, the local plaintext
//! sidecar, witness receipts keyed by Merkle root, and chain meta.
//! Backends must make each write atomic relative to reads; the chain
//! owner serialises its own operations.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::collections::HashMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::atom::{Atom, GENESIS};
use crate::chain::Block;
use crate::error::Result;
use crate::witness::WitnessReceipt;

/// Plaintext sidecar record for one action hash. Local only; never
/// part of an export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub plaintext: String,
    pub recorded_at: i64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// One row of `get_history`: an atom joined with its sidecar plaintext.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub index: usize,
    pub when: i64,
    pub proof: String,
    pub action_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_text: Option<String>,
}

/// Everything a store persists for a chain, sidecar excluded. Blocks
/// are carried without their Merkle layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainData {
    pub atoms: Vec<Atom>,
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub meta: HashMap<String, Value>,
    pub exported_at: i64,
}

pub trait Store {
    /// Append an atom, returning its global index.
    fn append_atom(&mut self, atom: &Atom) -> Result<usize>;
    fn get_atom(&self, index: usize) -> Result<Option<Atom>>;
    /// Atoms in `[range.start, range.end)`, clamped to the journal.
    fn get_atoms(&self, range: Range<usize>) -> Result<Vec<Atom>>;
    fn atom_count(&self) -> Result<usize>;
    /// Proof of the newest atom, or `"genesis"` for an empty journal.
    fn last_proof(&self) -> Result<String> {
        let count = self.atom_count()?;
        if count == 0 {
            return Ok(GENESIS.to_string());
        }
        Ok(self
            .get_atom(count - 1)?
            .map(|a| a.proof)
            .unwrap_or_else(|| GENESIS.to_string()))
    }

    /// Append a sealed block, returning its index. Backends may strip
    /// `layers` on write; they are rebuildable from the atoms.
    fn append_block(&mut self, block: &Block) -> Result<usize>;
    fn get_blocks(&self) -> Result<Vec<Block>>;

    fn save_action(
        &mut self,
        action_hash: &str,
        plaintext: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()>;
    fn get_action(&self, action_hash: &str) -> Result<Option<ActionRecord>>;

    /// The newest `limit` atoms joined with their sidecar plaintext,
    /// in chain order.
    fn get_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let count = self.atom_count()?;
        let start = count.saturating_sub(limit);
        let atoms = self.get_atoms(start..count)?;

        let mut rows = Vec::with_capacity(atoms.len());
        for (offset, atom) in atoms.iter().enumerate() {
            let action_text = self.get_action(&atom.action)?.map(|r| r.plaintext);
            rows.push(HistoryEntry {
                index: start + offset,
                when: atom.when,
                proof: atom.proof.clone(),
                action_hash: atom.action.clone(),
                action_text,
            });
        }
        Ok(rows)
    }

    fn save_witness(&mut self, root: &str, receipt: &WitnessReceipt) -> Result<()>;
    fn load_witnesses(&self, root: &str) -> Result<Vec<WitnessReceipt>>;

    fn set_meta(&mut self, key: &str, value: Value) -> Result<()>;
    fn get_meta(&self, key: &str) -> Result<Option<Value>>;

    /// Snapshot atoms, blocks (layers stripped), and meta.
    fn export_all(&self) -> Result<ChainData>;
    /// Replace atoms and blocks, merge meta. The sidecar and witness
    /// receipts are untouched.
    fn import_chain(&mut self, data: ChainData) -> Result<()>;
}
