//! In-Memory Store
//!
//! Ephemeral backend for tests and short-lived chains. Keeps block
//! layers as given so proof paths can be exercised without a rebuild.

use std::collections::HashMap;
use std::ops::Range;

use serde_json::Value;

use crate::atom::Atom;
use crate::chain::Block;
use crate::error::Result;
use crate::store::{ActionRecord, ChainData, Store};
use crate::witness::WitnessReceipt;

#[derive(Debug, Default)]
pub struct MemoryStore {
    atoms: Vec<Atom>,
    blocks: Vec<Block>,
    actions: HashMap<String, ActionRecord>,
    witnesses: HashMap<String, Vec<WitnessReceipt>>,
    meta: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn append_atom(&mut self, atom: &Atom) -> Result<usize> {
        self.atoms.push(atom.clone());
        Ok(self.atoms.len() - 1)
    }

    fn get_atom(&self, index: usize) -> Result<Option<Atom>> {
        Ok(self.atoms.get(index).cloned())
    }

    fn get_atoms(&self, range: Range<usize>) -> Result<Vec<Atom>> {
        let start = range.start.min(self.atoms.len());
        let end = range.end.min(self.atoms.len());
        Ok(self.atoms[start..end].to_vec())
    }

    fn atom_count(&self) -> Result<usize> {
        Ok(self.atoms.len())
    }

    fn append_block(&mut self, block: &Block) -> Result<usize> {
        self.blocks.push(block.clone());
        Ok(self.blocks.len() - 1)
    }

    fn get_blocks(&self) -> Result<Vec<Block>> {
        Ok(self.blocks.clone())
    }

    fn save_action(
        &mut self,
        action_hash: &str,
        plaintext: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        self.actions.insert(
            action_hash.to_string(),
            ActionRecord {
                plaintext: plaintext.to_string(),
                recorded_at: chrono::Utc::now().timestamp_millis(),
                metadata,
            },
        );
        Ok(())
    }

    fn get_action(&self, action_hash: &str) -> Result<Option<ActionRecord>> {
        Ok(self.actions.get(action_hash).cloned())
    }

    fn save_witness(&mut self, root: &str, receipt: &WitnessReceipt) -> Result<()> {
        self.witnesses
            .entry(root.to_string())
            .or_default()
            .push(receipt.clone());
        Ok(())
    }

    fn load_witnesses(&self, root: &str) -> Result<Vec<WitnessReceipt>> {
        Ok(self.witnesses.get(root).cloned().unwrap_or_default())
    }

    fn set_meta(&mut self, key: &str, value: Value) -> Result<()> {
        self.meta.insert(key.to_string(), value);
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.meta.get(key).cloned())
    }

    fn export_all(&self) -> Result<ChainData> {
        Ok(ChainData {
            atoms: self.atoms.clone(),
            blocks: self.blocks.iter().map(Block::without_layers).collect(),
            meta: self.meta.clone(),
            exported_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    fn import_chain(&mut self, data: ChainData) -> Result<()> {
        self.atoms = data.atoms;
        self.blocks = data.blocks;
        self.meta.extend(data.meta);
        Ok(())
    }
}
