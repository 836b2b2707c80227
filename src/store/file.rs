//! File Store
//!
//! JSON persistence under a config root: `chain.json` for atoms,
//! blocks, and meta; `actions.json` for the plaintext sidecar;
//! `witnesses/<merkle_root>.json` for receipt lists. Every write goes
//! to a temp file in the same directory and is renamed into place, so
//! a reader never observes half-written state.

use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::atom::Atom;
use crate::chain::Block;
use crate::error::{ForgeError, Result};
use crate::store::{ActionRecord, ChainData, Store};
use crate::witness::WitnessReceipt;

const CHAIN_FILE: &str = "chain.json";
const ACTIONS_FILE: &str = "actions.json";
const WITNESS_DIR: &str = "witnesses";
const FORMAT_VERSION: u32 = 1;

const SIDECAR_NOTE: &str =
    "LOCAL ONLY - do not share. Plaintext for hashed actions; never part of an export.";

#[derive(Debug, Serialize, Deserialize)]
struct ChainFile {
    version: u32,
    created_at: i64,
    atoms: Vec<Atom>,
    blocks: Vec<Block>,
    #[serde(default)]
    meta: HashMap<String, Value>,
}

impl ChainFile {
    fn fresh() -> Self {
        Self {
            version: FORMAT_VERSION,
            created_at: chrono::Utc::now().timestamp_millis(),
            atoms: Vec::new(),
            blocks: Vec::new(),
            meta: HashMap::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ActionsFile {
    version: u32,
    note: String,
    created_at: i64,
    entries: HashMap<String, ActionRecord>,
}

impl ActionsFile {
    fn fresh() -> Self {
        Self {
            version: FORMAT_VERSION,
            note: SIDECAR_NOTE.to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
            entries: HashMap::new(),
        }
    }
}

/// Store backed by JSON files under `root`.
pub struct FileStore {
    root: PathBuf,
    chain: ChainFile,
    actions: ActionsFile,
}

impl FileStore {
    /// Open (or initialise) a store under `root`. A malformed file is
    /// reported and replaced with an empty state rather than refusing
    /// to start.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root.join(WITNESS_DIR))
            .map_err(|e| ForgeError::Store(format!("Failed to create store root: {}", e)))?;

        let chain = load_or_recover(&root.join(CHAIN_FILE), ChainFile::fresh);
        let actions = load_or_recover(&root.join(ACTIONS_FILE), ActionsFile::fresh);

        debug!(
            "opened store at {} with {} atoms, {} blocks",
            root.display(),
            chain.atoms.len(),
            chain.blocks.len()
        );

        Ok(Self {
            root: root.to_path_buf(),
            chain,
            actions,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn flush_chain(&self) -> Result<()> {
        write_json(&self.root.join(CHAIN_FILE), &self.chain)
    }

    fn flush_actions(&self) -> Result<()> {
        write_json(&self.root.join(ACTIONS_FILE), &self.actions)
    }

    fn witness_path(&self, root_hash: &str) -> PathBuf {
        self.root.join(WITNESS_DIR).join(format!("{}.json", root_hash))
    }
}

/// Load a JSON file, falling back to `fresh` when it is absent or
/// corrupt. Corruption is surfaced as a warning, not a startup failure.
fn load_or_recover<T, F>(path: &Path, fresh: F) -> T
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    match fs::read_to_string(path) {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    "store file {} is corrupt ({}); starting from empty state",
                    path.display(),
                    e
                );
                fresh()
            }
        },
        Err(_) => fresh(),
    }
}

/// Serialize to a temp file in the target directory, then rename into
/// place.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .map_err(|e| ForgeError::Store(format!("Failed to write {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path)
        .map_err(|e| ForgeError::Store(format!("Failed to rename {}: {}", tmp.display(), e)))?;
    Ok(())
}

impl Store for FileStore {
    fn append_atom(&mut self, atom: &Atom) -> Result<usize> {
        self.chain.atoms.push(atom.clone());
        self.flush_chain()?;
        Ok(self.chain.atoms.len() - 1)
    }

    fn get_atom(&self, index: usize) -> Result<Option<Atom>> {
        Ok(self.chain.atoms.get(index).cloned())
    }

    fn get_atoms(&self, range: Range<usize>) -> Result<Vec<Atom>> {
        let start = range.start.min(self.chain.atoms.len());
        let end = range.end.min(self.chain.atoms.len());
        Ok(self.chain.atoms[start..end].to_vec())
    }

    fn atom_count(&self) -> Result<usize> {
        Ok(self.chain.atoms.len())
    }

    fn append_block(&mut self, block: &Block) -> Result<usize> {
        // Layers are rebuildable from the atom range; keep chain.json lean.
        self.chain.blocks.push(block.without_layers());
        self.flush_chain()?;
        Ok(self.chain.blocks.len() - 1)
    }

    fn get_blocks(&self) -> Result<Vec<Block>> {
        Ok(self.chain.blocks.clone())
    }

    fn save_action(
        &mut self,
        action_hash: &str,
        plaintext: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        self.actions.entries.insert(
            action_hash.to_string(),
            ActionRecord {
                plaintext: plaintext.to_string(),
                recorded_at: chrono::Utc::now().timestamp_millis(),
                metadata,
            },
        );
        self.flush_actions()
    }

    fn get_action(&self, action_hash: &str) -> Result<Option<ActionRecord>> {
        Ok(self.actions.entries.get(action_hash).cloned())
    }

    fn save_witness(&mut self, root: &str, receipt: &WitnessReceipt) -> Result<()> {
        let path = self.witness_path(root);
        let mut receipts: Vec<WitnessReceipt> = load_or_recover(&path, Vec::new);
        receipts.push(receipt.clone());
        write_json(&path, &receipts)?;
        info!("saved {} witness for root {}", receipt.level().label(), root);
        Ok(())
    }

    fn load_witnesses(&self, root: &str) -> Result<Vec<WitnessReceipt>> {
        Ok(load_or_recover(&self.witness_path(root), Vec::new))
    }

    fn set_meta(&mut self, key: &str, value: Value) -> Result<()> {
        self.chain.meta.insert(key.to_string(), value);
        self.flush_chain()
    }

    fn get_meta(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.chain.meta.get(key).cloned())
    }

    fn export_all(&self) -> Result<ChainData> {
        Ok(ChainData {
            atoms: self.chain.atoms.clone(),
            blocks: self.chain.blocks.iter().map(Block::without_layers).collect(),
            meta: self.chain.meta.clone(),
            exported_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    fn import_chain(&mut self, data: ChainData) -> Result<()> {
        self.chain.atoms = data.atoms;
        self.chain.blocks = data.blocks;
        self.chain.meta.extend(data.meta);
        self.flush_chain()
    }
}
