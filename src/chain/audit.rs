//! Chain Integrity Reporting
//!
//! A fuller picture than the pass/fail chain check: localises every
//! tampered atom, verifies block-to-block linkage, and flags large
//! wall-clock gaps between consecutive atoms. Gaps are informational
//! only and never fail verification.

use chrono::Duration;
use serde::Serialize;
use tracing::{info, warn};

use crate::atom::{verify_atom, verify_chain, Atom, ChainCheck};
use crate::chain::Block;
use crate::error::Result;
use crate::store::Store;

/// Every atom index whose recomputed proof mismatches its stored one.
pub fn find_tampered_atoms(atoms: &[Atom]) -> Vec<usize> {
    atoms
        .iter()
        .enumerate()
        .filter(|(_, atom)| !verify_atom(atom))
        .map(|(i, _)| i)
        .collect()
}

/// A wall-clock gap between consecutive atoms above the threshold.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GapInfo {
    pub start_index: usize,
    pub end_index: usize,
    pub gap_ms: i64,
}

/// Gaps above `threshold` between consecutive atoms.
pub fn detect_gaps(atoms: &[Atom], threshold: Duration) -> Vec<GapInfo> {
    let threshold_ms = threshold.num_milliseconds();
    let mut gaps = Vec::new();

    for i in 1..atoms.len() {
        let gap_ms = atoms[i].when - atoms[i - 1].when;
        if gap_ms > threshold_ms {
            gaps.push(GapInfo {
                start_index: i - 1,
                end_index: i,
                gap_ms,
            });
        }
    }

    gaps
}

/// Outcome of checking the higher-order block chain.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BlockCheck {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<usize>,
}

/// Verify block hashes, `prev_block` linkage, and range contiguity.
pub fn verify_blocks(blocks: &[Block]) -> BlockCheck {
    for (i, block) in blocks.iter().enumerate() {
        let expected = Block::compute_hash(&block.root, &block.prev_block, block.created_at);
        if block.block_hash != expected {
            return BlockCheck {
                valid: false,
                broken_at: Some(i),
            };
        }

        if i == 0 {
            if block.atom_range.0 != 0 {
                return BlockCheck {
                    valid: false,
                    broken_at: Some(i),
                };
            }
        } else {
            let prev = &blocks[i - 1];
            if block.prev_block != prev.block_hash || block.atom_range.0 != prev.atom_range.1 + 1 {
                return BlockCheck {
                    valid: false,
                    broken_at: Some(i),
                };
            }
        }
    }

    BlockCheck {
        valid: true,
        broken_at: None,
    }
}

/// Combined integrity report over a store's journal.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub atom_count: usize,
    pub block_count: usize,
    pub chain: ChainCheck,
    pub blocks: BlockCheck,
    pub tampered: Vec<usize>,
    pub gaps: Vec<GapInfo>,
}

impl IntegrityReport {
    pub fn is_valid(&self) -> bool {
        self.chain.valid && self.blocks.valid
    }

    /// Multi-line human-readable view for the CLI.
    pub fn detailed_status(&self) -> String {
        let chain_line = if self.chain.valid {
            "intact".to_string()
        } else {
            format!(
                "broken at atom {} ({:?})",
                self.chain.broken_at.unwrap_or(0),
                self.chain.reason
            )
        };
        let block_line = if self.blocks.valid {
            "linked".to_string()
        } else {
            format!("broken at block {}", self.blocks.broken_at.unwrap_or(0))
        };

        format!(
            "Atoms: {}\nBlocks: {}\nHash chain: {}\nBlock chain: {}\nTampered atoms: {}\nTime gaps: {}",
            self.atom_count,
            self.block_count,
            chain_line,
            block_line,
            self.tampered.len(),
            self.gaps.len()
        )
    }
}

/// Default gap threshold for reporting: one hour.
const GAP_THRESHOLD_HOURS: i64 = 1;

/// Run the full integrity inspection over a store.
pub fn inspect<S: Store>(store: &S) -> Result<IntegrityReport> {
    let count = store.atom_count()?;
    let atoms = store.get_atoms(0..count)?;
    let blocks = store.get_blocks()?;

    let report = IntegrityReport {
        atom_count: atoms.len(),
        block_count: blocks.len(),
        chain: verify_chain(&atoms),
        blocks: verify_blocks(&blocks),
        tampered: find_tampered_atoms(&atoms),
        gaps: detect_gaps(&atoms, Duration::hours(GAP_THRESHOLD_HOURS)),
    };

    if report.is_valid() {
        info!("integrity inspection passed over {} atoms", report.atom_count);
    } else {
        warn!("integrity inspection failed:\n{}", report.detailed_status());
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Chain, Operation};
    use crate::hash::hash;
    use crate::store::{MemoryStore, Store};

    fn sealed_chain(actions: &[&str]) -> Chain<MemoryStore> {
        let mut chain = Chain::new("ops@test", MemoryStore::new()).unwrap();
        for action in actions {
            chain.record(&Operation::new(action)).unwrap();
        }
        chain.seal().unwrap();
        chain
    }

    #[test]
    fn test_clean_chain_inspects_valid() {
        let chain = sealed_chain(&["a", "b", "c"]);
        let report = inspect(chain.store()).unwrap();

        assert!(report.is_valid());
        assert!(report.tampered.is_empty());
        assert!(report.gaps.is_empty());
        assert_eq!(report.block_count, 1);
    }

    #[test]
    fn test_tampered_atoms_are_localised() {
        let chain = sealed_chain(&["a", "b", "c", "d"]);
        let mut atoms = chain.store().get_atoms(0..4).unwrap();
        atoms[1].action = hash("forged");
        atoms[3].to = hash("forged");

        assert_eq!(find_tampered_atoms(&atoms), vec![1, 3]);
    }

    #[test]
    fn test_gap_detection() {
        let chain = sealed_chain(&["a", "b", "c"]);
        let mut atoms = chain.store().get_atoms(0..3).unwrap();
        atoms[2].when = atoms[1].when + Duration::hours(3).num_milliseconds();

        let gaps = detect_gaps(&atoms, Duration::hours(1));
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].start_index, 1);
        assert_eq!(gaps[0].end_index, 2);
    }

    #[test]
    fn test_block_linkage_detects_broken_prev() {
        let mut chain = sealed_chain(&["a", "b"]);
        chain.record(&Operation::new("c")).unwrap();
        chain.seal().unwrap();

        let mut blocks = chain.store().get_blocks().unwrap();
        assert!(verify_blocks(&blocks).valid);

        blocks[1].prev_block = hash("forged block");
        blocks[1].block_hash = Block::compute_hash(
            &blocks[1].root,
            &blocks[1].prev_block,
            blocks[1].created_at,
        );
        let check = verify_blocks(&blocks);
        assert!(!check.valid);
        assert_eq!(check.broken_at, Some(1));
    }

    #[test]
    fn test_block_hash_mismatch_detected() {
        let chain = sealed_chain(&["a", "b"]);
        let mut blocks = chain.store().get_blocks().unwrap();
        blocks[0].root = hash("forged root");

        let check = verify_blocks(&blocks);
        assert!(!check.valid);
        assert_eq!(check.broken_at, Some(0));
    }

    #[test]
    fn test_report_on_tampered_store() {
        let chain = sealed_chain(&["a", "b", "c"]);
        let mut atoms = chain.store().get_atoms(0..3).unwrap();
        atoms[1].action = hash("forged");

        let mut store = MemoryStore::new();
        for atom in &atoms {
            store.append_atom(atom).unwrap();
        }

        let report = inspect(&store).unwrap();
        assert!(!report.is_valid());
        assert_eq!(report.chain.broken_at, Some(1));
        assert_eq!(report.tampered, vec![1]);
        assert!(report.detailed_status().contains("broken at atom 1"));
    }
}
