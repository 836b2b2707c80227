//! OpenTimestamps Wire Constants
//!
//! The canonical proof-file magic and the opcode alphabet. Today only
//! the Bitcoin attestation marker is consulted, via a byte scan over
//! calendar responses; the remaining constants are held for a full tag
//! stream parser.

/// 32-byte magic prefixing every `.ots` proof file:
/// `\x00OpenTimestamps\x00\x00Proof\x00` followed by the version tag.
pub const HEADER_MAGIC: [u8; 32] = [
    0x00, 0x4f, 0x70, 0x65, 0x6e, 0x54, 0x69, 0x6d, 0x65, 0x73, 0x74, 0x61, 0x6d, 0x70, 0x73,
    0x00, 0x00, 0x50, 0x72, 0x6f, 0x6f, 0x66, 0x00, 0xbf, 0x89, 0xe2, 0xe8, 0x84, 0xe8, 0x92,
    0x94, 0x01,
];

pub const OP_SHA256: u8 = 0x08;
pub const OP_APPEND: u8 = 0xf0;
pub const OP_PREPEND: u8 = 0xf1;
pub const ATTESTATION_PENDING: u8 = 0x83;
pub const ATTESTATION_BITCOIN: u8 = 0x05;

/// Byte-scan heuristic for a Bitcoin block-header attestation.
///
/// TODO: parse the tag stream and match `0x05` only in attestation
/// position once proof files are stored and verified locally.
pub fn contains_bitcoin_attestation(body: &[u8]) -> bool {
    body.contains(&ATTESTATION_BITCOIN)
}
