//! # Merkle Engine
//!
//! SHA-256 binary Merkle tree over an ordered sequence of 32-byte leaf
//! digests, with inclusion proofs. This is the commitment every block
//! header carries as its `merkle_root` — the ordered list of transaction
//! hashes is the leaf sequence.
//!
//! ## Shape Rules
//!
//! - Levels pair left-to-right; an odd trailing node is hashed against a
//!   copy of itself to form its pair. A single-leaf sequence therefore
//!   commits to `H(leaf || leaf)`, not to the bare leaf.
//! - The root of an *empty* sequence is 32 zero bytes.
//! - Internal nodes are `SHA-256(left || right)`.
//!
//! Inputs that are not already digests (structured payloads, raw bytes)
//! are canonicalized and SHA-256'd by the caller before they become
//! leaves; this module only ever sees digests.

use serde::{Deserialize, Serialize};

use crate::crypto::hash::{sha256, Digest, ZERO_DIGEST};

// ---------------------------------------------------------------------------
// Proofs
// ---------------------------------------------------------------------------

/// Which side of the concatenation a proof sibling sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Sibling is the left operand: `H(sibling || current)`.
    Left,
    /// Sibling is the right operand: `H(current || sibling)`.
    Right,
}

/// One step of an inclusion proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    /// The sibling hash at this level.
    pub sibling: Digest,
    /// Side the sibling occupies.
    pub direction: Direction,
}

/// An inclusion proof for a single leaf, ordered leaf-to-root.
pub type MerkleProof = Vec<ProofStep>;

// ---------------------------------------------------------------------------
// Root computation
// ---------------------------------------------------------------------------

fn combine(left: &Digest, right: &Digest) -> Digest {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left);
    buf[32..].copy_from_slice(right);
    sha256(&buf)
}

fn next_level(level: &[Digest]) -> Vec<Digest> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [l, r] => combine(l, r),
            [odd] => combine(odd, odd),
            _ => unreachable!("chunks(2) yields 1 or 2 elements"),
        })
        .collect()
}

/// Compute the Merkle root of an ordered leaf sequence.
pub fn merkle_root(leaves: &[Digest]) -> Digest {
    if leaves.is_empty() {
        return ZERO_DIGEST;
    }
    let mut level = leaves.to_vec();
    loop {
        level = next_level(&level);
        if level.len() == 1 {
            return level[0];
        }
    }
}

// ---------------------------------------------------------------------------
// MerkleTree
// ---------------------------------------------------------------------------

/// A fully materialized tree, kept when proofs are needed.
///
/// `levels[0]` is the leaf sequence; the last level holds the single root.
/// For root-only use cases, [`merkle_root`] avoids retaining the levels.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build a tree from an ordered leaf sequence.
    ///
    /// An empty sequence yields a tree whose root is the zero digest and
    /// which can produce no proofs.
    pub fn build(leaves: &[Digest]) -> Self {
        if leaves.is_empty() {
            return Self { levels: Vec::new() };
        }
        let mut levels = vec![leaves.to_vec()];
        while levels.last().map(Vec::len) != Some(1) {
            let next = next_level(levels.last().unwrap_or(&Vec::new()));
            levels.push(next);
        }
        // A single leaf still gets one pairing level, so the root is
        // H(leaf || leaf) and never the bare leaf.
        if levels.len() == 1 {
            let only = levels[0][0];
            levels.push(vec![combine(&only, &only)]);
        }
        Self { levels }
    }

    /// The root digest. Zero digest for the empty tree.
    pub fn root(&self) -> Digest {
        self.levels
            .last()
            .and_then(|l| l.first())
            .copied()
            .unwrap_or(ZERO_DIGEST)
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Produce the inclusion proof for the leaf at `index`.
    ///
    /// Returns `None` for an out-of-range index or an empty tree.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count() {
            return None;
        }
        let mut steps = Vec::new();
        let mut pos = index;
        // Walk every level below the root.
        for level in &self.levels[..self.levels.len() - 1] {
            let (sibling_pos, direction) = if pos % 2 == 0 {
                (pos + 1, Direction::Right)
            } else {
                (pos - 1, Direction::Left)
            };
            // An odd trailing node pairs with its own copy.
            let sibling = *level.get(sibling_pos).unwrap_or(&level[pos]);
            steps.push(ProofStep { sibling, direction });
            pos /= 2;
        }
        Some(steps)
    }
}

/// Verify an inclusion proof: fold the leaf up through the siblings and
/// compare against the expected root.
pub fn verify_proof(leaf: &Digest, proof: &MerkleProof, root: &Digest) -> bool {
    let mut current = *leaf;
    for step in proof {
        current = match step.direction {
            Direction::Left => combine(&step.sibling, &current),
            Direction::Right => combine(&current, &step.sibling),
        };
    }
    current == *root
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
