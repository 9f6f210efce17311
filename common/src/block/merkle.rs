use crate::crypto::{hash, Hash};
use sha3::{Digest, Sha3_256};

/// Merkle root over transaction hashes. The empty list hashes to
/// `SHA3-256("")`; odd levels pair the last node with itself.
pub fn merkle_root(hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return hash(b"");
    }

    let mut level: Vec<Hash> = hashes.to_vec();
    while level.len() > 1 {
        let mut next_level = Vec::with_capacity(level.len().div_ceil(2));

        for chunk in level.chunks(2) {
            let left = &chunk[0];
            let right = chunk.get(1).unwrap_or(left);
            next_level.push(hash_pair(left, right));
        }

        level = next_level;
    }

    level.remove(0)
}

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha3_256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash::new(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(byte: u8) -> Hash {
        Hash::new([byte; 32])
    }

    #[test]
    fn test_empty_root_is_sha3_of_empty() {
        assert_eq!(merkle_root(&[]), hash(b""));
    }

    #[test]
    fn test_single_hash() {
        let root = merkle_root(&[h(1)]);
        assert_eq!(root, h(1));
    }

    #[test]
    fn test_two_hashes() {
        let root = merkle_root(&[h(1), h(2)]);
        assert_eq!(root, hash_pair(&h(1), &h(2)));
    }

    #[test]
    fn test_odd_count_pairs_last_with_itself() {
        let root = merkle_root(&[h(1), h(2), h(3)]);
        let left = hash_pair(&h(1), &h(2));
        let right = hash_pair(&h(3), &h(3));
        assert_eq!(root, hash_pair(&left, &right));
    }

    #[test]
    fn test_deterministic_and_order_sensitive() {
        let a = merkle_root(&[h(1), h(2)]);
        let b = merkle_root(&[h(2), h(1)]);
        assert_ne!(a, b);
        assert_eq!(a, merkle_root(&[h(1), h(2)]));
    }
}
