//! Poseidon digests over arbitrary bytes.
//!
//! Used for compressed-account addresses, simulated Merkle roots and integrity digests.
//! Everything here is deterministic: the same input bytes always give the same field element.

use crate::constants::poseidon_config;
use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::{PoseidonConfig, PoseidonSponge};
use ark_crypto_primitives::sponge::CryptographicSponge;
use ark_ff::{BigInteger, PrimeField};
use std::sync::OnceLock;

/// Bytes per field element when packing bytes. 31 bytes always fit below the BN254 modulus.
const BYTES_PER_ELEM: usize = 31;

/// Pack bytes into field elements, 31 little-endian bytes at a time.
pub fn bytes_to_field_elems(bytes: &[u8]) -> Vec<Fr> {
    bytes
        .chunks(BYTES_PER_ELEM)
        .map(Fr::from_le_bytes_mod_order)
        .collect()
}

/// Poseidon parameters, derived once per process.
fn cached_config() -> &'static PoseidonConfig<Fr> {
    static CONFIG: OnceLock<PoseidonConfig<Fr>> = OnceLock::new();
    CONFIG.get_or_init(poseidon_config)
}

/// Poseidon hash of a sequence of field elements.
pub fn poseidon_digest(elems: &[Fr]) -> Fr {
    let mut sponge = PoseidonSponge::<Fr>::new(cached_config());
    let input: Vec<Fr> = elems.to_vec();
    sponge.absorb(&input);
    let out: Vec<Fr> = sponge.squeeze_field_elements(1);
    out[0]
}

/// Hash several byte strings as one message.
///
/// Each part is prefixed with its length so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn digest_parts(parts: &[&[u8]]) -> Fr {
    let mut elems = Vec::new();
    for part in parts {
        elems.push(Fr::from(part.len() as u64));
        elems.extend(bytes_to_field_elems(part));
    }
    poseidon_digest(&elems)
}

/// Merkle root over fixed-size leaves of `bytes`.
///
/// Leaves are Poseidon digests of each chunk; odd levels carry the last node up unchanged.
/// An empty input has the digest of the empty message as its root.
pub fn merkle_root(bytes: &[u8], leaf_size: usize) -> Fr {
    let leaf_size = leaf_size.max(1);
    let mut level: Vec<Fr> = bytes
        .chunks(leaf_size)
        .map(|chunk| digest_parts(&[chunk]))
        .collect();

    if level.is_empty() {
        return digest_parts(&[]);
    }

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => poseidon_digest(&[*left, *right]),
                [single] => *single,
                _ => unreachable!("chunks(2) yields one or two nodes"),
            })
            .collect();
    }

    level[0]
}

/// Big-endian hex of a field element.
pub fn fr_to_hex(x: &Fr) -> String {
    hex::encode(x.into_bigint().to_bytes_be())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(digest_parts(&[b"record-1", b"account"]), digest_parts(&[b"record-1", b"account"]));
    }

    #[test]
    fn length_prefix_separates_part_boundaries() {
        assert_ne!(digest_parts(&[b"ab", b"c"]), digest_parts(&[b"a", b"bc"]));
    }

    #[test]
    fn merkle_root_depends_on_every_leaf() {
        let data = vec![7u8; 200];
        let mut tampered = data.clone();
        tampered[150] ^= 1;
        assert_ne!(merkle_root(&data, 32), merkle_root(&tampered, 32));
    }

    #[test]
    fn single_leaf_root_is_leaf_digest() {
        let data = b"short payload";
        assert_eq!(merkle_root(data, 64), digest_parts(&[data]));
    }

    #[test]
    fn hex_is_fixed_width() {
        let h = fr_to_hex(&Fr::from(1u64));
        assert_eq!(h.len(), 64);
        assert!(h.ends_with("01"));
    }
}
