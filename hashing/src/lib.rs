use ethereum_types::H256;
use generic_array::GenericArray;
use hex_literal::hex;
use sha2::{
    digest::{core_api::BlockSizeUser, generic_array::typenum::Unsigned as _},
    Digest as _, Sha256,
};

// Hardcoding the padding for the fixed-size inputs below lets them skip the buffering done by
// `sha2::Sha256`. Secrets, block IDs and Merkle nodes are all hashed through these.

#[rustfmt::skip]
const BLOCK_WITH_PADDING_FOR_256_BITS: Sha256Block = hex!("
    00000000 00000000 00000000 00000000
    00000000 00000000 00000000 00000000
    80000000 00000000 00000000 00000000
    00000000 00000000 00000000 00000100
");

#[rustfmt::skip]
const BLOCK_WITH_PADDING_FOR_320_BITS: Sha256Block = hex!("
    00000000 00000000 00000000 00000000
    00000000 00000000 00000000 00000000
    00000000 00000000 80000000 00000000
    00000000 00000000 00000000 00000140
");

// This one has nothing but padding.
#[rustfmt::skip]
const PADDING_BLOCK_FOR_512_BITS: Sha256Block = hex!("
    80000000 00000000 00000000 00000000
    00000000 00000000 00000000 00000000
    00000000 00000000 00000000 00000000
    00000000 00000000 00000000 00000200
");

type Sha256BlockSize = <Sha256 as BlockSizeUser>::BlockSize;
type Sha256Block = [u8; Sha256BlockSize::USIZE];

struct Sha256State([u32; 8]);

impl Default for Sha256State {
    #[rustfmt::skip]
    fn default() -> Self {
        Self([
            0x6a09_e667, 0xbb67_ae85, 0x3c6e_f372, 0xa54f_f53a,
            0x510e_527f, 0x9b05_688c, 0x1f83_d9ab, 0x5be0_cd19,
        ])
    }
}

impl Sha256State {
    fn compress_single(self, block: Sha256Block) -> Self {
        self.compress_multiple(core::slice::from_ref(GenericArray::from_slice(&block)))
    }

    fn compress_multiple(mut self, blocks: &[GenericArray<u8, Sha256BlockSize>]) -> Self {
        sha2::compress256(&mut self.0, blocks);
        self
    }

    fn output(self) -> H256 {
        let mut output = H256::default();

        for (o, s) in output.as_bytes_mut().chunks_exact_mut(4).zip(self.0) {
            o.copy_from_slice(&s.to_be_bytes());
        }

        output
    }
}

/// SHA-256 of arbitrary bytes. Used for content identities of serialized objects.
#[must_use]
pub fn hash_bytes(bytes: impl AsRef<[u8]>) -> H256 {
    H256(Sha256::digest(bytes.as_ref()).into())
}

#[inline]
#[must_use]
pub fn hash_256(bytes: H256) -> H256 {
    let mut block = BLOCK_WITH_PADDING_FOR_256_BITS;
    block[..32].copy_from_slice(bytes.as_bytes());

    Sha256State::default().compress_single(block).output()
}

#[inline]
#[must_use]
pub fn hash_256_64(a: H256, b: u64) -> H256 {
    let mut block = BLOCK_WITH_PADDING_FOR_320_BITS;
    block[..32].copy_from_slice(a.as_bytes());
    block[32..32 + 8].copy_from_slice(&b.to_le_bytes());

    Sha256State::default().compress_single(block).output()
}

#[inline]
#[must_use]
pub fn hash_256_256(left: H256, right: H256) -> H256 {
    let mut block = GenericArray::default();
    block[..32].copy_from_slice(left.as_bytes());
    block[32..].copy_from_slice(right.as_bytes());

    let padding_block = *GenericArray::from_slice(&PADDING_BLOCK_FOR_512_BITS);

    Sha256State::default()
        .compress_multiple(&[block, padding_block])
        .output()
}

/// Merkle root of transaction digests.
///
/// Leaves are hashed pairwise level by level. An odd node at the end of a level is carried up
/// unchanged. The root of an empty list is the zero hash.
#[must_use]
pub fn merkle_root(leaves: impl IntoIterator<Item = H256>) -> H256 {
    let mut level = leaves.into_iter().collect::<Vec<_>>();

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match *pair {
                [left, right] => hash_256_256(left, right),
                [single] => single,
                _ => unreachable!("chunks(2) yields one or two elements"),
            })
            .collect();
    }

    level.pop().unwrap_or_default()
}
