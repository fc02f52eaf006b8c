use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::types::PieceKind;

/// Deterministic infinite piece stream for one room. The stream is made of
/// consecutive 7-piece bags; bag `i` is a Fisher–Yates permutation of the
/// seven kinds drawn from a PRNG seeded by (room seed, i). Every player in
/// the room reads the same stream through their own cursor.
#[derive(Clone, Debug)]
pub struct PieceBag {
    seed: u64,
    stream: Vec<PieceKind>,
}

impl PieceBag {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            stream: Vec::new(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The kind at stream index `cursor`, generating bags as needed.
    pub fn kind_at(&mut self, cursor: usize) -> PieceKind {
        while self.stream.len() <= cursor {
            let bag_index = (self.stream.len() / 7) as u64;
            self.stream.extend_from_slice(&shuffled_bag(self.seed, bag_index));
        }
        self.stream[cursor]
    }
}

fn shuffled_bag(seed: u64, bag_index: u64) -> [PieceKind; 7] {
    let mut rng = ChaCha8Rng::seed_from_u64(
        seed ^ bag_index.wrapping_mul(0x9E37_79B9_7F4A_7C15),
    );
    let mut kinds = PieceKind::all();
    kinds.shuffle(&mut rng);
    kinds
}
