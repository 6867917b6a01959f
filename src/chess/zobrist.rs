use crate::{macros::cfor, rng::XorShiftState};

/// Zobrist key tables.
///
/// Filled from a fixed-seed xorshift generator at compile time, so the
/// hash of any given position is identical across runs and platforms.
/// Castling is keyed per rook-start square (the castling state is a set
/// of rook squares, not a four-flag mask), and en passant is keyed by
/// file alone.
const fn init_zobrist() -> ([[u64; 64]; 12], [u64; 64], [u64; 8], u64) {
    let mut state = XorShiftState::new();
    let mut piece_keys = [[0; 64]; 12];
    cfor!(let mut piece = 0; piece < 12; piece += 1; {
        cfor!(let mut sq = 0; sq < 64; sq += 1; {
            let key;
            (key, state) = state.next_self();
            piece_keys[piece][sq] = key;
        });
    });
    let mut castle_keys = [0; 64];
    cfor!(let mut sq = 0; sq < 64; sq += 1; {
        let key;
        (key, state) = state.next_self();
        castle_keys[sq] = key;
    });
    let mut ep_keys = [0; 8];
    cfor!(let mut file = 0; file < 8; file += 1; {
        let key;
        (key, state) = state.next_self();
        ep_keys[file] = key;
    });
    let (side_key, _) = state.next_self();
    (piece_keys, castle_keys, ep_keys, side_key)
}

pub static PIECE_KEYS: [[u64; 64]; 12] = init_zobrist().0;
pub static CASTLE_KEYS: [u64; 64] = init_zobrist().1;
pub static EP_KEYS: [u64; 8] = init_zobrist().2;
pub const SIDE_KEY: u64 = init_zobrist().3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_keys_distinct() {
        let mut keys: Vec<u64> = PIECE_KEYS.iter().flatten().copied().collect();
        keys.extend_from_slice(&CASTLE_KEYS);
        keys.extend_from_slice(&EP_KEYS);
        keys.push(SIDE_KEY);
        let len_before = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), len_before);
    }
}
