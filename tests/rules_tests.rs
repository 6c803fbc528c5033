use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64;

use kalahari::{apply_move, unpack, GameState, Player, Variant, ZobristTable};

/// Kalah(1,1) opening. A's only move lands in its store for an extra turn,
/// which empties A's side; B's remaining seed is swept to B's store and the
/// game is a draw.
#[test]
fn kalah_1_1_opening_trace() {
    let v = Variant::new(1, 1);
    let opening = v.opening();
    assert_eq!(opening.cells, vec![1, 0, 1, 0]);
    assert_eq!(opening.legal_moves(), vec![0]);

    let next = apply_move(&opening, 0).expect("legal");
    assert_eq!(next.cells, vec![0, 1, 0, 1]);
    assert_eq!(next.to_move, Player::A, "landing in own store keeps the turn");
    assert!(next.is_terminal());
    assert_eq!(next.seed_level(), 0);
    assert_eq!(kalahari::payoff(&next), 0);
}

/// A sow longer than the board wraps, skips the opponent store on the way,
/// and can still end in the mover's store for an extra turn.
#[test]
fn long_sow_wraps_skips_opponent_store_and_earns_extra_turn() {
    let v = Variant::new(2, 3);
    let s = GameState::new(v, vec![7, 1, 0, 1, 1, 2], Player::A);
    let next = apply_move(&s, 0).expect("legal");
    // Seven seeds land on 1,2,3,4,0,1,2; index 5 (B's store) is skipped.
    assert_eq!(next.cells, vec![1, 3, 2, 2, 2, 2]);
    assert_eq!(next.to_move, Player::A);
}

#[test]
fn b_side_capture_uses_the_same_opposite_formula() {
    // Indices for p=3: pits 0..3 / store 3 / pits 4..7 / store 7.
    // B plays pit 4 and lands in its empty pit 5; the opposite pit is
    // 2*3 - 5 = 1, holding three seeds.
    let v = Variant::new(3, 2);
    let s = GameState::new(v, vec![2, 3, 0, 1, 1, 0, 2, 0], Player::B);
    let next = apply_move(&s, 4).expect("legal");
    assert_eq!(next.cells, vec![2, 0, 0, 1, 0, 0, 2, 4]);
    assert_eq!(next.to_move, Player::A);
}

#[test]
fn capture_that_empties_the_mover_triggers_the_sweep() {
    // p=2: B's capture on pit 4 drains B's last pits; A's remaining seed is
    // swept to A's store and the game ends.
    let v = Variant::new(2, 2);
    let s = GameState::new(v, vec![3, 1, 2, 1, 0, 1], Player::B);
    let next = apply_move(&s, 3).expect("legal");
    assert_eq!(next.cells, vec![0, 0, 3, 0, 0, 5]);
    assert!(next.is_terminal());
    assert_eq!(kalahari::payoff(&next), -2);
}

/// Random reachable states: conservation, codec round-trip, move bounds, and
/// monotone seed level, checked along seeded random walks.
#[test]
fn random_walk_preserves_invariants() {
    let v = Variant::new(3, 2);
    let zobrist = ZobristTable::new(v);
    let total = v.total_seeds();

    for walk in 0..32u64 {
        let mut rng = Pcg64::seed_from_u64(0xA11CE ^ walk);
        let mut state = v.opening();
        for _ in 0..60 {
            let moves = state.legal_moves();
            if moves.is_empty() {
                assert!(state.is_terminal());
                assert_eq!(state.seed_level(), 0);
                break;
            }
            // Moves are the mover's non-empty pits, ascending.
            for window in moves.windows(2) {
                assert!(window[0] < window[1]);
            }
            for &mv in &moves {
                assert!(v.is_pit_of(mv as usize, state.to_move));
                assert!(state.cells[mv as usize] > 0);
            }

            let mv = moves[rng.gen_range(0..moves.len())];
            let before_level = state.seed_level();
            state = apply_move(&state, mv).expect("legal move");

            let sum: u16 = state.cells.iter().map(|&c| u16::from(c)).sum();
            assert_eq!(sum, total, "seed conservation");
            assert!(state.seed_level() <= before_level, "seed level is monotone");

            let packed = state.pack();
            assert_eq!(packed.len(), v.packed_len());
            let back = unpack(&packed, v).expect("unpack");
            assert_eq!(back, state, "pack/unpack round-trip");
            assert_eq!(zobrist.fingerprint(&back), zobrist.fingerprint(&state));
        }
    }
}
