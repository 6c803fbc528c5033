use thiserror::Error;

use crate::state::GameState;
use crate::types::Player;

/// Rules-engine precondition violations. These indicate a programmer error in
/// the caller, not a recoverable condition; drivers abort the solve on them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    #[error("illegal move: index {pit} is not a playable pit for the side to move")]
    IllegalMove { pit: u8 },
    #[error("malformed state: {0}")]
    MalformedState(String),
}

/// Apply a move as a pure transform: returns the successor state.
///
/// 1. Lift all seeds from the chosen pit.
/// 2. Sow one per cell counterclockwise, skipping the opponent's store on
///    every wrap.
/// 3. Last seed in the mover's store grants an extra turn.
/// 4. Last seed in an own, previously empty pit captures the opposite pit's
///    seeds (plus the landing seed) when the opposite pit is non-empty.
/// 5. If either side's pits are now all empty, each side's remaining pit
///    seeds are swept into that side's own store and the position is
///    terminal.
pub fn apply_move(state: &GameState, pit: u8) -> Result<GameState, RulesError> {
    let variant = state.variant;
    let pit_idx = pit as usize;
    let mover = state.to_move;
    if !variant.is_pit_of(pit_idx, mover) || state.cells[pit_idx] == 0 {
        return Err(RulesError::IllegalMove { pit });
    }

    let mut cells = state.cells.clone();
    let cell_count = variant.cell_count();
    let own_store = variant.store(mover);
    let opponent_store = variant.store(mover.other());

    let mut in_hand = cells[pit_idx];
    cells[pit_idx] = 0;
    let mut pos = pit_idx;
    while in_hand > 0 {
        pos = (pos + 1) % cell_count;
        if pos == opponent_store {
            continue;
        }
        cells[pos] += 1;
        in_hand -= 1;
    }

    let mut to_move = mover.other();
    if pos == own_store {
        // Extra turn: the mover keeps the move.
        to_move = mover;
    } else if variant.is_pit_of(pos, mover) && cells[pos] == 1 {
        let opposite = variant.opposite(pos);
        if cells[opposite] > 0 {
            let captured = cells[opposite] + 1;
            cells[opposite] = 0;
            cells[pos] = 0;
            cells[own_store] += captured;
        }
    }

    let a_empty = variant.pit_range(Player::A).all(|i| cells[i] == 0);
    let b_empty = variant.pit_range(Player::B).all(|i| cells[i] == 0);
    if a_empty || b_empty {
        // End-of-game sweep: each side keeps its own remaining pit seeds.
        for side in [Player::A, Player::B] {
            let store = variant.store(side);
            for i in variant.pit_range(side) {
                let taken = cells[i];
                cells[i] = 0;
                cells[store] += taken;
            }
        }
    }

    Ok(GameState::new(variant, cells, to_move))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Variant;

    #[test]
    fn extra_turn_when_landing_in_own_store() {
        let v = Variant::new(2, 1);
        let next = apply_move(&v.opening(), 1).expect("legal");
        assert_eq!(next.cells, vec![1, 0, 1, 1, 1, 0]);
        assert_eq!(next.to_move, Player::A);
    }

    #[test]
    fn sowing_skips_opponent_store_across_wraps() {
        let v = Variant::new(1, 1);
        // Pit 0 holds every seed; the walk passes B's store twice.
        let s = GameState::new(v, vec![5, 0, 0, 0], Player::A);
        let next = apply_move(&s, 0).expect("legal");
        assert_eq!(next.cells, vec![1, 2, 2, 0]);
        assert_eq!(next.to_move, Player::B);
    }

    #[test]
    fn capture_takes_opposite_pit_and_landing_seed() {
        let v = Variant::new(3, 1);
        let s = GameState::new(v, vec![1, 0, 2, 0, 3, 1, 1, 0], Player::A);
        let next = apply_move(&s, 0).expect("legal");
        // Lands in empty pit 1; opposite pit 5 held one seed.
        assert_eq!(next.cells, vec![0, 0, 2, 2, 3, 0, 1, 0]);
        assert_eq!(next.to_move, Player::B);
    }

    #[test]
    fn no_capture_when_opposite_pit_empty() {
        let v = Variant::new(3, 1);
        let s = GameState::new(v, vec![1, 0, 2, 0, 3, 0, 1, 0], Player::A);
        let next = apply_move(&s, 0).expect("legal");
        assert_eq!(next.cells, vec![0, 1, 2, 0, 3, 0, 1, 0]);
        assert_eq!(next.to_move, Player::B);
    }

    #[test]
    fn sweep_credits_the_side_still_holding_seeds() {
        let v = Variant::new(2, 1);
        // A's capture empties A's side; B's remaining pit seed goes to B.
        let s = GameState::new(v, vec![1, 0, 1, 1, 1, 0], Player::A);
        let next = apply_move(&s, 0).expect("legal");
        assert_eq!(next.cells, vec![0, 0, 3, 0, 0, 1]);
        assert!(next.is_terminal());
    }

    #[test]
    fn empty_pit_is_an_illegal_move() {
        let v = Variant::new(2, 1);
        let s = GameState::new(v, vec![0, 1, 0, 1, 1, 0], Player::A);
        assert_eq!(apply_move(&s, 0), Err(RulesError::IllegalMove { pit: 0 }));
        // Opponent pits and stores are illegal too.
        assert_eq!(apply_move(&s, 3), Err(RulesError::IllegalMove { pit: 3 }));
        assert_eq!(apply_move(&s, 2), Err(RulesError::IllegalMove { pit: 2 }));
    }

    #[test]
    fn seed_conservation_across_moves() {
        let v = Variant::new(3, 2);
        let mut s = v.opening();
        let total = v.total_seeds();
        for _ in 0..20 {
            let moves = s.legal_moves();
            let Some(&mv) = moves.first() else { break };
            s = apply_move(&s, mv).expect("legal");
            let sum: u16 = s.cells.iter().map(|&c| u16::from(c)).sum();
            assert_eq!(sum, total);
        }
    }
}
