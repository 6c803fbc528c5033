use crate::state::GameState;
use crate::types::Player;

/// Store margin from A's perspective: A's store minus B's store.
///
/// On a terminal (swept) state this is the exact game payoff; the retrograde
/// phase propagates it unchanged, so every stored score is A-relative.
#[inline]
pub fn payoff(state: &GameState) -> i8 {
    let a = i16::from(state.cells[state.variant.store(Player::A)]);
    let b = i16::from(state.cells[state.variant.store(Player::B)]);
    (a - b) as i8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Variant;

    #[test]
    fn payoff_is_store_margin() {
        let v = Variant::new(2, 1);
        let s = GameState::new(v, vec![0, 0, 3, 0, 0, 1], Player::B);
        assert_eq!(payoff(&s), 2);
        let t = GameState::new(v, vec![0, 0, 1, 0, 0, 3], Player::A);
        assert_eq!(payoff(&t), -2);
    }

    #[test]
    fn opening_payoff_is_zero() {
        let v = Variant::new(6, 4);
        assert_eq!(payoff(&v.opening()), 0);
    }
}
