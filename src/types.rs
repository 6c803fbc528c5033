use serde::{Deserialize, Serialize};

/// The two sides of the board. A owns pits `0..p` and the store at index `p`;
/// B owns pits `p+1..2p+1` and the store at index `2p+1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Player {
    A,
    B,
}

impl Player {
    #[inline]
    pub fn other(self) -> Self {
        match self {
            Player::A => Player::B,
            Player::B => Player::A,
        }
    }
}
