use std::fmt;

use crate::engine::apply::RulesError;
use crate::rules::Variant;
use crate::types::Player;

/// Full game position: one seed count per cell plus the side to move.
///
/// Terminal positions are stored post-sweep (see `engine::apply`), so a
/// terminal state has every pit empty and all seeds in the two stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GameState {
    pub variant: Variant,
    pub cells: Vec<u8>,
    pub to_move: Player,
}

impl GameState {
    #[inline]
    pub fn new(variant: Variant, cells: Vec<u8>, to_move: Player) -> Self {
        debug_assert_eq!(cells.len(), variant.cell_count());
        Self {
            variant,
            cells,
            to_move,
        }
    }

    /// Seeds still in pits, excluding both stores. Weakly decreasing across
    /// moves; the retrograde phase iterates this quantity upward.
    #[inline]
    pub fn seed_level(&self) -> u16 {
        let mut level: u16 = 0;
        for side in [Player::A, Player::B] {
            for i in self.variant.pit_range(side) {
                level += u16::from(self.cells[i]);
            }
        }
        level
    }

    #[inline]
    pub fn side_empty(&self, player: Player) -> bool {
        self.variant.pit_range(player).all(|i| self.cells[i] == 0)
    }

    /// A position is terminal once either side's pits are all empty. Because
    /// `apply_move` sweeps at end of game, stored terminals have both sides
    /// empty.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.side_empty(Player::A) || self.side_empty(Player::B)
    }

    /// Legal moves for the side to move: its non-empty pits, by ascending
    /// board index. An empty list means the position is terminal.
    pub fn legal_moves(&self) -> Vec<u8> {
        let mut moves = Vec::with_capacity(self.variant.pits as usize);
        for i in self.variant.pit_range(self.to_move) {
            if self.cells[i] > 0 {
                moves.push(i as u8);
            }
        }
        moves
    }

    /// Pack into the compact byte encoding: `cell_bits` bits per cell in board
    /// order, then one side-to-move bit, all LSB-first within each byte.
    pub fn pack(&self) -> Vec<u8> {
        let bits = self.variant.cell_bits();
        let mut out = vec![0u8; self.variant.packed_len()];
        let mut off = 0usize;
        for &value in &self.cells {
            debug_assert!(bits == 8 || value < (1 << bits));
            for bit in 0..bits {
                if value & (1 << bit) != 0 {
                    out[off >> 3] |= 1 << (off & 7);
                }
                off += 1;
            }
        }
        if self.to_move == Player::B {
            out[off >> 3] |= 1 << (off & 7);
        }
        out
    }
}

impl fmt::Display for GameState {
    /// Board rendering with B's pits reversed on top, so both rows read in
    /// each side's sowing direction:
    ///
    /// ```text
    ///        4   4   4
    /// [  0]             [  0]
    ///        4   4   4
    /// side to move: A
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.variant;
        let row = |idxs: Vec<usize>| {
            idxs.iter()
                .map(|&i| format!("{:>3}", self.cells[i]))
                .collect::<Vec<_>>()
                .join(" ")
        };
        let b_row = row(v.pit_range(Player::B).rev().collect());
        let a_row = row(v.pit_range(Player::A).collect());
        writeln!(f, "       {b_row}")?;
        writeln!(
            f,
            "[{:>3}]  {}  [{:>3}]",
            self.cells[v.store(Player::B)],
            " ".repeat(b_row.len()),
            self.cells[v.store(Player::A)],
        )?;
        writeln!(f, "       {a_row}")?;
        write!(f, "side to move: {:?}", self.to_move)
    }
}

/// Exact inverse of [`GameState::pack`] for the given variant.
pub fn unpack(packed: &[u8], variant: Variant) -> Result<GameState, RulesError> {
    if packed.len() != variant.packed_len() {
        return Err(RulesError::MalformedState(format!(
            "packed state is {} bytes, expected {} for Kalah({},{})",
            packed.len(),
            variant.packed_len(),
            variant.pits,
            variant.seeds
        )));
    }
    let bits = variant.cell_bits();
    let mut cells = Vec::with_capacity(variant.cell_count());
    let mut off = 0usize;
    for _ in 0..variant.cell_count() {
        let mut value = 0u8;
        for bit in 0..bits {
            if packed[off >> 3] & (1 << (off & 7)) != 0 {
                value |= 1 << bit;
            }
            off += 1;
        }
        cells.push(value);
    }
    let to_move = if packed[off >> 3] & (1 << (off & 7)) != 0 {
        Player::B
    } else {
        Player::A
    };
    Ok(GameState::new(variant, cells, to_move))
}

#[inline]
pub fn legal_moves(state: &GameState) -> Vec<u8> {
    state.legal_moves()
}

#[inline]
pub fn is_terminal(state: &GameState) -> bool {
    state.is_terminal()
}
