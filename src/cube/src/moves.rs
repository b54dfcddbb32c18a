use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// The six faces of the cube, in the fixed U, D, F, B, L, R order used by
/// the serialization and by every move table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Face {
    Up = 0,
    Down = 1,
    Front = 2,
    Back = 3,
    Left = 4,
    Right = 5,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::Up,
        Face::Down,
        Face::Front,
        Face::Back,
        Face::Left,
        Face::Right,
    ];

    /// The face on the opposite side of the cube. Turns of opposite faces
    /// commute.
    #[must_use]
    pub fn opposite(self) -> Face {
        match self {
            Face::Up => Face::Down,
            Face::Down => Face::Up,
            Face::Front => Face::Back,
            Face::Back => Face::Front,
            Face::Left => Face::Right,
            Face::Right => Face::Left,
        }
    }

    /// Single-letter notation name.
    #[must_use]
    pub fn letter(self) -> char {
        match self {
            Face::Up => 'U',
            Face::Down => 'D',
            Face::Front => 'F',
            Face::Back => 'B',
            Face::Left => 'L',
            Face::Right => 'R',
        }
    }
}

/// One of the 18 face turns in standard notation: `U` is a clockwise
/// quarter turn of the up face (looking at that face), `U'` its inverse and
/// `U2` the half turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Move {
    U,
    UPrime,
    U2,
    D,
    DPrime,
    D2,
    F,
    FPrime,
    F2,
    B,
    BPrime,
    B2,
    L,
    LPrime,
    L2,
    R,
    RPrime,
    R2,
}

use Move::{
    B2, BPrime, D2, DPrime, F2, FPrime, L2, LPrime, R2, RPrime, U2, UPrime, B, D, F, L, R, U,
};

impl Move {
    /// Every move the cube accepts, indexed by [`Move::index`].
    pub const ALL: [Move; 18] = [
        U, UPrime, U2, D, DPrime, D2, F, FPrime, F2, B, BPrime, B2, L, LPrime, L2, R, RPrime, R2,
    ];

    /// The 12 quarter turns, in the fixed order the search branches over.
    pub const QUARTER_TURNS: [Move; 12] =
        [U, UPrime, D, DPrime, F, FPrime, B, BPrime, L, LPrime, R, RPrime];

    /// The face this move turns.
    #[must_use]
    pub fn face(self) -> Face {
        match self {
            U | UPrime | U2 => Face::Up,
            D | DPrime | D2 => Face::Down,
            F | FPrime | F2 => Face::Front,
            B | BPrime | B2 => Face::Back,
            L | LPrime | L2 => Face::Left,
            R | RPrime | R2 => Face::Right,
        }
    }

    /// The move that undoes this one: `inv(F) = F'`, `inv(F') = F`,
    /// `inv(F2) = F2`.
    #[must_use]
    pub fn inverse(self) -> Move {
        match self {
            U => UPrime,
            UPrime => U,
            D => DPrime,
            DPrime => D,
            F => FPrime,
            FPrime => F,
            B => BPrime,
            BPrime => B,
            L => LPrime,
            LPrime => L,
            R => RPrime,
            RPrime => R,
            half => half,
        }
    }

    /// Stable position in [`Move::ALL`], also the one-byte wire encoding
    /// used when a solution path is broadcast between peers.
    #[must_use]
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Inverse of [`Move::index`].
    #[must_use]
    pub fn from_index(index: u8) -> Option<Move> {
        Move::ALL.get(usize::from(index)).copied()
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self {
            UPrime | DPrime | FPrime | BPrime | LPrime | RPrime => "'",
            U2 | D2 | F2 | B2 | L2 | R2 => "2",
            _ => "",
        };
        write!(f, "{}{}", self.face().letter(), suffix)
    }
}

/// A move token outside the 18-token alphabet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid move: {0:?}")]
pub struct ParseMoveError(pub String);

impl FromStr for Move {
    type Err = ParseMoveError;

    fn from_str(s: &str) -> Result<Move, ParseMoveError> {
        Move::ALL
            .iter()
            .copied()
            .find(|m| m.to_string() == s)
            .ok_or_else(|| ParseMoveError(s.to_owned()))
    }
}
