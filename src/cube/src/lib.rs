//! The 3×3×3 cube model: sticker state, the 18 face-turn operators with
//! their inverse algebra, scrambling, a misplaced-sticker heuristic and the
//! 54-character flat serialization.
//!
//! States are cheap by-value snapshots. A search owns a clone, mutates it in
//! place with [`Cube::apply`] and restores on backtrack by applying
//! [`Move::inverse`].

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

mod moves;
mod state;

pub use moves::{Face, Move, ParseMoveError};
pub use state::{Color, Cube, StateError};
