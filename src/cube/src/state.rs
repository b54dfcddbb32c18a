use std::fmt;

use rand::Rng;
use thiserror::Error;

use crate::{Face, Move};

/// Sticker colors. The solved cube has white up, yellow down, green front,
/// blue back, orange left and red right.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Color {
    White,
    Yellow,
    Green,
    Blue,
    Orange,
    Red,
}

impl Color {
    /// The color of `face`'s center on a solved cube.
    #[must_use]
    pub fn of_face(face: Face) -> Color {
        match face {
            Face::Up => Color::White,
            Face::Down => Color::Yellow,
            Face::Front => Color::Green,
            Face::Back => Color::Blue,
            Face::Left => Color::Orange,
            Face::Right => Color::Red,
        }
    }

    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Color::White => 'W',
            Color::Yellow => 'Y',
            Color::Green => 'G',
            Color::Blue => 'B',
            Color::Orange => 'O',
            Color::Red => 'R',
        }
    }

    fn from_char(c: char) -> Option<Color> {
        match c {
            'W' => Some(Color::White),
            'Y' => Some(Color::Yellow),
            'G' => Some(Color::Green),
            'B' => Some(Color::Blue),
            'O' => Some(Color::Orange),
            'R' => Some(Color::Red),
            _ => None,
        }
    }
}

/// A malformed flat state string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("state must be 54 characters, got {0}")]
    BadLength(usize),
    #[error("unknown sticker color {0:?}")]
    BadColor(char),
}

/// Sources for the in-place clockwise rotation of a face's nine stickers:
/// `new[i] = old[ROTATE_CW[i]]`. Position 4 is the center and fixed.
const ROTATE_CW: [usize; 9] = [6, 3, 0, 7, 4, 1, 8, 5, 2];
const ROTATE_CCW: [usize; 9] = [2, 5, 8, 1, 4, 7, 0, 3, 6];

/// A strip of three stickers on one face, part of the layer a turn drags
/// along its four adjacent faces.
type Strip = (Face, [usize; 3]);

/// Full cube state: six faces of nine stickers each, row-major with the
/// center at position 4.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Cube {
    faces: [[Color; 9]; 6],
}

impl Default for Cube {
    fn default() -> Cube {
        Cube::solved()
    }
}

impl Cube {
    /// The solved cube: every face uniformly its center color.
    #[must_use]
    pub fn solved() -> Cube {
        Cube {
            faces: Face::ALL.map(|f| [Color::of_face(f); 9]),
        }
    }

    /// Restore the solved state in place.
    pub fn reset(&mut self) {
        *self = Cube::solved();
    }

    /// True iff every sticker matches its face's center.
    #[must_use]
    pub fn is_solved(&self) -> bool {
        self.faces
            .iter()
            .all(|face| face.iter().all(|&sticker| sticker == face[4]))
    }

    /// The nine stickers of `face`, row-major.
    #[must_use]
    pub fn face(&self, face: Face) -> &[Color; 9] {
        &self.faces[face as usize]
    }

    /// The fixed center sticker of `face`.
    #[must_use]
    pub fn center(&self, face: Face) -> Color {
        self.faces[face as usize][4]
    }

    /// A lower bound on the quarter turns left to solve: misplaced
    /// non-center stickers divided by eight. Zero exactly on a face-uniform
    /// cube, so it doubles as a goal test the search never relies on.
    #[must_use]
    pub fn heuristic(&self) -> u32 {
        self.misplaced() / 8
    }

    fn misplaced(&self) -> u32 {
        let mut count = 0;
        for face in &self.faces {
            for (i, &sticker) in face.iter().enumerate() {
                if i != 4 && sticker != face[4] {
                    count += 1;
                }
            }
        }
        count
    }

    /// Apply one face turn in place.
    pub fn apply(&mut self, m: Move) {
        match m {
            Move::U => self.quarter_turn(Face::Up, CYCLE_U),
            Move::UPrime => self.quarter_turn_ccw(Face::Up, CYCLE_U),
            Move::D => self.quarter_turn(Face::Down, CYCLE_D),
            Move::DPrime => self.quarter_turn_ccw(Face::Down, CYCLE_D),
            Move::F => self.quarter_turn(Face::Front, CYCLE_F),
            Move::FPrime => self.quarter_turn_ccw(Face::Front, CYCLE_F),
            Move::B => self.quarter_turn(Face::Back, CYCLE_B),
            Move::BPrime => self.quarter_turn_ccw(Face::Back, CYCLE_B),
            Move::L => self.quarter_turn(Face::Left, CYCLE_L),
            Move::LPrime => self.quarter_turn_ccw(Face::Left, CYCLE_L),
            Move::R => self.quarter_turn(Face::Right, CYCLE_R),
            Move::RPrime => self.quarter_turn_ccw(Face::Right, CYCLE_R),
            Move::U2 | Move::D2 | Move::F2 | Move::B2 | Move::L2 | Move::R2 => {
                let quarter = match m {
                    Move::U2 => Move::U,
                    Move::D2 => Move::D,
                    Move::F2 => Move::F,
                    Move::B2 => Move::B,
                    Move::L2 => Move::L,
                    _ => Move::R,
                };
                self.apply(quarter);
                self.apply(quarter);
            }
        }
    }

    /// Apply a whole sequence in order.
    pub fn apply_all(&mut self, moves: &[Move]) {
        for &m in moves {
            self.apply(m);
        }
    }

    /// Apply `count` moves drawn uniformly from all 18 tokens with a
    /// non-deterministic RNG. Returns the sequence that was applied.
    pub fn scramble(&mut self, count: usize) -> Vec<Move> {
        self.scramble_with(count, &mut rand::rng())
    }

    /// [`Cube::scramble`] with an injected RNG, for deterministic harnesses.
    pub fn scramble_with<R: Rng + ?Sized>(&mut self, count: usize, rng: &mut R) -> Vec<Move> {
        let moves: Vec<Move> = (0..count)
            .map(|_| Move::ALL[rng.random_range(0..Move::ALL.len())])
            .collect();
        self.apply_all(&moves);
        moves
    }

    /// Flat 54-character state, faces in U, D, F, B, L, R order, each
    /// row-major.
    #[must_use]
    pub fn serialize(&self) -> String {
        self.faces
            .iter()
            .flat_map(|face| face.iter().map(|c| c.as_char()))
            .collect()
    }

    /// Parse a [`Cube::serialize`]-shaped string. The alphabet is checked;
    /// reachability is not, so physically impossible positions are accepted
    /// and simply never reach the solved state under search.
    pub fn deserialize(state: &str) -> Result<Cube, StateError> {
        let stickers: Vec<Color> = state
            .chars()
            .map(|c| Color::from_char(c).ok_or(StateError::BadColor(c)))
            .collect::<Result<_, _>>()?;
        let Ok(flat) = <[Color; 54]>::try_from(stickers) else {
            return Err(StateError::BadLength(state.chars().count()));
        };
        let mut cube = Cube::solved();
        for (i, sticker) in flat.into_iter().enumerate() {
            cube.faces[i / 9][i % 9] = sticker;
        }
        Ok(cube)
    }

    fn quarter_turn(&mut self, face: Face, cycle: [Strip; 4]) {
        self.rotate_face(face, &ROTATE_CW);
        self.cycle_strips(cycle);
    }

    fn quarter_turn_ccw(&mut self, face: Face, cycle: [Strip; 4]) {
        self.rotate_face(face, &ROTATE_CCW);
        // Drag the edge layer the other way around.
        let [a, b, c, d] = cycle;
        self.cycle_strips([a, d, c, b]);
    }

    fn rotate_face(&mut self, face: Face, sources: &[usize; 9]) {
        let old = self.faces[face as usize];
        for (i, &src) in sources.iter().enumerate() {
            self.faces[face as usize][i] = old[src];
        }
    }

    /// Cyclically shift four three-sticker strips: the first strip receives
    /// the fourth's stickers, the fourth the third's, and so on.
    fn cycle_strips(&mut self, [(f1, e1), (f2, e2), (f3, e3), (f4, e4)]: [Strip; 4]) {
        let saved = e1.map(|i| self.faces[f1 as usize][i]);
        for k in 0..3 {
            self.faces[f1 as usize][e1[k]] = self.faces[f4 as usize][e4[k]];
            self.faces[f4 as usize][e4[k]] = self.faces[f3 as usize][e3[k]];
            self.faces[f3 as usize][e3[k]] = self.faces[f2 as usize][e2[k]];
            self.faces[f2 as usize][e2[k]] = saved[k];
        }
    }
}

impl fmt::Debug for Cube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cube({})", self.serialize())
    }
}

// The edge layer dragged by each face's clockwise turn, as (face, strip)
// pairs in cycle order.
const CYCLE_U: [Strip; 4] = [
    (Face::Front, [0, 1, 2]),
    (Face::Left, [0, 1, 2]),
    (Face::Back, [0, 1, 2]),
    (Face::Right, [0, 1, 2]),
];
const CYCLE_D: [Strip; 4] = [
    (Face::Front, [6, 7, 8]),
    (Face::Right, [6, 7, 8]),
    (Face::Back, [6, 7, 8]),
    (Face::Left, [6, 7, 8]),
];
const CYCLE_F: [Strip; 4] = [
    (Face::Up, [6, 7, 8]),
    (Face::Right, [0, 3, 6]),
    (Face::Down, [2, 1, 0]),
    (Face::Left, [8, 5, 2]),
];
const CYCLE_B: [Strip; 4] = [
    (Face::Up, [2, 1, 0]),
    (Face::Left, [0, 3, 6]),
    (Face::Down, [6, 7, 8]),
    (Face::Right, [8, 5, 2]),
];
const CYCLE_L: [Strip; 4] = [
    (Face::Up, [0, 3, 6]),
    (Face::Front, [0, 3, 6]),
    (Face::Down, [0, 3, 6]),
    (Face::Back, [8, 5, 2]),
];
const CYCLE_R: [Strip; 4] = [
    (Face::Up, [8, 5, 2]),
    (Face::Back, [0, 3, 6]),
    (Face::Down, [8, 5, 2]),
    (Face::Front, [8, 5, 2]),
];

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn starts_solved() {
        let cube = Cube::solved();
        assert!(cube.is_solved());
        assert_eq!(cube.heuristic(), 0);
    }

    #[test]
    fn reset_restores_solved() {
        let mut cube = Cube::solved();
        cube.scramble(20);
        cube.reset();
        assert!(cube.is_solved());
    }

    #[test]
    fn every_move_undone_by_its_inverse() {
        for m in Move::ALL {
            let mut cube = Cube::solved();
            cube.scramble_with(6, &mut StdRng::seed_from_u64(7));
            let before = cube.clone();
            cube.apply(m);
            cube.apply(m.inverse());
            assert_eq!(cube, before, "{m} then {} did not restore", m.inverse());
        }
    }

    #[test]
    fn four_quarter_turns_are_identity() {
        for m in Move::QUARTER_TURNS {
            let mut cube = Cube::solved();
            for _ in 0..4 {
                cube.apply(m);
            }
            assert!(cube.is_solved(), "{m} four times is not the identity");
        }
    }

    #[test]
    fn half_turn_equals_two_quarter_turns() {
        let pairs = [
            (Move::U2, Move::U),
            (Move::D2, Move::D),
            (Move::F2, Move::F),
            (Move::B2, Move::B),
            (Move::L2, Move::L),
            (Move::R2, Move::R),
        ];
        for (half, quarter) in pairs {
            let mut a = Cube::solved();
            a.apply(half);
            let mut b = Cube::solved();
            b.apply(quarter);
            b.apply(quarter);
            assert_eq!(a, b);

            // Three clockwise quarters match the counter-clockwise turn.
            let mut c = Cube::solved();
            c.apply(quarter.inverse());
            let mut d = Cube::solved();
            for _ in 0..3 {
                d.apply(quarter);
            }
            assert_eq!(c, d);
        }
    }

    #[test]
    fn centers_never_move() {
        let mut cube = Cube::solved();
        cube.scramble_with(40, &mut StdRng::seed_from_u64(99));
        for face in Face::ALL {
            assert_eq!(cube.center(face), Color::of_face(face));
        }
    }

    #[test]
    fn color_census_is_invariant() {
        let mut cube = Cube::solved();
        cube.scramble_with(25, &mut StdRng::seed_from_u64(3));
        let serialized = cube.serialize();
        for color in ['W', 'Y', 'G', 'B', 'O', 'R'] {
            assert_eq!(serialized.chars().filter(|&c| c == color).count(), 9);
        }
    }

    #[test]
    fn serialization_round_trips() {
        let mut cube = Cube::solved();
        cube.scramble_with(15, &mut StdRng::seed_from_u64(42));
        let restored = Cube::deserialize(&cube.serialize()).unwrap();
        assert_eq!(restored, cube);
    }

    #[test]
    fn solved_serialization_is_face_blocks() {
        assert_eq!(
            Cube::solved().serialize(),
            "WWWWWWWWWYYYYYYYYYGGGGGGGGGBBBBBBBBBOOOOOOOOORRRRRRRRR"
        );
    }

    #[test]
    fn deserialize_rejects_bad_input() {
        assert_eq!(
            Cube::deserialize("WWW"),
            Err(StateError::BadLength(3)),
        );
        let mut state = Cube::solved().serialize();
        state.replace_range(0..1, "X");
        assert_eq!(Cube::deserialize(&state), Err(StateError::BadColor('X')));
    }

    #[test]
    fn deserialize_accepts_unreachable_states() {
        // A single swapped sticker pair is not reachable by face turns but
        // is still a well-formed state.
        let mut state: Vec<char> = Cube::solved().serialize().chars().collect();
        state.swap(0, 9);
        let cube = Cube::deserialize(&state.iter().collect::<String>()).unwrap();
        assert!(!cube.is_solved());
    }

    #[test]
    fn heuristic_is_tight_on_single_turns() {
        // One quarter turn misplaces exactly the twelve stickers dragged
        // between adjacent faces, so the bound is 12 / 8 = 1.
        for m in Move::QUARTER_TURNS {
            let mut cube = Cube::solved();
            cube.apply(m);
            assert_eq!(cube.heuristic(), 1, "after {m}");
        }
    }

    #[test]
    fn heuristic_admissible_on_short_scrambles() {
        let scrambles: [&[Move]; 3] = [
            &[Move::R, Move::U],
            &[Move::R, Move::U, Move::RPrime, Move::UPrime],
            &[Move::F, Move::L, Move::D],
        ];
        for scramble in scrambles {
            let mut cube = Cube::solved();
            cube.apply_all(scramble);
            assert!(
                cube.heuristic() <= scramble.len() as u32,
                "h = {} exceeds depth {} for {scramble:?}",
                cube.heuristic(),
                scramble.len()
            );
        }
    }

    #[test]
    fn scramble_returns_applied_sequence() {
        let mut cube = Cube::solved();
        let moves = cube.scramble_with(10, &mut StdRng::seed_from_u64(11));
        assert_eq!(moves.len(), 10);

        let mut replay = Cube::solved();
        replay.apply_all(&moves);
        assert_eq!(replay, cube);
    }
}
