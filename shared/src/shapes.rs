//! The seven tetromino outlines and the random pools blocks draw from.

use crate::geometry::{Polygon, Vector2};
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};
use std::fmt;

/// Side length of one tetromino cell in world units.
pub const BLOCK_CELL_SIZE: f32 = 20.0;

pub const COLOURS: [&str; 7] = ["red", "blue", "green", "yellow", "purple", "orange", "cyan"];

pub const ROTATIONS: [f32; 4] = [0.0, FRAC_PI_2, PI, 3.0 * FRAC_PI_2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeType {
    I,
    J,
    L,
    O,
    S,
    T,
    Z,
}

impl ShapeType {
    pub const ALL: [ShapeType; 7] = [
        ShapeType::I,
        ShapeType::J,
        ShapeType::L,
        ShapeType::O,
        ShapeType::S,
        ShapeType::T,
        ShapeType::Z,
    ];

    /// Outline in cell units, counter-clockwise.
    fn cells(self) -> &'static [(f32, f32)] {
        match self {
            ShapeType::I => &[(0.0, 0.0), (4.0, 0.0), (4.0, 1.0), (0.0, 1.0)],
            ShapeType::O => &[(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)],
            ShapeType::T => &[
                (0.0, 0.0),
                (3.0, 0.0),
                (3.0, 1.0),
                (2.0, 1.0),
                (2.0, 2.0),
                (1.0, 2.0),
                (1.0, 1.0),
                (0.0, 1.0),
            ],
            ShapeType::L => &[
                (0.0, 0.0),
                (1.0, 0.0),
                (1.0, 2.0),
                (2.0, 2.0),
                (2.0, 3.0),
                (0.0, 3.0),
            ],
            ShapeType::J => &[
                (1.0, 0.0),
                (2.0, 0.0),
                (2.0, 3.0),
                (0.0, 3.0),
                (0.0, 2.0),
                (1.0, 2.0),
            ],
            ShapeType::S => &[
                (1.0, 0.0),
                (3.0, 0.0),
                (3.0, 1.0),
                (2.0, 1.0),
                (2.0, 2.0),
                (0.0, 2.0),
                (0.0, 1.0),
                (1.0, 1.0),
            ],
            ShapeType::Z => &[
                (0.0, 0.0),
                (2.0, 0.0),
                (2.0, 1.0),
                (3.0, 1.0),
                (3.0, 2.0),
                (1.0, 2.0),
                (1.0, 1.0),
                (0.0, 1.0),
            ],
        }
    }

    /// Outline in world units. Not centred; body creation re-centres it.
    pub fn outline(self) -> Polygon {
        self.cells()
            .iter()
            .map(|&(x, y)| Vector2::new(x * BLOCK_CELL_SIZE, y * BLOCK_CELL_SIZE))
            .collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShapeType::I => "I",
            ShapeType::J => "J",
            ShapeType::L => "L",
            ShapeType::O => "O",
            ShapeType::S => "S",
            ShapeType::T => "T",
            ShapeType::Z => "Z",
        }
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::polygon_area;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_every_shape_covers_four_cells() {
        let cell_area = BLOCK_CELL_SIZE * BLOCK_CELL_SIZE;
        for shape in ShapeType::ALL {
            assert_approx_eq!(polygon_area(&shape.outline()), 4.0 * cell_area, 1e-3);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ShapeType::S.to_string(), "S");
        assert_eq!(ShapeType::ALL.len(), 7);
    }
}
