use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Position or offset in pixel units, `x` along columns and `y` along rows.
#[derive(Clone, Debug, Copy, Default, Deserialize, PartialEq, Serialize)]
pub struct Vec2D {
    pub x: f64,
    pub y: f64,
}

impl Vec2D {
    pub const ZERO: Vec2D = Vec2D { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Nearest integer pixel, ties to even on both axes.
    pub fn round_pixel(&self) -> (i64, i64) {
        (self.x.round_ties_even() as i64, self.y.round_ties_even() as i64)
    }
}

impl Add for Vec2D {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}
