//! Hex coordinate system using axial coordinates (q, r).
//!
//! The board is a radius-2 hexagon of 19 tiles laid out pointy-top. This module
//! provides the coordinate type plus the pixel geometry the board generator
//! uses to discover shared corners and sides between tiles.

use serde::{Deserialize, Serialize};

/// Radius of the playable board in hex steps
pub const BOARD_RADIUS: i32 = 2;

/// A point in board pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Integer key used to deduplicate corners shared by neighbouring hexes.
    /// Two corners closer than a thousandth of a pixel are the same corner.
    pub fn key(&self) -> (i64, i64) {
        ((self.x * 1000.0).round() as i64, (self.y * 1000.0).round() as i64)
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Axial coordinate for hex grid.
///
/// In axial coordinates:
/// - `q` increases going east (right)
/// - `r` increases going southeast
/// - The third coordinate `s` (not stored) satisfies: q + r + s = 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct HexCoord {
    /// Column (increases going east)
    pub q: i32,
    /// Row (increases going southeast)
    pub r: i32,
}

impl HexCoord {
    /// Create a new hex coordinate
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// The implicit third coordinate (s = -q - r)
    pub const fn s(&self) -> i32 {
        -self.q - self.r
    }

    /// The six neighboring hexes in clockwise order starting from East
    pub fn neighbors(&self) -> [HexCoord; 6] {
        [
            HexCoord::new(self.q + 1, self.r),     // East
            HexCoord::new(self.q + 1, self.r - 1), // NorthEast
            HexCoord::new(self.q, self.r - 1),     // NorthWest
            HexCoord::new(self.q - 1, self.r),     // West
            HexCoord::new(self.q - 1, self.r + 1), // SouthWest
            HexCoord::new(self.q, self.r + 1),     // SouthEast
        ]
    }

    /// Distance to another hex (in hex steps)
    pub fn distance_to(&self, other: &HexCoord) -> u32 {
        let dq = (self.q - other.q).abs();
        let dr = (self.r - other.r).abs();
        let ds = (self.s() - other.s()).abs();
        ((dq + dr + ds) / 2) as u32
    }

    /// Ring index: 0 for the center, 1 for the inner ring, 2 for the rim
    pub fn ring(&self) -> u32 {
        self.distance_to(&HexCoord::default())
    }

    /// One of the six outermost tips of the board hexagon
    pub fn is_board_corner(&self) -> bool {
        self.ring() == BOARD_RADIUS as u32 && (self.q == 0 || self.r == 0 || self.s() == 0)
    }

    /// Center of this hex in pixel space, pointy-top orientation
    pub fn to_pixel(&self, hex_size: f64) -> Point {
        let x = hex_size * 3.0_f64.sqrt() * (self.q as f64 + self.r as f64 / 2.0);
        let y = hex_size * 1.5 * self.r as f64;
        Point::new(x, y)
    }
}

/// All coordinates within `radius` of the origin, sorted by row then column.
pub fn board_coords(radius: i32) -> Vec<HexCoord> {
    let mut coords = Vec::new();
    for q in -radius..=radius {
        for r in -radius..=radius {
            let s = -q - r;
            if q.abs().max(r.abs()).max(s.abs()) <= radius {
                coords.push(HexCoord::new(q, r));
            }
        }
    }
    coords.sort_by_key(|c| (c.r, c.q));
    coords
}

/// Offsets of the six corners from a hex center, clockwise from the top.
pub fn corner_offsets(hex_size: f64) -> [Point; 6] {
    let a = 3.0_f64.sqrt() / 2.0 * hex_size;
    let b = 0.5 * hex_size;
    [
        Point::new(0.0, -hex_size),
        Point::new(a, -b),
        Point::new(a, b),
        Point::new(0.0, hex_size),
        Point::new(-a, b),
        Point::new(-a, -b),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_hex_neighbors() {
        let center = HexCoord::new(0, 0);
        let neighbors = center.neighbors();

        let unique: HashSet<_> = neighbors.iter().collect();
        assert_eq!(unique.len(), 6);

        for neighbor in &neighbors {
            assert_eq!(center.distance_to(neighbor), 1);
        }
    }

    #[test]
    fn test_hex_distance() {
        let a = HexCoord::new(0, 0);
        let b = HexCoord::new(2, -1);
        assert_eq!(a.distance_to(&b), 2);

        let c = HexCoord::new(-3, 3);
        assert_eq!(a.distance_to(&c), 3);
    }

    #[test]
    fn test_board_coords_sorted_and_complete() {
        let coords = board_coords(BOARD_RADIUS);
        assert_eq!(coords.len(), 19);
        assert_eq!(coords[0], HexCoord::new(0, -2));
        assert_eq!(coords[9], HexCoord::new(0, 0));
        assert_eq!(coords[18], HexCoord::new(0, 2));
        for pair in coords.windows(2) {
            assert!((pair[0].r, pair[0].q) < (pair[1].r, pair[1].q));
        }
    }

    #[test]
    fn test_board_corners() {
        let corners: Vec<_> = board_coords(BOARD_RADIUS)
            .into_iter()
            .filter(|c| c.is_board_corner())
            .collect();
        assert_eq!(corners.len(), 6);
        assert!(corners.contains(&HexCoord::new(2, -2)));
        assert!(!HexCoord::new(1, -2).is_board_corner());
        assert!(!HexCoord::new(1, 0).is_board_corner());
    }

    #[test]
    fn test_pixel_layout() {
        let p = HexCoord::new(1, 0).to_pixel(100.0);
        assert!((p.x - 100.0 * 3.0_f64.sqrt()).abs() < 1e-9);
        assert_eq!(p.y, 0.0);

        let p = HexCoord::new(0, 2).to_pixel(100.0);
        assert!((p.x - 100.0 * 3.0_f64.sqrt()).abs() < 1e-9);
        assert_eq!(p.y, 300.0);
    }

    #[test]
    fn test_shared_corners_have_equal_keys() {
        // The East corner pair of the center hex is the West pair of (1, 0)
        let size = 100.0;
        let a = HexCoord::new(0, 0).to_pixel(size);
        let b = HexCoord::new(1, 0).to_pixel(size);
        let offs = corner_offsets(size);
        let a_ne = Point::new(a.x + offs[1].x, a.y + offs[1].y);
        let b_nw = Point::new(b.x + offs[5].x, b.y + offs[5].y);
        assert_eq!(a_ne.key(), b_nw.key());
    }
}
