//! Hexagonal board: "odd-r" offset coordinates (odd rows shifted right) and
//! a row-major occupancy index.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ServiceId;

const EVEN_ROW_OFFSETS: [(i32, i32); 6] = [(-1, -1), (-1, 0), (0, -1), (0, 1), (1, -1), (1, 0)];
const ODD_ROW_OFFSETS: [(i32, i32); 6] = [(-1, 0), (-1, 1), (0, -1), (0, 1), (1, 0), (1, 1)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HexCoord {
    pub row: i32,
    pub col: i32,
}

impl HexCoord {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// The six surrounding cells, which may lie off the board.
    pub fn neighbors(self) -> [HexCoord; 6] {
        let offsets = if self.row & 1 == 0 {
            &EVEN_ROW_OFFSETS
        } else {
            &ODD_ROW_OFFSETS
        };
        offsets.map(|(dr, dc)| HexCoord::new(self.row + dr, self.col + dc))
    }

    fn to_cube(self) -> (i32, i32, i32) {
        let x = self.col - (self.row - (self.row & 1)) / 2;
        let z = self.row;
        (x, -x - z, z)
    }

    /// Hex distance in steps.
    pub fn distance(self, other: HexCoord) -> u32 {
        let (x1, y1, z1) = self.to_cube();
        let (x2, y2, z2) = other.to_cube();
        ((x1 - x2).unsigned_abs() + (y1 - y2).unsigned_abs() + (z1 - z2).unsigned_abs()) / 2
    }

    pub fn is_adjacent(self, other: HexCoord) -> bool {
        self.distance(other) == 1
    }

    /// Same row, `steps` columns to the right.
    pub fn shifted(self, steps: i32) -> HexCoord {
        HexCoord::new(self.row, self.col + steps)
    }
}

impl fmt::Display for HexCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

/// Cell count widened before multiplying so large boards cannot wrap.
fn cell_count(width: u32, height: u32) -> usize {
    usize::try_from(u64::from(width) * u64::from(height)).unwrap_or(usize::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    width: u32,
    height: u32,
    cells: Vec<Option<ServiceId>>,
}

impl Grid {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![None; cell_count(width, height)],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether the cell vector matches the declared dimensions.
    pub fn is_well_formed(&self) -> bool {
        self.cells.len() == cell_count(self.width, self.height)
    }

    pub fn in_bounds(&self, coord: HexCoord) -> bool {
        u32::try_from(coord.row).is_ok_and(|row| row < self.height)
            && u32::try_from(coord.col).is_ok_and(|col| col < self.width)
    }

    fn index(&self, coord: HexCoord) -> Option<usize> {
        if !self.in_bounds(coord) {
            return None;
        }
        let row = usize::try_from(coord.row).ok()?;
        let col = usize::try_from(coord.col).ok()?;
        Some(row * self.width as usize + col)
    }

    pub fn occupant(&self, coord: HexCoord) -> Option<ServiceId> {
        self.index(coord).and_then(|i| self.cells.get(i).copied().flatten())
    }

    /// In bounds and empty.
    pub fn is_free(&self, coord: HexCoord) -> bool {
        self.index(coord)
            .is_some_and(|i| self.cells.get(i).is_some_and(Option::is_none))
    }

    /// Claims a free cell. Returns false when the cell is taken or off the board.
    pub(crate) fn place(&mut self, coord: HexCoord, service: ServiceId) -> bool {
        let Some(slot) = self.index(coord).and_then(|i| self.cells.get_mut(i)) else {
            return false;
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(service);
        true
    }

    pub(crate) fn clear(&mut self, coord: HexCoord) -> Option<ServiceId> {
        self.index(coord)
            .and_then(|i| self.cells.get_mut(i))
            .and_then(Option::take)
    }

    /// Neighbours that lie on the board.
    pub fn neighbors_in_bounds(&self, coord: HexCoord) -> impl Iterator<Item = HexCoord> + '_ {
        coord
            .neighbors()
            .into_iter()
            .filter(move |c| self.in_bounds(*c))
    }

    /// Occupied cells in row-major order.
    pub fn occupied(&self) -> Vec<(HexCoord, ServiceId)> {
        let width = self.width as usize;
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| {
                let service = (*cell)?;
                let row = i32::try_from(i / width).ok()?;
                let col = i32::try_from(i % width).ok()?;
                Some((HexCoord::new(row, col), service))
            })
            .collect()
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }
}
