use crate::grid::Grid;
use crate::scalar::Scalar;

// Canonical direction order: up, down, left, right in row/column space.
// The index into this array is the only addressing mode for per-direction
// slots; persisted state relies on it staying fixed.
pub const DELTAS: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

pub fn delta_index(dx: i32, dy: i32) -> usize {
    DELTAS
        .iter()
        .position(|&(px, py)| px == dx && py == dy)
        .unwrap_or_else(|| panic!("invalid delta ({dx}, {dy})"))
}

pub trait DirectionalField<T: Scalar> {
    fn alloc(grid: Grid) -> Self;

    // Some((rows, cols)) when the storage has a fixed compile-time footprint.
    fn capacity() -> Option<(usize, usize)> {
        None
    }

    fn at(&self, x: usize, y: usize, slot: usize) -> T;
    fn at_mut(&mut self, x: usize, y: usize, slot: usize) -> &mut T;
    fn get_array(&self, x: usize, y: usize) -> [T; 4];
    fn set_array(&mut self, x: usize, y: usize, values: [T; 4]);
    fn reset(&mut self);

    fn get(&self, x: usize, y: usize, dx: i32, dy: i32) -> T {
        self.at(x, y, delta_index(dx, dy))
    }

    fn get_mut(&mut self, x: usize, y: usize, dx: i32, dy: i32) -> &mut T {
        self.at_mut(x, y, delta_index(dx, dy))
    }

    fn add(&mut self, x: usize, y: usize, dx: i32, dy: i32, dv: T) -> T {
        let slot = self.get_mut(x, y, dx, dy);
        *slot = *slot + dv;
        *slot
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DynDirField<T> {
    grid: Grid,
    data: Vec<[T; 4]>,
}

impl<T: Scalar> DirectionalField<T> for DynDirField<T> {
    fn alloc(grid: Grid) -> Self {
        Self {
            grid,
            data: vec![[T::ZERO; 4]; grid.size()],
        }
    }

    fn at(&self, x: usize, y: usize, slot: usize) -> T {
        self.data[self.grid.idx(x, y)][slot]
    }

    fn at_mut(&mut self, x: usize, y: usize, slot: usize) -> &mut T {
        &mut self.data[self.grid.idx(x, y)][slot]
    }

    fn get_array(&self, x: usize, y: usize) -> [T; 4] {
        self.data[self.grid.idx(x, y)]
    }

    fn set_array(&mut self, x: usize, y: usize, values: [T; 4]) {
        self.data[self.grid.idx(x, y)] = values;
    }

    fn reset(&mut self) {
        self.data.fill([T::ZERO; 4]);
    }
}

// Compile-time-sized variant for engines with known maximal dimensions.
// Cells beyond the live rows x cols stay zeroed and untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct StaticDirField<T, const N: usize, const K: usize> {
    data: [[[T; 4]; K]; N],
}

impl<T: Scalar, const N: usize, const K: usize> DirectionalField<T> for StaticDirField<T, N, K> {
    fn alloc(_grid: Grid) -> Self {
        Self {
            data: [[[T::ZERO; 4]; K]; N],
        }
    }

    fn capacity() -> Option<(usize, usize)> {
        Some((N, K))
    }

    fn at(&self, x: usize, y: usize, slot: usize) -> T {
        self.data[x][y][slot]
    }

    fn at_mut(&mut self, x: usize, y: usize, slot: usize) -> &mut T {
        &mut self.data[x][y][slot]
    }

    fn get_array(&self, x: usize, y: usize) -> [T; 4] {
        self.data[x][y]
    }

    fn set_array(&mut self, x: usize, y: usize, values: [T; 4]) {
        self.data[x][y] = values;
    }

    fn reset(&mut self) {
        for plane in &mut self.data {
            for cell in plane.iter_mut() {
                *cell = [T::ZERO; 4];
            }
        }
    }
}
