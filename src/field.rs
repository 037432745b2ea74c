use crate::error::{Result, SimError};
use crate::grid::Grid;

pub const WALL: u8 = b'#';
pub const AIR: u8 = b'.';

#[derive(Clone, Debug, PartialEq)]
pub struct CellGrid<T> {
    grid: Grid,
    data: Vec<T>,
}

impl<T: Copy> CellGrid<T> {
    pub fn new(grid: Grid, fill: T) -> Self {
        let data = vec![fill; grid.size()];
        Self { grid, data }
    }

    pub fn from_rows(grid: Grid, rows: &[Vec<T>]) -> Self {
        assert_eq!(rows.len(), grid.rows(), "cell grid row count mismatch");
        let mut data = Vec::with_capacity(grid.size());
        for row in rows {
            assert_eq!(row.len(), grid.cols(), "cell grid row length mismatch");
            data.extend_from_slice(row);
        }
        Self { grid, data }
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[self.grid.idx(x, y)]
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        &mut self.data[self.grid.idx(x, y)]
    }

    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let i = self.grid.idx(x, y);
        self.data[i] = value;
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn copy_from(&mut self, other: &Self) {
        assert_eq!(self.grid, other.grid, "cell grid mismatch");
        self.data.copy_from_slice(&other.data);
    }
}

// Parsed form of a field file: dimensions, gravity, the character grid and
// the density overrides from the trailing `C = value` section.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescription {
    pub rows: usize,
    pub cols: usize,
    pub gravity: f64,
    pub cells: Vec<Vec<u8>>,
    pub densities: Vec<(u8, f64)>,
}

impl FieldDescription {
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();

        let header = lines
            .next()
            .ok_or_else(|| SimError::InvalidField("empty field file".into()))?;
        let mut dims = header.split_whitespace();
        let rows = parse_dim(dims.next(), header)?;
        let cols = parse_dim(dims.next(), header)?;
        if rows == 0 || cols == 0 {
            return Err(SimError::InvalidField(format!(
                "field dimensions must be positive, got {rows}x{cols}"
            )));
        }

        let gravity_line = lines
            .next()
            .ok_or_else(|| SimError::InvalidField("missing gravity line".into()))?;
        let gravity = gravity_line.trim().parse::<f64>().map_err(|_| {
            SimError::InvalidField(format!("malformed gravity value {gravity_line:?}"))
        })?;

        let mut cells = Vec::with_capacity(rows);
        for x in 0..rows {
            let line = lines.next().ok_or_else(|| {
                SimError::InvalidField(format!("expected {rows} field rows, found {x}"))
            })?;
            if line.len() != cols {
                return Err(SimError::InvalidField(format!(
                    "field row {x} has length {} (expected {cols})",
                    line.len()
                )));
            }
            cells.push(line.as_bytes().to_vec());
        }

        if cells.iter().flatten().all(|&c| c == WALL) {
            return Err(SimError::InvalidField(
                "field contains no non-wall cell".into(),
            ));
        }

        let mut densities = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            densities.push(parse_density_line(line)?);
        }

        Ok(Self {
            rows,
            cols,
            gravity,
            cells,
            densities,
        })
    }
}

fn parse_dim(token: Option<&str>, header: &str) -> Result<usize> {
    token
        .and_then(|t| t.parse::<usize>().ok())
        .ok_or_else(|| SimError::InvalidField(format!("malformed dimension header {header:?}")))
}

pub fn parse_density_line(line: &str) -> Result<(u8, f64)> {
    let malformed = || SimError::InvalidField(format!("malformed density override {line:?}"));
    let mut parts = line.split_whitespace();
    let symbol = parts.next().ok_or_else(malformed)?;
    let equals = parts.next().ok_or_else(malformed)?;
    let value = parts.next().ok_or_else(malformed)?;
    if symbol.len() != 1 || equals != "=" || parts.next().is_some() {
        return Err(malformed());
    }
    let value = value.parse::<f64>().map_err(|_| malformed())?;
    Ok((symbol.as_bytes()[0], value))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOX_FIELD: &str = "\
4 4
0.1
####
#..#
#.w#
####

w = 2.5
";

    #[test]
    fn parses_dimensions_gravity_and_cells() {
        let desc = FieldDescription::parse(BOX_FIELD).unwrap();
        assert_eq!(desc.rows, 4);
        assert_eq!(desc.cols, 4);
        assert_eq!(desc.gravity, 0.1);
        assert_eq!(desc.cells[2], b"#.w#".to_vec());
    }

    #[test]
    fn parses_density_overrides_and_skips_blank_lines() {
        let desc = FieldDescription::parse(BOX_FIELD).unwrap();
        assert_eq!(desc.densities, vec![(b'w', 2.5)]);
    }

    #[test]
    fn rejects_ragged_rows() {
        let text = "2 3\n0.0\n###\n##\n";
        let err = FieldDescription::parse(text).unwrap_err();
        assert!(matches!(err, SimError::InvalidField(_)));
    }

    #[test]
    fn rejects_zero_dimensions() {
        let err = FieldDescription::parse("0 5\n0.0\n").unwrap_err();
        assert!(matches!(err, SimError::InvalidField(_)));
    }

    #[test]
    fn rejects_all_wall_field() {
        let text = "2 2\n0.0\n##\n##\n";
        let err = FieldDescription::parse(text).unwrap_err();
        assert!(matches!(err, SimError::InvalidField(_)));
    }

    #[test]
    fn rejects_malformed_density_line() {
        let text = "2 2\n0.0\n#.\n##\nw 2.5\n";
        let err = FieldDescription::parse(text).unwrap_err();
        assert!(matches!(err, SimError::InvalidField(_)));
    }

    #[test]
    fn cell_grid_round_trips_values() {
        let grid = Grid::new(2, 3);
        let mut cells = CellGrid::new(grid, 0u64);
        cells.set(1, 2, 9);
        assert_eq!(cells.get(1, 2), 9);
        *cells.get_mut(0, 0) += 5;
        assert_eq!(cells.get(0, 0), 5);
    }
}
