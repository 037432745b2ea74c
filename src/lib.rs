mod dispatch;
mod error;
mod field;
mod fixed;
mod grid;
mod scalar;
mod sim;
mod vec_field;

pub use dispatch::{build_simulation, Simulation, TypeTag};
pub use error::{Result, SimError};
pub use field::{CellGrid, FieldDescription, AIR, WALL};
pub use fixed::{FastFixed, Fixed};
pub use grid::Grid;
pub use scalar::{cvt, Scalar};
pub use sim::{Simulator, DEFAULT_SEED};
pub use vec_field::{delta_index, DirectionalField, DynDirField, StaticDirField, DELTAS};
