//! Shared value types for the farm planner crates.
//!
//! - [`coord`]: map coordinates and distance
//! - [`units`]: the fixed unit vocabulary and troop vectors
//! - [`session`]: the authenticated game session consumed by transports

pub mod coord;
pub mod session;
pub mod units;

pub use coord::{parse_coord, parse_count, Coord};
pub use session::{Cookie, GameSession};
pub use units::{TroopVector, UnitKind};
