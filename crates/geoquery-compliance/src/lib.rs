pub mod compliance;
pub mod discrepancy;

pub use compliance::*;
pub use discrepancy::*;
