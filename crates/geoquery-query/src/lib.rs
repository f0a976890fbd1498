pub mod executor;
pub mod places;

pub use executor::*;
pub use places::*;
