pub mod cache;
pub mod key;
pub mod response_cache;

pub use cache::*;
pub use key::*;
pub use response_cache::*;
