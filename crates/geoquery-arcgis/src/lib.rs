pub mod client;
pub mod geojson;
pub mod request;
pub mod transport;

pub use client::*;
pub use geojson::*;
pub use request::*;
pub use transport::*;
