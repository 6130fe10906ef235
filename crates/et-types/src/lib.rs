pub mod errors;
pub mod params;
pub mod profile;

pub use errors::*;
pub use params::*;
pub use profile::*;
