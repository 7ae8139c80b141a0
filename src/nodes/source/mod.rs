mod marker;
mod noise;
mod table;

pub use marker::*;
pub use noise::*;
pub use table::*;
