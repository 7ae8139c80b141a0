mod biquad;
mod delay;
mod gain;
mod pan;

pub use biquad::*;
pub use delay::*;
pub use gain::*;
pub use pan::*;
