mod bits;
mod buffer;
mod error;
mod generator;
mod time;
mod worker;

pub use crate::bits::*;
pub use crate::buffer::*;
pub use crate::error::*;
pub use crate::generator::*;
pub use crate::time::*;
pub use crate::worker::*;
