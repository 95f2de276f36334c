mod padding;
mod policy;
mod ring;

pub use padding::*;
pub use policy::*;
pub use ring::*;
