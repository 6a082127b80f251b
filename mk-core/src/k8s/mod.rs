mod gvk;
mod util;

pub use gvk::*;
pub use util::*;
