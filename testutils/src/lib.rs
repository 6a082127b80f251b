mod constants;
mod fake;
mod kubeconfig;
mod objs;

pub use constants::*;
pub use fake::*;
pub use kubeconfig::*;
pub use objs::*;
