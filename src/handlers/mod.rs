// Public handlers (root, health, example1) need no token; example2 routes sit
// behind the access gate and receive the caller's tenant store.
pub mod example;
pub mod system;

pub use system::{health, root};
