pub mod device;
pub mod hub;

pub use device::*;
pub use hub::*;
