pub mod attribute;
pub mod catalog;
pub mod descriptor;
pub mod error;
pub mod projection;

pub use attribute::*;
pub use catalog::*;
pub use descriptor::*;
pub use error::*;
pub use projection::*;
