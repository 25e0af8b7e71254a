pub mod client;
pub mod entity;
pub mod myenergi;
pub mod sensor;
pub mod settings;
pub mod setup;
pub mod snapshot;

pub use client::*;
pub use entity::*;
pub use settings::*;
pub use setup::*;
pub use snapshot::*;
