//! Task documents and PR artifacts.

pub mod error;
pub mod pr;
pub mod readme;
pub mod sections;
pub mod verify_log;

pub use error::*;
pub use pr::*;
pub use readme::*;
pub use sections::*;
pub use verify_log::*;
