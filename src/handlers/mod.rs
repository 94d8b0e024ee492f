pub mod health;
pub mod diagnostics;
pub mod room;

pub use health::*;
pub use diagnostics::*;
pub use room::*;
