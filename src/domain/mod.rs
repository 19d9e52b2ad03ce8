pub mod game;
pub mod market;
pub mod odds;
pub mod signal;

pub use game::*;
pub use market::*;
pub use signal::*;
