//! Domain models for the trauma board.

mod patient;
mod section;
mod view;

pub use patient::*;
pub use section::*;
pub use view::*;
