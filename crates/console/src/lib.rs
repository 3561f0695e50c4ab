//! Terminal front end for agenx event streams.

pub mod console;
pub mod input;
pub mod render;

pub use console::{Console, ConsoleError};
pub use input::{StdinInput, UserInputManager};
