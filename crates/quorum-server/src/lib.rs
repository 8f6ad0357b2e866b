pub mod application;
pub mod problem;
pub mod server;

pub use application::Application;
pub use problem::{Problem, ProblemBody};
