pub mod command_checker;
pub mod verdict;

pub use command_checker::CommandChecker;
pub use verdict::{Action, DecidingStage, Verdict};
