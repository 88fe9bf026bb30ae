pub mod automation;
pub mod cli;
pub mod diff;
pub mod refresh;
pub mod repository;
pub mod watch;
