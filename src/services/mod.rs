pub mod history;
pub mod refresh;
pub mod scheduler;
