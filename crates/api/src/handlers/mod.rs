pub mod health;
pub mod jobs;
pub mod nodes;
pub mod tasks;
