pub mod sqlite;

pub use sqlite::{
    DatabaseManager, SqliteJobRepository, SqliteNodeRepository, SqliteTaskRepository,
};
