pub mod directory;
pub use self::directory::*;

#[path = "sessions.rs"]
mod sessions_tables;
pub use self::sessions_tables::*;

#[path = "projects.rs"]
mod projects_tables;
pub use self::projects_tables::*;

#[path = "tasks.rs"]
mod tasks_tables;
pub use self::tasks_tables::*;
