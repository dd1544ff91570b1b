pub mod enums;
pub mod schema;
pub mod state;
pub mod utils;

pub use enums::*;
pub use schema::*;
pub use utils::{create_conn, run_migrations, DbPool};
