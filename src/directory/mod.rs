pub mod teams;
pub mod ui;
pub mod users;

pub use teams::{configure_teams_routes, Team, TeamResponse};
pub use ui::configure_directory_ui_routes;
pub use users::{configure_users_routes, User, UserProfile};
