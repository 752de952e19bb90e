pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod webhook;

// Re-export the handlers to make them easily accessible
// to the binary that will build the web server router.
pub use middleware::verify_line_signature;
pub use rest::{
    health_handler, late_reminder_handler, list_users_handler, midday_reminder_handler,
    unchecked_notice_handler,
};
pub use webhook::webhook_handler;
