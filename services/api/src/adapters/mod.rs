pub mod db;
pub mod line;

pub use db::DbAdapter;
pub use line::LineMessagingAdapter;
