pub mod fetch;
pub mod watch;
