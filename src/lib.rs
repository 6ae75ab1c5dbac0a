pub mod config;
pub mod messages;
pub mod motion;
pub mod runtime;
pub mod sensor;
pub mod servo;
