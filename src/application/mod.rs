mod application;
mod console_listener;
mod runtime_config;

pub use application::{Application, ApplicationError};
pub use console_listener::ConsoleListener;
pub use runtime_config::RuntimeConfig;
