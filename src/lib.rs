// Intercom Unlock - chime detection and one-time door unlock
//
// Listens for the intercom's two-tone chime, sends the resident a single-use
// unlock link, and moves the door latch servo when that link is used.

pub mod actuator;
pub mod analysis;
pub mod app;
pub mod audio;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod detection;
pub mod error;
pub mod http;
pub mod notify;
pub mod telemetry;
pub mod unlock;

pub use app::App;
pub use config::AppConfig;
