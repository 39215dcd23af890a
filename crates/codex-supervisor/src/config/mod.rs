mod logging_settings;
mod resilience_settings;
mod server_settings;
mod supervisor_config;

pub use logging_settings::LoggingSettings;
pub use resilience_settings::ResilienceSettings;
pub use server_settings::ServerSettings;
pub use supervisor_config::{CONFIG_FILENAME, CONFIG_VERSION, SupervisorConfig};
