pub mod app_identity;
pub mod loader;
pub mod redact;
pub mod schema;

pub use loader::{default_config_path, load_config, load_default_config, save_config};
pub use redact::flatten_and_redact;
pub use schema::{
    AppConfig, GatewayConfig, IdentityConfig, MemoryConfig, NotificationsConfig, ProviderConfig,
    SchedulerConfig, SecurityConfig,
};
