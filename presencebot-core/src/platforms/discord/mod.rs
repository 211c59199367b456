pub mod assets;
pub mod auth;
pub mod runtime;

pub use assets::DiscordImageResolver;
pub use auth::validate_token;
pub use runtime::{presence_command, DiscordTransport, DiscordTransportFactory};
