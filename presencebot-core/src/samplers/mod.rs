pub mod system;
pub mod weather;

pub use system::{SystemSampler, SystemSnapshot};
pub use weather::{WeatherSampler, WeatherSnapshot};
