pub mod autostart;
pub mod health_sweep;
