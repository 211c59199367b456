// src/lib.rs

pub mod cache;
pub mod http;
pub mod platforms;
pub mod repositories;
pub mod rotation;
pub mod samplers;
pub mod services;
pub mod session;
pub mod tasks;
pub mod template;
pub mod test_utils;
pub mod utils;

pub use presencebot_common::error::Error;
pub use http::{DefaultHttpClient, HttpClient};
