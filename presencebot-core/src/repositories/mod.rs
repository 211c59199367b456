// src/repositories/mod.rs

pub mod json;

pub use json::{JsonActiveHolderStore, JsonConfigStore, JsonCredentialStore, JsonStores};
