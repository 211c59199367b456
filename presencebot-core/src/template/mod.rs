//! Presence template rendering.
//!
//! `{name}` placeholders, `{name=variant:args}` / `{name(args)}` calls and
//! `{NFk(...)}` font blocks, resolved against a [`TemplateContext`] built by
//! [`variables::build_context`].

pub mod context;
pub mod emoji;
pub mod engine;
pub mod fonts;
pub mod variables;

pub use context::{Resolver, TemplateContext};
pub use engine::{render, render_str, MAX_PASSES};
pub use fonts::apply_font;
pub use variables::{build_context, GuildLookup, VariableSources};
