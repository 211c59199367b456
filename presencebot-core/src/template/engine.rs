// File: presencebot-core/src/template/engine.rs
//
// Placeholder expansion. Font blocks go first, then plain placeholders; the
// pair of passes is repeated until the text stops changing.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::warn;

use super::context::TemplateContext;
use super::fonts::apply_font;

pub const MAX_PASSES: usize = 5;

static FONT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{NF(\d)\((.*?)\)\}").expect("static regex"));
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("static regex"));
static CALL_FORM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)\((.+)\)$").expect("static regex"));

/// Renders `text` against `ctx`. Absent in, absent out.
pub fn render(text: Option<&str>, ctx: &TemplateContext) -> Option<String> {
    text.map(|t| render_str(t, ctx))
}

pub fn render_str(text: &str, ctx: &TemplateContext) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_PASSES {
        let next = render_pass(&current, ctx);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn render_pass(text: &str, ctx: &TemplateContext) -> String {
    let styled = FONT_BLOCK.replace_all(text, |caps: &Captures| {
        let inner = expand_placeholders(&caps[2], ctx);
        let variant = caps[1].parse::<u32>().unwrap_or(0);
        apply_font(variant, &inner).unwrap_or_else(|| inner.into_owned())
    });
    expand_placeholders(&styled, ctx).into_owned()
}

fn expand_placeholders<'t>(text: &'t str, ctx: &TemplateContext) -> Cow<'t, str> {
    PLACEHOLDER.replace_all(text, |caps: &Captures| {
        resolve(&caps[1], ctx).unwrap_or_else(|| caps[0].to_string())
    })
}

/// Resolves the inside of one `{...}`. `None` leaves the placeholder as written.
fn resolve(key: &str, ctx: &TemplateContext) -> Option<String> {
    if let Some(caps) = CALL_FORM.captures(key) {
        if let Some(result) = ctx.call(&caps[1], caps[2].trim()) {
            return invocation(key, result);
        }
    }

    if let Some((name, rest)) = key.split_once('=') {
        let (variant, params) = rest.split_once(':').unwrap_or((rest, ""));
        let composite = format!("{name}={variant}");
        if let Some(result) = ctx.call(&composite, params) {
            return invocation(key, result);
        }
    }

    ctx.value(key)
}

fn invocation(key: &str, result: Result<String, crate::Error>) -> Option<String> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("(Template) placeholder '{{{}}}' failed: {:?}", key, e);
            None
        }
    }
}
