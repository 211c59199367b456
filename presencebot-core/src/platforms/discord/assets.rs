// File: presencebot-core/src/platforms/discord/assets.rs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::trace;
use url::Url;

use crate::http::HttpClient;
use crate::platforms::{ImageRequest, ImageResolver, ResolvedImages};
use crate::Error;

pub const API_BASE: &str = "https://discord.com/api/v9";

#[derive(Debug, Deserialize)]
struct ExternalAsset {
    url: String,
    external_asset_path: Option<String>,
}

/// Registers arbitrary image URLs as external assets of the application so
/// the gateway will display them.
pub struct DiscordImageResolver {
    http: Arc<dyn HttpClient>,
    api_base: String,
}

impl DiscordImageResolver {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http, api_base: API_BASE.to_string() }
    }

    pub fn with_api_base(http: Arc<dyn HttpClient>, api_base: impl Into<String>) -> Self {
        Self { http, api_base: api_base.into() }
    }
}

fn valid_url(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    Url::parse(raw).ok().map(|_| raw.to_string())
}

/// Attachments on Discord's own CDN are used as they are; everything else
/// goes through the returned proxy path.
fn asset_reference(asset: &ExternalAsset) -> Option<String> {
    if asset.url.contains("attachments") {
        return Some(asset.url.clone());
    }
    asset
        .external_asset_path
        .as_ref()
        .map(|path| format!("mp:{path}"))
}

#[async_trait]
impl ImageResolver for DiscordImageResolver {
    async fn resolve(&self, request: &ImageRequest) -> Result<ResolvedImages, Error> {
        let large = valid_url(request.large.as_deref());
        let small = valid_url(request.small.as_deref());
        if large.is_none() && small.is_none() {
            return Err(Error::NotFound("No Image".into()));
        }

        let urls: Vec<&String> = large.iter().chain(small.iter()).collect();
        let body = serde_json::json!({ "urls": urls }).to_string();
        let endpoint = format!(
            "{}/applications/{}/external-assets",
            self.api_base, request.application_id
        );

        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), request.token.trim().to_string());
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        let resp = self.http.post(endpoint, headers, body).await?;
        if !resp.is_success() {
            return Err(Error::Platform(format!(
                "external-assets returned HTTP {}",
                resp.status
            )));
        }
        let assets: Vec<ExternalAsset> = serde_json::from_str(&resp.body)?;
        trace!("[Discord] external-assets returned {} entries", assets.len());

        let lookup = |wanted: &Option<String>| {
            let wanted = wanted.as_ref()?;
            assets
                .iter()
                .find(|a| &a.url == wanted)
                .and_then(asset_reference)
        };

        let resolved = match assets.len() {
            0 => return Err(Error::NotFound("No Image".into())),
            _ => ResolvedImages {
                large: lookup(&large),
                small: lookup(&small),
            },
        };
        Ok(resolved)
    }
}
