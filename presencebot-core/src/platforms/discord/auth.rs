// File: presencebot-core/src/platforms/discord/auth.rs

use std::collections::HashMap;

use tracing::{debug, info};

use presencebot_common::models::Credential;

use super::assets::API_BASE;
use crate::http::HttpClient;
use crate::Error;

/// Checks a token against `GET /users/@me`. A 403 still means the token
/// exists (it just lacks scope), so it counts as valid.
pub async fn validate_token(http: &dyn HttpClient, token: &str) -> Result<bool, Error> {
    let token = token.trim();
    if !Credential::new(token).is_well_formed() {
        return Ok(false);
    }

    let mut headers = HashMap::new();
    // strip anything outside printable ASCII; header values reject it anyway
    let printable: String = token.chars().filter(|c| (' '..='~').contains(c)).collect();
    headers.insert("Authorization".to_string(), printable);
    headers.insert("Content-Type".to_string(), "application/json".to_string());

    let resp = http.get(format!("{API_BASE}/users/@me"), headers).await?;
    match resp.status {
        200..=299 => Ok(true),
        403 => {
            info!("[Discord] token may be valid but lacks permissions");
            Ok(true)
        }
        status => {
            debug!("[Discord] token validation failed with status {}", status);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, MockHttpClient};

    fn answering(status: u16) -> MockHttpClient {
        let mut http = MockHttpClient::new();
        http.expect_get()
            .withf(|url, headers| url.ends_with("/users/@me") && headers.contains_key("Authorization"))
            .returning(move |_, _| Ok(HttpResponse { status, body: "{}".into() }));
        http
    }

    #[tokio::test]
    async fn ok_and_forbidden_are_valid() {
        assert!(validate_token(&answering(200), "a.b.c").await.unwrap());
        assert!(validate_token(&answering(403), "a.b.c").await.unwrap());
        assert!(!validate_token(&answering(401), "a.b.c").await.unwrap());
    }

    #[tokio::test]
    async fn malformed_token_skips_the_request() {
        let http = MockHttpClient::new();
        assert!(!validate_token(&http, "only.two").await.unwrap());
    }
}
