use std::time::Duration;

use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ChatConfig;
use crate::error::ApiError;

// ── Wire models ────────────────────────────────────────
// Snowflakes arrive as strings on the wire; `snowflake()` parses them where
// the platform id meets our BIGINT columns.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiUser {
    pub id: String,
    pub username: String,
    pub global_name: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiGuild {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub owner: bool,
    pub owner_id: Option<String>,
    pub permissions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiChannel {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRole {
    pub id: String,
    pub name: String,
    pub position: i32,
    pub permissions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMember {
    pub user: Option<ApiUser>,
    pub nick: Option<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage {
    pub id: String,
    pub channel_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
}

bitflags::bitflags! {
    /// Platform permission bits, the two we authorize on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u64 {
        const ADMINISTRATOR = 1 << 3;
        const MANAGE_GUILD = 1 << 5;
    }
}

pub fn parse_permissions(raw: Option<&str>) -> Permissions {
    raw.and_then(|s| s.parse::<u64>().ok())
        .map(Permissions::from_bits_truncate)
        .unwrap_or(Permissions::empty())
}

pub fn snowflake(raw: &str) -> Option<i64> {
    raw.parse().ok()
}

// ── Token handling ─────────────────────────────────────

/// Bot tokens are three dot-separated segments whose first segment is the
/// base64 of the application's numeric id; OAuth access tokens are opaque.
/// The auth scheme follows from the shape, so one client serves both.
pub fn auth_header(token: &str) -> String {
    let parts: Vec<&str> = token.splitn(3, '.').collect();
    if parts.len() == 3 {
        let decoded = base64::engine::general_purpose::STANDARD_NO_PAD
            .decode(parts[0])
            .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(parts[0]));
        if let Ok(bytes) = decoded {
            if !bytes.is_empty() && bytes.iter().all(u8::is_ascii_digit) {
                return format!("Bot {token}");
            }
        }
    }
    format!("Bearer {token}")
}

// ── Client ─────────────────────────────────────────────

const CACHE_TTL_GUILD_SECS: u64 = 300;
const CACHE_TTL_MEMBER_SECS: u64 = 60;

/// Chat-platform REST client. Reads go through a short-TTL redis cache; cache
/// loss only costs a refetch. All methods surface transport failures as
/// `ApiError::Upstream` so HTTP handlers map them to 503.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    redis: redis::aio::ConnectionManager,
    api_base: String,
    bot_token: String,
    application_id: String,
}

impl Client {
    pub fn new(config: &ChatConfig, redis: redis::aio::ConnectionManager) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("reqwest client");
        Self {
            http,
            redis,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            application_id: config.client_id.clone(),
        }
    }

    // ── OAuth ──────────────────────────────────────────

    pub async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthTokens, ApiError> {
        let response = self
            .http
            .post(format!("{}/oauth2/token", self.api_base))
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(upstream)?;

        if !response.status().is_success() {
            return Err(ApiError::InvalidInput("OAuth code exchange failed".into()));
        }
        response.json().await.map_err(upstream)
    }

    /// Identity of the token's owner. Used with OAuth bearer tokens during
    /// login; the shape-based auth header makes it work for the bot too.
    pub async fn current_user(&self, token: &str) -> Result<ApiUser, ApiError> {
        self.get_fresh(&format!("{}/users/@me", self.api_base), token)
            .await
    }

    pub async fn user_guilds(&self, token: &str, discord_id: i64) -> Result<Vec<ApiGuild>, ApiError> {
        self.cached_get(
            &format!("chat:user_guilds:{discord_id}"),
            CACHE_TTL_MEMBER_SECS,
            &format!("{}/users/@me/guilds", self.api_base),
            token,
        )
        .await
    }

    // ── Guild reads (bot token, cached) ────────────────

    pub async fn bot_guilds(&self) -> Result<Vec<ApiGuild>, ApiError> {
        let token = self.bot_token.clone();
        self.cached_get(
            "chat:bot_guilds",
            CACHE_TTL_GUILD_SECS,
            &format!("{}/users/@me/guilds", self.api_base),
            &token,
        )
        .await
    }

    pub async fn guild(&self, guild_id: i64) -> Result<ApiGuild, ApiError> {
        let token = self.bot_token.clone();
        self.cached_get(
            &format!("chat:guild:{guild_id}"),
            CACHE_TTL_GUILD_SECS,
            &format!("{}/guilds/{guild_id}", self.api_base),
            &token,
        )
        .await
    }

    pub async fn guild_channels(&self, guild_id: i64) -> Result<Vec<ApiChannel>, ApiError> {
        let token = self.bot_token.clone();
        self.cached_get(
            &format!("chat:channels:{guild_id}"),
            CACHE_TTL_GUILD_SECS,
            &format!("{}/guilds/{guild_id}/channels", self.api_base),
            &token,
        )
        .await
    }

    pub async fn guild_roles(&self, guild_id: i64) -> Result<Vec<ApiRole>, ApiError> {
        let token = self.bot_token.clone();
        self.cached_get(
            &format!("chat:roles:{guild_id}"),
            CACHE_TTL_GUILD_SECS,
            &format!("{}/guilds/{guild_id}/roles", self.api_base),
            &token,
        )
        .await
    }

    /// `None` for non-members; the API layer turns that into a 404.
    pub async fn guild_member(
        &self,
        guild_id: i64,
        discord_id: i64,
    ) -> Result<Option<ApiMember>, ApiError> {
        let cache_key = format!("chat:member:{guild_id}:{discord_id}");
        if let Some(hit) = self.cache_read::<Option<ApiMember>>(&cache_key).await {
            return Ok(hit);
        }

        let url = format!("{}/guilds/{guild_id}/members/{discord_id}", self.api_base);
        let response = self.request_with_retry(&url, &self.bot_token.clone()).await?;

        let member = if response.status() == reqwest::StatusCode::NOT_FOUND {
            None
        } else if response.status().is_success() {
            Some(response.json::<ApiMember>().await.map_err(upstream)?)
        } else {
            return Err(ApiError::Upstream(format!(
                "member fetch returned {}",
                response.status()
            )));
        };

        self.cache_write(&cache_key, &member, CACHE_TTL_MEMBER_SECS).await;
        Ok(member)
    }

    pub async fn guild_members(&self, guild_id: i64) -> Result<Vec<ApiMember>, ApiError> {
        let token = self.bot_token.clone();
        self.cached_get(
            &format!("chat:members:{guild_id}"),
            CACHE_TTL_MEMBER_SECS,
            &format!("{}/guilds/{guild_id}/members?limit=1000", self.api_base),
            &token,
        )
        .await
    }

    // ── Messages & DMs (bot token, uncached) ───────────

    pub async fn create_message(
        &self,
        channel_id: i64,
        payload: &serde_json::Value,
    ) -> Result<ApiMessage, ApiError> {
        let response = self
            .http
            .post(format!("{}/channels/{channel_id}/messages", self.api_base))
            .header("Authorization", auth_header(&self.bot_token))
            .json(payload)
            .send()
            .await
            .map_err(upstream)?;

        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "message create returned {}",
                response.status()
            )));
        }
        response.json().await.map_err(upstream)
    }

    /// `Ok(false)` when the message no longer exists. Stale-state: the caller
    /// logs and moves on.
    pub async fn edit_message(
        &self,
        channel_id: i64,
        message_id: i64,
        payload: &serde_json::Value,
    ) -> Result<bool, ApiError> {
        let response = self
            .http
            .patch(format!(
                "{}/channels/{channel_id}/messages/{message_id}",
                self.api_base
            ))
            .header("Authorization", auth_header(&self.bot_token))
            .json(payload)
            .send()
            .await
            .map_err(upstream)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "message edit returned {}",
                response.status()
            )));
        }
        Ok(true)
    }

    /// `Ok(false)` when the recipient cannot receive DMs (closed DMs, left
    /// the guild). Not an error; the notification is simply undeliverable.
    pub async fn send_dm(
        &self,
        discord_id: i64,
        payload: &serde_json::Value,
    ) -> Result<bool, ApiError> {
        let response = self
            .http
            .post(format!("{}/users/@me/channels", self.api_base))
            .header("Authorization", auth_header(&self.bot_token))
            .json(&json!({ "recipient_id": discord_id.to_string() }))
            .send()
            .await
            .map_err(upstream)?;

        if !response.status().is_success() {
            return Ok(false);
        }
        let dm: ApiChannel = response.json().await.map_err(upstream)?;
        let Some(channel_id) = snowflake(&dm.id) else {
            return Ok(false);
        };

        let response = self
            .http
            .post(format!("{}/channels/{channel_id}/messages", self.api_base))
            .header("Authorization", auth_header(&self.bot_token))
            .json(payload)
            .send()
            .await
            .map_err(upstream)?;
        Ok(response.status().is_success())
    }

    /// Interaction callbacks run against the interaction token, not the bot
    /// token, and must land within the platform's 3-second window.
    pub async fn interaction_callback(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        payload: &serde_json::Value,
    ) -> Result<(), ApiError> {
        let response = self
            .http
            .post(format!(
                "{}/interactions/{interaction_id}/{interaction_token}/callback",
                self.api_base
            ))
            .json(payload)
            .send()
            .await
            .map_err(upstream)?;

        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "interaction callback returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Follow-up message after a deferred acknowledgement.
    pub async fn interaction_followup(
        &self,
        interaction_token: &str,
        payload: &serde_json::Value,
    ) -> Result<(), ApiError> {
        let response = self
            .http
            .post(format!(
                "{}/webhooks/{}/{interaction_token}",
                self.api_base, self.application_id
            ))
            .json(payload)
            .send()
            .await
            .map_err(upstream)?;

        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "interaction followup returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    // ── Internals ──────────────────────────────────────

    async fn get_fresh<T: DeserializeOwned>(&self, url: &str, token: &str) -> Result<T, ApiError> {
        let response = self.request_with_retry(url, token).await?;
        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }
        response.json().await.map_err(upstream)
    }

    async fn cached_get<T: DeserializeOwned + Serialize>(
        &self,
        cache_key: &str,
        ttl_secs: u64,
        url: &str,
        token: &str,
    ) -> Result<T, ApiError> {
        if let Some(hit) = self.cache_read::<T>(cache_key).await {
            return Ok(hit);
        }

        let value: T = self.get_fresh(url, token).await?;
        self.cache_write(cache_key, &value, ttl_secs).await;
        Ok(value)
    }

    /// One bounded retry on rate limit or 5xx. Transient failures are retried
    /// inside the boundary call, never across handler boundaries.
    async fn request_with_retry(
        &self,
        url: &str,
        token: &str,
    ) -> Result<reqwest::Response, ApiError> {
        let auth = auth_header(token);
        let first = self
            .http
            .get(url)
            .header("Authorization", &auth)
            .send()
            .await
            .map_err(upstream)?;

        let status = first.status();
        if status != reqwest::StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() {
            return Ok(first);
        }

        let delay = first
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(1.0)
            .min(3.0);
        tokio::time::sleep(Duration::from_secs_f64(delay)).await;

        self.http
            .get(url)
            .header("Authorization", &auth)
            .send()
            .await
            .map_err(upstream)
    }

    async fn cache_read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut redis = self.redis.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut redis)
            .await
            .unwrap_or(None);
        raw.and_then(|s| serde_json::from_str(&s).ok())
    }

    async fn cache_write<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let Ok(raw) = serde_json::to_string(value) else {
            return;
        };
        let mut redis = self.redis.clone();
        let _: Result<(), _> = redis::cmd("SET")
            .arg(key)
            .arg(raw)
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut redis)
            .await;
    }
}

fn upstream(e: reqwest::Error) -> ApiError {
    ApiError::Upstream(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_tokens_get_the_bot_scheme() {
        // "123456789012345678" base64-encoded, then two opaque segments.
        let encoded =
            base64::engine::general_purpose::STANDARD_NO_PAD.encode("123456789012345678");
        let token = format!("{encoded}.XyZabc.def-ghi_jkl");
        assert_eq!(auth_header(&token), format!("Bot {token}"));
    }

    #[test]
    fn oauth_tokens_get_the_bearer_scheme() {
        assert_eq!(
            auth_header("zxcvbnmasdfghjkl"),
            "Bearer zxcvbnmasdfghjkl"
        );
        // Dotted but not id-shaped: still a bearer token.
        assert_eq!(auth_header("a.b.c"), "Bearer a.b.c");
    }

    #[test]
    fn permission_bits_parse_from_the_wire_string() {
        let perms = parse_permissions(Some("8"));
        assert!(perms.contains(Permissions::ADMINISTRATOR));
        assert_eq!(parse_permissions(None), Permissions::empty());
        assert_eq!(parse_permissions(Some("not-a-number")), Permissions::empty());
    }
}
