use axum::extract::{FromRef, Query, State};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::chat::client::snowflake;
use crate::db::queries;
use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "gamenight_session";
const STATE_TTL_SECS: u64 = 600;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/logout", post(logout))
}

#[derive(Debug, Deserialize)]
struct LoginQuery {
    redirect_uri: String,
}

/// Hand the client the platform authorization URL plus a one-time state
/// token. The token round-trips through the platform and is burned on
/// callback.
async fn login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let state_token = random_token();

    let mut redis = state.redis.clone();
    redis::cmd("SET")
        .arg(format!("oauth_state:{state_token}"))
        .arg(&query.redirect_uri)
        .arg("EX")
        .arg(STATE_TTL_SECS)
        .query_async::<()>(&mut redis)
        .await
        .map_err(|e| anyhow::anyhow!("state store failed: {e}"))?;

    let authorization_url = format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope=identify%20guilds&state={}",
        state.config.chat.authorize_url,
        state.config.chat.client_id,
        urlencoding::encode(&query.redirect_uri),
        state_token,
    );

    Ok(Json(serde_json::json!({
        "authorization_url": authorization_url,
        "state": state_token,
    })))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: String,
    state: String,
}

async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, ApiError> {
    // Burn the state token; replays get a clean 400.
    let mut redis = state.redis.clone();
    let redirect_uri: Option<String> = redis::cmd("GETDEL")
        .arg(format!("oauth_state:{}", query.state))
        .query_async(&mut redis)
        .await
        .unwrap_or(None);
    let redirect_uri =
        redirect_uri.ok_or_else(|| ApiError::InvalidInput("Unknown or expired state".into()))?;

    let tokens = state
        .chat
        .exchange_code(
            &state.config.chat.client_id,
            &state.config.chat.client_secret,
            &query.code,
            &redirect_uri,
        )
        .await?;

    let identity = state.chat.current_user(&tokens.access_token).await?;
    let discord_id = snowflake(&identity.id)
        .ok_or_else(|| ApiError::InvalidInput("Malformed user id from platform".into()))?;

    let user = queries::upsert_user(
        &state.db,
        Uuid::now_v7(),
        discord_id,
        &identity.username,
        identity.global_name.as_deref(),
        identity.avatar.as_deref(),
    )
    .await?;

    let session_token = random_token();
    let session = SessionData {
        user_id: user.id,
        discord_id,
        access_token: tokens.access_token,
    };
    redis::cmd("SET")
        .arg(format!("session:{}", hash_token(&session_token)))
        .arg(serde_json::to_string(&session).map_err(anyhow::Error::from)?)
        .arg("EX")
        .arg(state.config.scheduler.session_ttl_secs)
        .query_async::<()>(&mut redis)
        .await
        .map_err(|e| anyhow::anyhow!("session store failed: {e}"))?;

    let cookie = Cookie::build((SESSION_COOKIE, session_token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    Ok((
        jar.add(cookie),
        Redirect::to(&state.config.frontend.base_url),
    ))
}

async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let mut redis = state.redis.clone();
        let _: Result<(), _> = redis::cmd("DEL")
            .arg(format!("session:{}", hash_token(cookie.value())))
            .query_async(&mut redis)
            .await;
    }
    Ok((
        jar.remove(Cookie::from(SESSION_COOKIE)),
        Json(serde_json::json!({ "logged_out": true })),
    ))
}

// ── Session extractor ──────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct SessionData {
    user_id: Uuid,
    discord_id: i64,
    access_token: String,
}

/// The authenticated requester: resolved from the HTTP-only session cookie,
/// stored server-side keyed by the token's SHA-256.
pub struct SessionUser {
    pub user_id: Uuid,
    pub discord_id: i64,
    pub access_token: String,
}

impl<S> axum::extract::FromRequestParts<S> for SessionUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let app_state = AppState::from_ref(state);

            let jar = CookieJar::from_headers(&parts.headers);
            let token = jar
                .get(SESSION_COOKIE)
                .map(|c| c.value().to_string())
                .ok_or(ApiError::Unauthorized)?;

            let mut redis = app_state.redis.clone();
            let raw: Option<String> = redis::cmd("GET")
                .arg(format!("session:{}", hash_token(&token)))
                .query_async(&mut redis)
                .await
                .unwrap_or(None);

            let session: SessionData = raw
                .and_then(|s| serde_json::from_str(&s).ok())
                .ok_or(ApiError::Unauthorized)?;

            Ok(SessionUser {
                user_id: session.user_id,
                discord_id: session.discord_id,
                access_token: session.access_token,
            })
        }
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_long_random_hex() {
        let a = random_token();
        let b = random_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hashes_are_stable_and_token_free() {
        let token = random_token();
        assert_eq!(hash_token(&token), hash_token(&token));
        assert!(!hash_token(&token).contains(&token));
    }
}
