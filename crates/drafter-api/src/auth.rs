use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use drafter_db::models::UserRow;
use drafter_types::api::{
    GoogleAuthRequest, LoginRequest, RegisterRequest, TokenResponse, UserResponse,
};

use crate::error::ApiError;
use crate::google::GoogleClaims;
use crate::middleware::Claims;
use crate::state::{AppState, run_blocking};

const REFRESH_COOKIE: &str = "refresh_token";

/// Claims carried by the long-lived refresh cookie. Narrower than access
/// claims so a refresh token can never pass for an access token.
#[derive(Debug, Serialize, Deserialize)]
struct RefreshClaims {
    sub: Uuid,
    exp: usize,
    token_type: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::InvalidInput(
            "Username must be between 3 and 32 characters".into(),
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::InvalidInput(
            "Password must be at least 8 characters".into(),
        ));
    }
    if !email_is_well_formed(&req.email) {
        return Err(ApiError::InvalidInput("A valid email address is required".into()));
    }

    let db = state.clone();
    let username = req.username.clone();
    if run_blocking(move || db.db.get_user_by_username(&username))
        .await?
        .is_some()
    {
        return Err(ApiError::InvalidInput("Username is already taken".into()));
    }

    let db = state.clone();
    let email = req.email.clone();
    if run_blocking(move || db.db.get_user_by_email(&email))
        .await?
        .is_some()
    {
        return Err(ApiError::InvalidInput("Email is already registered".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let user_id = Uuid::new_v4();

    let db = state.clone();
    let email = req.email.clone();
    let username = req.username.clone();
    let profile_image = state.auth.default_profile_image.clone();
    run_blocking(move || {
        db.db.create_user(
            &user_id.to_string(),
            &email,
            &username,
            &password_hash,
            &profile_image,
            "user",
        )
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id: user_id,
            email: req.email,
            username: req.username,
            profile_image_url: state.auth.default_profile_image.clone(),
            role: "user".to_string(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let db = state.clone();
    let username = req.username.clone();
    let user = run_blocking(move || db.db.get_user_by_username(&username))
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored password hash unreadable: {e}")))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::InvalidCredentials)?;

    let user_id: Uuid = parse_user_id(&user.id)?;
    let access = create_access_token(
        &state.auth.jwt_secret,
        user_id,
        &user.username,
        state.auth.access_token_minutes,
    )?;
    let refresh = create_refresh_token(&state.auth.jwt_secret, user_id, state.auth.refresh_token_days)?;

    Ok((
        jar.add(refresh_cookie(refresh, state.auth.refresh_token_days)),
        Json(TokenResponse::bearer(access)),
    ))
}

/// Exchange a valid refresh cookie for a fresh access token.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .ok_or(ApiError::Unauthorized)?;

    let data = decode::<RefreshClaims>(
        &token,
        &DecodingKey::from_secret(state.auth.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?;

    if data.claims.token_type != "refresh" {
        return Err(ApiError::Unauthorized);
    }

    let user_id = data.claims.sub;
    let db = state.clone();
    let user = run_blocking(move || db.db.get_user_by_id(&user_id.to_string()))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let access = create_access_token(
        &state.auth.jwt_secret,
        user_id,
        &user.username,
        state.auth.access_token_minutes,
    )?;
    Ok(Json(TokenResponse::bearer(access)))
}

/// Sign in with a Google ID token, provisioning a local account on the
/// first visit for that email.
pub async fn google_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<GoogleAuthRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let google_user = state.google.verify(&req.token).await?;

    let user = get_or_provision_google_user(&state, google_user).await?;
    let user_id: Uuid = parse_user_id(&user.id)?;

    let access = create_access_token(
        &state.auth.jwt_secret,
        user_id,
        &user.username,
        state.auth.access_token_minutes,
    )?;
    let refresh = create_refresh_token(&state.auth.jwt_secret, user_id, state.auth.refresh_token_days)?;

    Ok((
        jar.add(refresh_cookie(refresh, state.auth.refresh_token_days)),
        Json(TokenResponse::bearer(access)),
    ))
}

/// Look up the user for a verified Google email, creating one on first
/// sign-in. Idempotent on email: a concurrent first sign-in loses the
/// insert race and falls back to the row the winner created.
pub(crate) async fn get_or_provision_google_user(
    state: &AppState,
    google_user: GoogleClaims,
) -> Result<UserRow, ApiError> {
    let db = state.clone();
    let email = google_user.email.clone();
    if let Some(existing) = run_blocking(move || db.db.get_user_by_email(&email)).await? {
        return Ok(existing);
    }

    let username = generate_username(&google_user.email);
    let password_hash = hash_password(&random_password())?;
    let profile_image = google_user
        .picture
        .unwrap_or_else(|| state.auth.default_profile_image.clone());
    let user_id = Uuid::new_v4();

    let db = state.clone();
    let email = google_user.email;
    let created = run_blocking(move || {
        match db.db.create_user(
            &user_id.to_string(),
            &email,
            &username,
            &password_hash,
            &profile_image,
            "user",
        ) {
            Ok(()) => db.db.get_user_by_id(&user_id.to_string()),
            Err(_) => db.db.get_user_by_email(&email),
        }
    })
    .await?;

    created.ok_or_else(|| ApiError::Internal(anyhow::anyhow!("google user provisioning failed")))
}

fn parse_user_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("malformed user id in store: {raw}")))
}

/// Structural check only: one '@', a non-empty local part, a dotted
/// domain, and no whitespace anywhere.
fn email_is_well_formed(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {e}")))?
        .to_string();
    Ok(hash)
}

fn create_access_token(
    secret: &str,
    user_id: Uuid,
    username: &str,
    minutes: i64,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::minutes(minutes)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn create_refresh_token(secret: &str, user_id: Uuid, days: i64) -> anyhow::Result<String> {
    let claims = RefreshClaims {
        sub: user_id,
        exp: (chrono::Utc::now() + chrono::Duration::days(days)).timestamp() as usize,
        token_type: "refresh".to_string(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn refresh_cookie(token: String, days: i64) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, token))
        .path("/")
        .secure(true)
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(days))
        .build()
}

/// Username for a provisioned Google account: the email's local part
/// with dots stripped, plus a random lowercase suffix for uniqueness.
fn generate_username(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email).replace('.', "");
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();
    format!("{local}{suffix}")
}

/// Throwaway credential for Google-provisioned accounts; never shown to
/// anyone, so the account stays reachable only through Google sign-in.
fn random_password() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}
