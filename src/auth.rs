use anyhow::anyhow;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::PrivateCookieJar;
use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use tracing::warn;
use uuid::Uuid;

use crate::{error::AppError, models::session::Session, models::user::User, state::AppState};

pub const SESSION_COOKIE: &str = "rumbo_session";

/// Ventana de inactividad: a las 48 horas sin actividad la sesión se cierra
/// sola. Se mide desde el último request autenticado.
pub const SESSION_IDLE_HOURS: i64 = 48;

const RESET_TOKEN_HOURS: i64 = 2;

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub email: String,
}

impl AuthenticatedUser {
    fn from_user(user: &User) -> Self {
        Self {
            id: user.id,
            uuid: user.uuid.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Ok(jar) =
            <PrivateCookieJar as FromRequestParts<AppState>>::from_request_parts(parts, state)
                .await
        else {
            return Ok(Self(None));
        };
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Ok(Self(None));
        };

        match session_user(state, cookie.value()).await {
            Ok(user) => Ok(Self(user)),
            Err(err) => {
                warn!("session lookup failed: {err}");
                Ok(Self(None))
            }
        }
    }
}

impl CurrentUser {
    pub fn require_user(&self) -> Result<&AuthenticatedUser, AppError> {
        self.0.as_ref().ok_or(AppError::Unauthorized)
    }

    pub fn is_logged_in(&self) -> bool {
        self.0.is_some()
    }
}

async fn session_user(
    state: &AppState,
    session_id: &str,
) -> Result<Option<AuthenticatedUser>, AppError> {
    let session = sqlx::query_as::<_, Session>(
        "SELECT id, user_id, created_at, last_seen_at FROM sessions WHERE id = ?1",
    )
    .bind(session_id)
    .fetch_optional(&state.db)
    .await?;

    let Some(session) = session else {
        return Ok(None);
    };

    let now = Utc::now();
    if now - session.last_seen_at > Duration::hours(SESSION_IDLE_HOURS) {
        destroy_session(state, &session.id).await?;
        return Ok(None);
    }

    sqlx::query("UPDATE sessions SET last_seen_at = ?1 WHERE id = ?2")
        .bind(now)
        .bind(&session.id)
        .execute(&state.db)
        .await?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
        .bind(session.user_id)
        .fetch_optional(&state.db)
        .await?;

    Ok(user.map(|user| AuthenticatedUser::from_user(&user)))
}

pub async fn register_user(
    state: &AppState,
    name: &str,
    email: &str,
    password: &str,
) -> Result<AuthenticatedUser, AppError> {
    let name = name.trim();
    let email = email.trim().to_lowercase();

    if name.is_empty() {
        return Err(AppError::Validation("Ingresá tu nombre".into()));
    }
    if !email.contains('@') {
        return Err(AppError::Validation("Ingresá un email válido".into()));
    }
    if password.len() < 8 {
        return Err(AppError::Validation(
            "La contraseña debe tener al menos 8 caracteres".into(),
        ));
    }

    let existing: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?1 OR name = ?2")
            .bind(&email)
            .bind(name)
            .fetch_one(&state.db)
            .await?;
    if existing > 0 {
        return Err(AppError::Validation(
            "Ya existe una cuenta con ese nombre o email".into(),
        ));
    }

    let uuid = Uuid::new_v4().to_string();
    let password_hash = hash_password(password)?;
    let now = Utc::now();

    let result = sqlx::query(
        "INSERT INTO users (uuid, name, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&uuid)
    .bind(name)
    .bind(&email)
    .bind(&password_hash)
    .bind(now)
    .execute(&state.db)
    .await?;

    Ok(AuthenticatedUser {
        id: result.last_insert_rowid(),
        uuid,
        name: name.to_string(),
        email,
    })
}

pub async fn authenticate_user(
    state: &AppState,
    identifier: &str,
    password: &str,
) -> Result<AuthenticatedUser, AppError> {
    let identifier = identifier.trim();
    if identifier.is_empty() || password.is_empty() {
        return Err(AppError::Validation("Completá email y contraseña".into()));
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?1 OR name = ?1")
        .bind(identifier)
        .fetch_optional(&state.db)
        .await?;
    let Some(user) = user else {
        return Err(AppError::Unauthorized);
    };

    let parsed = PasswordHash::new(&user.password_hash)
        .map_err(|err| AppError::Other(anyhow!("stored password hash is invalid: {err}")))?;
    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_err()
    {
        return Err(AppError::Unauthorized);
    }

    sqlx::query("UPDATE users SET last_login_at = ?1 WHERE id = ?2")
        .bind(Utc::now())
        .bind(user.id)
        .execute(&state.db)
        .await?;

    Ok(AuthenticatedUser::from_user(&user))
}

pub async fn create_session(state: &AppState, user_id: i64) -> Result<String, AppError> {
    let session_id = Uuid::new_v4().to_string();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO sessions (id, user_id, created_at, last_seen_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(&session_id)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(&state.db)
    .await?;
    Ok(session_id)
}

pub async fn destroy_session(state: &AppState, session_id: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM sessions WHERE id = ?1")
        .bind(session_id)
        .execute(&state.db)
        .await?;
    Ok(())
}

pub async fn record_logout(state: &AppState, user_id: i64) -> Result<(), AppError> {
    sqlx::query("UPDATE users SET last_logout_at = ?1 WHERE id = ?2")
        .bind(Utc::now())
        .bind(user_id)
        .execute(&state.db)
        .await?;
    Ok(())
}

pub fn apply_session_cookie(jar: PrivateCookieJar, session_id: &str) -> PrivateCookieJar {
    let mut cookie = Cookie::new(SESSION_COOKIE, session_id.to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    jar.add(cookie)
}

pub fn clear_session_cookie(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(Cookie::from(SESSION_COOKIE))
}

#[derive(Debug, FromRow)]
struct ResetRow {
    user_id: i64,
    expires_at: DateTime<Utc>,
    used: bool,
}

/// Genera un token de recuperación. Devuelve `None` si el email no existe,
/// para no revelar qué cuentas están registradas.
pub async fn create_password_reset(
    state: &AppState,
    email: &str,
) -> Result<Option<String>, AppError> {
    let email = email.trim().to_lowercase();
    let user_id: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;
    let Some(user_id) = user_id else {
        return Ok(None);
    };

    let token = Uuid::new_v4().to_string();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO password_resets (token, user_id, created_at, expires_at, used) VALUES (?1, ?2, ?3, ?4, 0)",
    )
    .bind(&token)
    .bind(user_id)
    .bind(now)
    .bind(now + Duration::hours(RESET_TOKEN_HOURS))
    .execute(&state.db)
    .await?;

    Ok(Some(token))
}

pub async fn reset_password(
    state: &AppState,
    token: &str,
    new_password: &str,
) -> Result<(), AppError> {
    if new_password.len() < 8 {
        return Err(AppError::Validation(
            "La contraseña debe tener al menos 8 caracteres".into(),
        ));
    }

    let reset = sqlx::query_as::<_, ResetRow>(
        "SELECT user_id, expires_at, used FROM password_resets WHERE token = ?1",
    )
    .bind(token)
    .fetch_optional(&state.db)
    .await?;
    let Some(reset) = reset else {
        return Err(AppError::NotFound);
    };
    if reset.used || reset.expires_at < Utc::now() {
        return Err(AppError::Validation(
            "El enlace de recuperación ya no es válido. Pedí uno nuevo.".into(),
        ));
    }

    let password_hash = hash_password(new_password)?;
    sqlx::query("UPDATE users SET password_hash = ?1 WHERE id = ?2")
        .bind(&password_hash)
        .bind(reset.user_id)
        .execute(&state.db)
        .await?;
    sqlx::query("UPDATE password_resets SET used = 1 WHERE token = ?1")
        .bind(token)
        .execute(&state.db)
        .await?;

    Ok(())
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::Other(anyhow!("password hashing failed: {err}")))
}
