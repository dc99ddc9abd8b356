use crate::{
    auth::{
        auth::AuthUser,
        jwt::{TokenSubject, generate_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    error::{AppError, is_unique_violation},
    models::{Claims, LoginReqDto, TokenType, UserReq, UserSql},
};
use actix_web::{HttpRequest, HttpResponse, get, web};
use serde::Serialize;
use serde_json::json;
use sqlx::{MySql, MySqlPool, Transaction};
use tracing::{debug, error, info, instrument};
use validator::Validate;

#[derive(Serialize)]
struct TokenPair {
    access_token: String,
    refresh_token: String,
}

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Issues an access token plus a refresh token whose `jti` is persisted so it
/// can be rotated or revoked later.
async fn issue_pair(
    tx: &mut Transaction<'_, MySql>,
    subject: &TokenSubject,
    config: &Config,
) -> Result<TokenPair, AppError> {
    let (access_token, _) = generate_token(
        subject,
        TokenType::Access,
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .map_err(AppError::internal)?;

    let (refresh_token, refresh_claims) = generate_token(
        subject,
        TokenType::Refresh,
        &config.jwt_secret,
        config.refresh_token_ttl,
    )
    .map_err(AppError::internal)?;

    debug!(user_id = subject.user_id, jti = %refresh_claims.jti, "Storing refresh token");

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(subject.user_id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(&mut **tx)
    .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// User registration handler
pub async fn register(
    user: web::Json<UserReq>,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, AppError> {
    user.validate()?;

    let username = user.username.trim().to_lowercase();
    let hashed = hash_password(&user.password).map_err(AppError::internal)?;

    let result = sqlx::query(
        r#"INSERT INTO users (username, password, role_id, employee_id) VALUES (?, ?, ?, ?)"#,
    )
    .bind(&username)
    .bind(hashed)
    .bind(user.role_id)
    .bind(user.employee_id)
    .execute(pool.get_ref())
    .await;

    match result {
        Ok(_) => {
            info!(%username, "User registered");
            Ok(HttpResponse::Created().json(json!({
                "message": "User registered successfully"
            })))
        }
        Err(e) if is_unique_violation(&e) => Err(AppError::Conflict(
            "Username or employee link already exists".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    info!("Login request received");

    if user.username.trim().is_empty() || user.password.is_empty() {
        return Err(AppError::BadRequest("Username or password required".to_string()));
    }

    let db_user = sqlx::query_as::<_, UserSql>(
        r#"
        SELECT id, username, password, role_id, employee_id, is_active
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(user.username.trim().to_lowercase())
    .fetch_optional(pool.get_ref())
    .await?;

    let Some(db_user) = db_user.filter(|u| u.is_active) else {
        info!("Invalid credentials: user not found or inactive");
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    };

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }

    let subject = TokenSubject {
        user_id: db_user.id,
        username: db_user.username.clone(),
        role: db_user.role_id,
        employee_id: db_user.employee_id,
    };

    let mut tx = pool.begin().await?;
    let pair = issue_pair(&mut tx, &subject, &config).await?;
    tx.commit().await?;

    // Non-fatal
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    info!("Login successful");
    Ok(HttpResponse::Ok().json(pair))
}

fn refresh_claims(req: &HttpRequest, config: &Config) -> Option<Claims> {
    let claims = verify_token(bearer(req)?, &config.jwt_secret).ok()?;
    (claims.token_type == TokenType::Refresh).then_some(claims)
}

/// Rotates a refresh token: the presented one is revoked and a new pair issued.
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let claims = refresh_claims(&req, &config)
        .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".to_string()))?;

    let mut tx = pool.begin().await?;

    let revoked = sqlx::query(
        "UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ? AND revoked = FALSE AND expires_at > NOW()",
    )
    .bind(&claims.jti)
    .execute(&mut *tx)
    .await?;

    if revoked.rows_affected() == 0 {
        return Err(AppError::Unauthorized("Refresh token revoked or unknown".to_string()));
    }

    let pair = issue_pair(&mut tx, &TokenSubject::from(&claims), &config).await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(pair))
}

/// Revokes the presented refresh token. Always answers 204 so clients can
/// log out unconditionally.
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    if let Some(claims) = refresh_claims(&req, &config) {
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
            .bind(&claims.jti)
            .execute(pool.get_ref())
            .await?;
    }

    Ok(HttpResponse::NoContent().finish())
}

#[get("/me")]
pub async fn me(user: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "user_id": user.user_id,
        "username": user.username,
        "role": user.role.to_string(),
        "employee_id": user.employee_id,
    }))
}
