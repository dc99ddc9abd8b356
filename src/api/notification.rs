use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, MySql, MySqlPool};
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::model::notification::Notification;
use crate::models::Page;

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct NotificationQuery {
    /// Only unread notifications
    #[schema(example = true)]
    pub unread_only: Option<bool>,
    #[schema(example = 1)]
    pub page: Option<u32>,
    #[schema(example = 20)]
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct NotificationListResponse {
    pub data: Vec<Notification>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 3)]
    pub total: i64,
    #[schema(example = 2)]
    pub unread_count: i64,
}

#[derive(Serialize, ToSchema)]
pub struct UnreadCount {
    #[schema(example = 2)]
    pub unread_count: i64,
}

/// Queues a notification for a user.
pub async fn notify_user<'e, E>(
    executor: E,
    user_id: u64,
    title: &str,
    message: &str,
    link: Option<&str>,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    sqlx::query("INSERT INTO notifications (user_id, title, message, link) VALUES (?, ?, ?, ?)")
        .bind(user_id)
        .bind(title)
        .bind(message)
        .bind(link)
        .execute(executor)
        .await?;
    Ok(())
}

/// Notifies whichever active user account is linked to the employee.
/// Returns false when the employee has no account.
pub async fn notify_employee<'e, E>(
    executor: E,
    employee_id: u64,
    title: &str,
    message: &str,
    link: Option<&str>,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, title, message, link)
        SELECT id, ?, ?, ?
        FROM users
        WHERE employee_id = ? AND is_active = TRUE
        "#,
    )
    .bind(title)
    .bind(message)
    .bind(link)
    .bind(employee_id)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        tracing::debug!(employee_id, title, "No linked user to notify");
    }
    Ok(result.rows_affected() > 0)
}

/// Someone else's notification is reported as missing, so ids of other
/// users' notifications are not disclosed.
fn ensure_owner(owner: Option<u64>, user_id: u64) -> Result<(), AppError> {
    match owner {
        Some(owner) if owner == user_id => Ok(()),
        _ => Err(AppError::NotFound("Notification")),
    }
}

async fn unread_count(pool: &MySqlPool, user_id: u64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = FALSE")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    params(NotificationQuery),
    responses(
        (status = 200, description = "Caller's notifications, newest first", body = NotificationListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Notification"
)]
pub async fn list_notifications(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<NotificationQuery>,
) -> Result<impl Responder, AppError> {
    let page = Page::new(query.page, query.per_page, 20);
    let unread_filter = if query.unread_only.unwrap_or(false) {
        " AND is_read = FALSE"
    } else {
        ""
    };

    let data: Vec<Notification> = sqlx::query_as(&format!(
        r#"
        SELECT id, user_id, title, message, link, is_read, created_at
        FROM notifications
        WHERE user_id = ?{unread_filter}
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#
    ))
    .bind(auth.user_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool.get_ref())
    .await?;

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?{unread_filter}"
    ))
    .bind(auth.user_id)
    .fetch_one(pool.get_ref())
    .await?;

    let unread_count = unread_count(pool.get_ref(), auth.user_id).await?;

    Ok(HttpResponse::Ok().json(NotificationListResponse {
        data,
        page: page.page,
        per_page: page.per_page,
        total,
        unread_count,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/unread-count",
    responses(
        (status = 200, description = "Unread notifications for the caller", body = UnreadCount),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Notification"
)]
pub async fn get_unread_count(auth: AuthUser, pool: web::Data<MySqlPool>) -> Result<impl Responder, AppError> {
    let unread_count = unread_count(pool.get_ref(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(UnreadCount { unread_count }))
}

#[utoipa::path(
    put,
    path = "/api/v1/notifications/{id}/read",
    params(("id" = u64, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Marked as read"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Notification not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Notification"
)]
pub async fn mark_read(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<impl Responder, AppError> {
    let id = path.into_inner();

    let owner: Option<u64> = sqlx::query_scalar("SELECT user_id FROM notifications WHERE id = ?")
        .bind(id)
        .fetch_optional(pool.get_ref())
        .await?;
    ensure_owner(owner, auth.user_id)?;

    sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await?;

    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    put,
    path = "/api/v1/notifications/read-all",
    responses(
        (status = 200, description = "Number of notifications marked read", body = Object,
         example = json!({ "updated": 4 })),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Notification"
)]
pub async fn mark_all_read(auth: AuthUser, pool: web::Data<MySqlPool>) -> Result<impl Responder, AppError> {
    let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE user_id = ? AND is_read = FALSE")
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "updated": result.rows_affected() })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;
    use actix_web::http::StatusCode;

    #[test]
    fn only_the_owner_may_mark_a_notification() {
        assert!(ensure_owner(Some(7), 7).is_ok());

        let foreign = ensure_owner(Some(8), 7).unwrap_err();
        let missing = ensure_owner(None, 7).unwrap_err();
        assert_eq!(foreign.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(foreign.to_string(), missing.to_string());
    }

    #[test]
    fn list_query_defaults_to_all_notifications() {
        let query: NotificationQuery = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(query.unread_only, None);
        let page = Page::new(query.page, query.per_page, 20);
        assert_eq!(page, Page { page: 1, per_page: 20 });
    }
}
