use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::api::notification::notify_employee;
use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::model::leave_request::{LeaveRequest, LeaveStatus, LeaveType};
use crate::models::Page;
use crate::utils::db_utils::{FilterValue, Filters};

#[derive(Deserialize, ToSchema)]
pub struct CreateLeave {
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[schema(example = "sick")]
    pub leave_type: LeaveType, // enum ensures Swagger dropdown
}

#[derive(Serialize, ToSchema)]
#[schema(example = json!({
    "data": [
        {
            "id": 1,
            "employee_id": 1000,
            "start_date": "2026-01-01",
            "end_date": "2026-01-03",
            "leave_type": "sick",
            "status": "pending",
            "created_at": "2026-01-01T00:00:00Z"
        }
    ],
    "page": 1,
    "per_page": 10,
    "total": 1
}))]
pub struct LeaveListResponse {
    pub data: Vec<LeaveRequest>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct LeaveFilter {
    /// Filter by employee ID
    #[schema(example = 123)]
    pub employee_id: Option<u64>,
    /// Filter by leave status
    #[schema(example = "pending")]
    pub status: Option<LeaveStatus>,
    /// Pagination page number (start with 1)
    #[schema(example = 1)]
    pub page: Option<u32>,
    /// Pagination per page number
    #[schema(example = 10)]
    pub per_page: Option<u32>,
}

const SELECT_LEAVE: &str =
    "SELECT id, employee_id, start_date, end_date, leave_type, status, created_at FROM leave_requests";

/// HR sees everything; everyone else only their own requests.
fn leave_filters(auth: &AuthUser, query: &LeaveFilter) -> Result<Filters, AppError> {
    let mut filters = Filters::new();

    let employee_id = if auth.role.is_hr_staff() {
        query.employee_id
    } else {
        let own = auth.own_employee_id()?;
        if query.employee_id.is_some_and(|id| id != own) {
            return Err(AppError::Forbidden(
                "Not allowed to view another employee's records".to_string(),
            ));
        }
        Some(own)
    };

    if let Some(id) = employee_id {
        filters.push("employee_id = ?", [FilterValue::U64(id)]);
    }
    if let Some(status) = query.status {
        filters.push("status = ?", [FilterValue::Str(status.to_string())]);
    }
    Ok(filters)
}

/* =========================
Create leave request
========================= */
/// Swagger doc for create_leave endpoint
#[utoipa::path(
    post,
    path = "/api/v1/leave",
    request_body(
        content = CreateLeave,
        description = "Leave request payload",
        content_type = "application/json"
    ),
    responses(
        (status = 201, description = "Leave request submitted successfully", body = LeaveRequest),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile"),
        (status = 422, description = "start_date after end_date")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateLeave>,
) -> Result<impl Responder, AppError> {
    let employee_id = auth.own_employee_id()?;

    if payload.start_date > payload.end_date {
        return Err(AppError::field(
            "end_date",
            "range",
            "start_date cannot be after end_date",
        ));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO leave_requests
            (employee_id, start_date, end_date, leave_type, status)
        VALUES (?, ?, ?, ?, 'pending')
        "#,
    )
    .bind(employee_id)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.leave_type.to_string())
    .execute(pool.get_ref())
    .await?;

    let id = result.last_insert_id();
    tracing::info!(id, employee_id, leave_type = %payload.leave_type, "Leave request submitted");

    let leave: LeaveRequest = sqlx::query_as(&format!("{SELECT_LEAVE} WHERE id = ?"))
        .bind(id)
        .fetch_one(pool.get_ref())
        .await?;
    Ok(HttpResponse::Created().json(leave))
}

/// Moves a pending request to `status` and tells the employee.
async fn decide(
    auth: &AuthUser,
    pool: &MySqlPool,
    leave_id: u64,
    status: LeaveStatus,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;

    let mut tx = pool.begin().await?;

    let result = sqlx::query("UPDATE leave_requests SET status = ? WHERE id = ? AND status = 'pending'")
        .bind(status.to_string())
        .bind(leave_id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::BadRequest(
            "Leave request not found or already processed".to_string(),
        ));
    }

    let leave: LeaveRequest = sqlx::query_as(&format!("{SELECT_LEAVE} WHERE id = ?"))
        .bind(leave_id)
        .fetch_one(&mut *tx)
        .await?;

    let message = format!(
        "Your {} leave from {} to {} ({} day(s)) was {}.",
        leave.leave_type,
        leave.start_date,
        leave.end_date,
        leave.days(),
        status
    );
    notify_employee(
        &mut *tx,
        leave.employee_id,
        &format!("Leave {status}"),
        &message,
        Some(&format!("/leave/{leave_id}")),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(leave_id, %status, by = auth.user_id, "Leave request decided");
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": format!("Leave {status}")
    })))
}

/* =========================
Approve leave (HR/Admin)
========================= */
/// Swagger doc for approve_leave endpoint
#[utoipa::path(
    put,
    path = "/api/v1/leave/{leave_id}/approve",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to approve")
    ),
    responses(
        (status = 200, description = "Leave approved successfully", body = Object, example = json!({
            "message": "Leave approved"
        })),
        (status = 400, description = "Leave request not found or already processed", body = Object, example = json!({
            "message": "Leave request not found or already processed"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    decide(&auth, pool.get_ref(), path.into_inner(), LeaveStatus::Approved).await
}

/* =========================
Reject leave (HR/Admin)
========================= */
/// Swagger doc for reject_leave endpoint
#[utoipa::path(
    put,
    path = "/api/v1/leave/{leave_id}/reject",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to reject")
    ),
    responses(
        (status = 200, description = "Leave rejected successfully", body = Object, example = json!({
            "message": "Leave rejected"
        })),
        (status = 400, description = "Leave request not found or already processed", body = Object, example = json!({
            "message": "Leave request not found or already processed"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    decide(&auth, pool.get_ref(), path.into_inner(), LeaveStatus::Rejected).await
}

/// for getting a leave application details endpoint
#[utoipa::path(
    get,
    path = "/api/v1/leave/{leave_id}",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to fetch")
    ),
    responses(
        (status = 200, description = "Leave request found", body = LeaveRequest),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found", body = Object, example = json!({
            "message": "Leave request not found"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<impl Responder, AppError> {
    let leave_id = path.into_inner();

    let leave: LeaveRequest = sqlx::query_as(&format!("{SELECT_LEAVE} WHERE id = ?"))
        .bind(leave_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or(AppError::NotFound("Leave request"))?;

    auth.require_self_or_hr(leave.employee_id)?;
    Ok(HttpResponse::Ok().json(leave))
}

/// for getting leave applications endpoint
#[utoipa::path(
    get,
    path = "/api/v1/leave",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Paginated leave list", body = LeaveListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveFilter>,
) -> Result<impl Responder, AppError> {
    let page = Page::new(query.page, query.per_page, 10);
    let filters = leave_filters(&auth, &query)?;
    let where_sql = filters.where_sql();

    let count_sql = format!("SELECT COUNT(*) FROM leave_requests{where_sql}");
    let total: i64 = filters
        .bind_scalar(sqlx::query_scalar(&count_sql))
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!("{SELECT_LEAVE}{where_sql} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");
    let data: Vec<LeaveRequest> = filters
        .bind_as(sqlx::query_as(&data_sql))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(LeaveListResponse {
        data,
        page: page.page,
        per_page: page.per_page,
        total,
    }))
}
