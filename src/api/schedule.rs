use actix_web::{HttpResponse, Responder, web};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use sqlx::types::Json;
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::auth::AuthUser;
use crate::error::{AppError, is_unique_violation};
use crate::model::schedule::{Schedule, ScheduleDay, ScheduleType, validate_days, weekly_hours};
use crate::models::display_name;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "name": "Office 8-5",
    "schedule_type": "fixed",
    "days": [
        { "day": "monday", "start_time": "08:00:00", "end_time": "17:00:00", "break_minutes": 60 },
        { "day": "tuesday", "start_time": "08:00:00", "end_time": "17:00:00", "break_minutes": 60 }
    ]
}))]
pub struct SchedulePayload {
    #[validate(custom(function = "display_name"))]
    pub name: String,
    pub schedule_type: ScheduleType,
    pub days: Vec<ScheduleDay>,
}

impl SchedulePayload {
    fn check(&self) -> Result<(), AppError> {
        let mut errors = match self.validate() {
            Ok(()) => validator::ValidationErrors::new(),
            Err(e) => e,
        };
        if let Err(day_errors) = validate_days(self.schedule_type, &self.days) {
            if let Some(errs) = day_errors.field_errors().get("days") {
                for err in errs.iter() {
                    errors.add("days", err.clone());
                }
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors.into()) }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ScheduleResponse {
    #[serde(flatten)]
    pub schedule: Schedule,
    #[schema(example = 40.0, value_type = f64)]
    pub weekly_hours: Decimal,
}

impl TryFrom<Schedule> for ScheduleResponse {
    type Error = AppError;

    fn try_from(schedule: Schedule) -> Result<Self, AppError> {
        let schedule_type: ScheduleType = schedule
            .schedule_type
            .parse()
            .map_err(|_| AppError::internal(format!("unknown schedule type {:?}", schedule.schedule_type)))?;
        let weekly_hours = weekly_hours(schedule_type, &schedule.days);
        Ok(ScheduleResponse { schedule, weekly_hours })
    }
}

const SELECT_SCHEDULE: &str = "SELECT id, name, schedule_type, days, created_at, updated_at FROM schedules";

async fn fetch_schedule(pool: &MySqlPool, id: u64) -> Result<ScheduleResponse, AppError> {
    let schedule: Schedule = sqlx::query_as(&format!("{SELECT_SCHEDULE} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Schedule"))?;
    schedule.try_into()
}

fn duplicate_name(e: sqlx::Error) -> AppError {
    if is_unique_violation(&e) {
        AppError::Conflict("A schedule with this name already exists".to_string())
    } else {
        e.into()
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/schedules",
    request_body = SchedulePayload,
    responses(
        (status = 201, description = "Schedule created", body = ScheduleResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Name already taken"),
        (status = 422, description = "Invalid schedule", body = Object, example = json!({
            "message": "One or more fields are invalid",
            "errors": { "days": ["monday is listed more than once"] }
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Schedule"
)]
pub async fn create_schedule(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<SchedulePayload>,
) -> Result<impl Responder, AppError> {
    auth.require_hr_or_admin()?;
    payload.check()?;

    let result = sqlx::query("INSERT INTO schedules (name, schedule_type, days) VALUES (?, ?, ?)")
        .bind(payload.name.trim())
        .bind(payload.schedule_type.to_string())
        .bind(Json(&payload.days))
        .execute(pool.get_ref())
        .await
        .map_err(duplicate_name)?;

    let id = result.last_insert_id();
    tracing::info!(id, name = %payload.name, by = auth.user_id, "Schedule created");
    Ok(HttpResponse::Created().json(fetch_schedule(pool.get_ref(), id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/schedules",
    responses(
        (status = 200, description = "All schedules", body = [ScheduleResponse]),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Schedule"
)]
pub async fn list_schedules(_auth: AuthUser, pool: web::Data<MySqlPool>) -> Result<impl Responder, AppError> {
    let schedules: Vec<Schedule> = sqlx::query_as(&format!("{SELECT_SCHEDULE} ORDER BY name"))
        .fetch_all(pool.get_ref())
        .await?;

    let data = schedules
        .into_iter()
        .map(ScheduleResponse::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(HttpResponse::Ok().json(data))
}

#[utoipa::path(
    get,
    path = "/api/v1/schedules/{id}",
    params(("id" = u64, Path, description = "Schedule id")),
    responses(
        (status = 200, description = "Schedule", body = ScheduleResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Schedule not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Schedule"
)]
pub async fn get_schedule(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<impl Responder, AppError> {
    Ok(HttpResponse::Ok().json(fetch_schedule(pool.get_ref(), path.into_inner()).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/schedules/{id}",
    params(("id" = u64, Path, description = "Schedule id")),
    request_body = SchedulePayload,
    responses(
        (status = 200, description = "Schedule replaced", body = ScheduleResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Schedule not found"),
        (status = 409, description = "Name already taken"),
        (status = 422, description = "Invalid schedule")
    ),
    security(("bearer_auth" = [])),
    tag = "Schedule"
)]
pub async fn update_schedule(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<SchedulePayload>,
) -> Result<impl Responder, AppError> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();
    payload.check()?;

    // Existence first; MySQL reports unchanged rows as unaffected.
    fetch_schedule(pool.get_ref(), id).await?;

    sqlx::query("UPDATE schedules SET name = ?, schedule_type = ?, days = ? WHERE id = ?")
        .bind(payload.name.trim())
        .bind(payload.schedule_type.to_string())
        .bind(Json(&payload.days))
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(duplicate_name)?;

    tracing::info!(id, by = auth.user_id, "Schedule updated");
    Ok(HttpResponse::Ok().json(fetch_schedule(pool.get_ref(), id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/schedules/{id}",
    params(("id" = u64, Path, description = "Schedule id")),
    responses(
        (status = 204, description = "Schedule deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Schedule not found"),
        (status = 409, description = "Schedule is still assigned to employees")
    ),
    security(("bearer_auth" = [])),
    tag = "Schedule"
)]
pub async fn delete_schedule(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<impl Responder, AppError> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;

    let assigned: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM employees WHERE schedule_id = ? AND deleted_at IS NULL")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
    if assigned > 0 {
        return Err(AppError::Conflict(format!(
            "Schedule is assigned to {assigned} employee(s); reassign them first"
        )));
    }

    // Soft-deleted employees may still point here.
    sqlx::query("UPDATE employees SET schedule_id = NULL WHERE schedule_id = ? AND deleted_at IS NOT NULL")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM schedules WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Schedule"));
    }

    tx.commit().await?;
    tracing::info!(id, by = auth.user_id, "Schedule deleted");
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn payload(json: serde_json::Value) -> SchedulePayload {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn valid_fixed_schedule_passes() {
        let p = payload(serde_json::json!({
            "name": "Office",
            "schedule_type": "fixed",
            "days": [{ "day": "monday", "start_time": "08:00:00", "end_time": "17:00:00", "break_minutes": 60 }]
        }));
        assert!(p.check().is_ok());
    }

    #[test]
    fn name_and_day_errors_are_combined() {
        let p = payload(serde_json::json!({
            "name": "",
            "schedule_type": "flexible",
            "days": [{ "day": "monday" }, { "day": "monday", "required_hours": 8 }]
        }));
        let Err(AppError::Validation(errors)) = p.check() else {
            panic!("expected validation error");
        };
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert_eq!(fields["days"].len(), 2);
    }

    #[test]
    fn blank_name_is_rejected_after_trimming() {
        let p = payload(serde_json::json!({
            "name": "    ",
            "schedule_type": "flexible",
            "days": [{ "day": "monday", "required_hours": 8 }]
        }));
        let Err(AppError::Validation(errors)) = p.check() else {
            panic!("expected validation error");
        };
        assert!(errors.field_errors().contains_key("name"));
    }

    #[test]
    fn response_carries_weekly_hours() {
        let now = Utc::now();
        let days: Vec<ScheduleDay> = serde_json::from_value(serde_json::json!([
            { "day": "monday", "required_hours": 8 },
            { "day": "saturday", "required_hours": 4.5 }
        ]))
        .unwrap();
        let schedule = Schedule {
            id: 1,
            name: "Flexi".into(),
            schedule_type: "flexible".into(),
            days: Json(days),
            created_at: now,
            updated_at: now,
        };

        let response = ScheduleResponse::try_from(schedule).unwrap();
        assert_eq!(response.weekly_hours, Decimal::new(1250, 2));

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["name"], "Flexi");
        assert_eq!(value["days"][1]["day"], "saturday");
        assert_eq!(value["weekly_hours"], 12.5);
    }
}
