use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct Notification {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 7)]
    pub user_id: u64,
    #[schema(example = "Payslip available")]
    pub title: String,
    #[schema(example = "Your payslip for 2026-01-01 to 2026-01-15 has been approved.")]
    pub message: String,
    #[schema(example = "/payroll/12/payslip", nullable = true)]
    pub link: Option<String>,
    pub is_read: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}
