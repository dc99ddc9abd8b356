use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EmploymentStatus {
    Active,
    Probationary,
    Resigned,
    Terminated,
}

impl EmploymentStatus {
    /// Batch payroll generation covers active employees only.
    pub fn is_payable(self) -> bool {
        self == EmploymentStatus::Active
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "employee_code": "EMP-001",
        "first_name": "John",
        "middle_name": null,
        "last_name": "Doe",
        "email": "john.doe@company.com",
        "phone": "+639171234567",
        "department_id": 10,
        "site_id": 1,
        "position_id": 3,
        "manager_id": null,
        "schedule_id": 2,
        "hire_date": "2024-01-01",
        "employment_status": "active",
        "salary_rate": 13000.0,
        "pay_schedule": "semi_monthly"
    })
)]
pub struct Employee {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = "EMP-001")]
    pub employee_code: String,

    // personal
    #[schema(example = "John")]
    pub first_name: String,
    #[schema(nullable = true)]
    pub middle_name: Option<String>,
    #[schema(example = "Doe")]
    pub last_name: String,
    #[schema(example = "john.doe@company.com")]
    pub email: String,
    #[schema(example = "+639171234567", nullable = true)]
    pub phone: Option<String>,
    #[schema(value_type = Option<String>, format = "date")]
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub address: Option<String>,

    // work
    #[schema(example = 10)]
    pub department_id: u64,
    #[schema(example = 1)]
    pub site_id: u64,
    #[schema(example = 3)]
    pub position_id: u64,
    pub manager_id: Option<u64>,
    pub schedule_id: Option<u64>,
    #[schema(example = "2024-01-01", value_type = String, format = "date")]
    pub hire_date: NaiveDate,
    #[schema(example = "active")]
    pub employment_status: String,
    #[schema(example = 13000.0, value_type = f64)]
    pub salary_rate: Decimal,
    #[schema(example = "semi_monthly")]
    pub pay_schedule: String,

    // account
    pub bank_name: Option<String>,
    pub bank_account_number: Option<String>,
    pub tax_id: Option<String>,
    pub sss_number: Option<String>,
    pub philhealth_number: Option<String>,
    pub pagibig_number: Option<String>,

    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    pub fn full_name(&self) -> String {
        match self.middle_name.as_deref().filter(|m| !m.is_empty()) {
            Some(middle) => format!("{} {} {}", self.first_name, middle, self.last_name),
            None => format!("{} {}", self.first_name, self.last_name),
        }
    }
}
