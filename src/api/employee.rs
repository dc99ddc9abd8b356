use std::collections::{HashMap, HashSet};

use actix_web::{HttpRequest, HttpResponse, Responder, http::header, web};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{Executor, FromRow, MySql, MySqlPool};
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::api::notification::notify_user;
use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::{AppError, RowError, invalid, is_unique_violation};
use crate::model::employee::{Employee, EmploymentStatus};
use crate::model::lookup::Lookup;
use crate::model::payroll::{MAX_MONEY, PaySchedule};
use crate::models::Page;
use crate::utils::db_utils::{FilterValue, Filters, UpdateBuilder, execute_update, like_pattern};
use crate::utils::export::{self, Cell, ExportQuery, Table};
use crate::utils::lookup_cache;
use crate::utils::pdf::PdfSettings;
use crate::utils::spreadsheet::{ImportedEmployee, SheetKind, parse_employees, read_rows};

const EMPLOYEE_COLUMNS: &str = r#"
    e.id, e.employee_code, e.first_name, e.middle_name, e.last_name, e.email, e.phone,
    e.birth_date, e.gender, e.address,
    e.department_id, e.site_id, e.position_id, e.manager_id, e.schedule_id,
    e.hire_date, e.employment_status, e.salary_rate, e.pay_schedule,
    e.bank_name, e.bank_account_number, e.tax_id, e.sss_number, e.philhealth_number, e.pagibig_number,
    e.created_at, e.updated_at
"#;

fn salary_amount(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(invalid("non_negative", "salary_rate must not be negative"));
    }
    if *value > MAX_MONEY {
        return Err(invalid("range", format!("salary_rate must not exceed {MAX_MONEY}")));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateEmployee {
    #[validate(length(min = 1, max = 32, message = "employee_code must be 1 to 32 characters"))]
    #[schema(example = "EMP-001")]
    pub employee_code: String,

    #[validate(length(min = 1, max = 100, message = "first_name must be 1 to 100 characters"))]
    #[schema(example = "John")]
    pub first_name: String,
    #[validate(length(max = 100, message = "middle_name is too long"))]
    pub middle_name: Option<String>,
    #[validate(length(min = 1, max = 100, message = "last_name must be 1 to 100 characters"))]
    #[schema(example = "Doe")]
    pub last_name: String,
    #[validate(
        email(message = "email is not a valid address"),
        length(max = 255, message = "email is too long")
    )]
    #[schema(example = "john.doe@company.com", format = "email")]
    pub email: String,
    #[validate(length(max = 32, message = "phone is too long"))]
    pub phone: Option<String>,
    #[schema(example = "1990-05-14", value_type = Option<String>, format = "date")]
    pub birth_date: Option<NaiveDate>,
    #[validate(length(max = 16, message = "gender is too long"))]
    pub gender: Option<String>,
    #[validate(length(max = 255, message = "address is too long"))]
    pub address: Option<String>,

    #[schema(example = 1)]
    pub department_id: u64,
    #[schema(example = 1)]
    pub site_id: u64,
    #[schema(example = 3)]
    pub position_id: u64,
    pub manager_id: Option<u64>,
    pub schedule_id: Option<u64>,
    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub hire_date: NaiveDate,
    #[serde(default = "default_status")]
    #[schema(example = "active")]
    pub employment_status: EmploymentStatus,
    #[validate(custom(function = "salary_amount"))]
    #[schema(example = 13000.0, value_type = f64)]
    pub salary_rate: Decimal,
    #[schema(example = "semi_monthly")]
    pub pay_schedule: PaySchedule,

    #[validate(length(max = 120, message = "bank_name is too long"))]
    pub bank_name: Option<String>,
    #[validate(length(max = 64, message = "bank_account_number is too long"))]
    pub bank_account_number: Option<String>,
    #[validate(length(max = 32, message = "tax_id is too long"))]
    pub tax_id: Option<String>,
    #[validate(length(max = 32, message = "sss_number is too long"))]
    pub sss_number: Option<String>,
    #[validate(length(max = 32, message = "philhealth_number is too long"))]
    pub philhealth_number: Option<String>,
    #[validate(length(max = 32, message = "pagibig_number is too long"))]
    pub pagibig_number: Option<String>,
}

fn default_status() -> EmploymentStatus {
    EmploymentStatus::Active
}

/// Partial update; only the listed columns can change. Fields left out keep
/// their value.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateEmployee {
    #[validate(length(min = 1, max = 32, message = "employee_code must be 1 to 32 characters"))]
    pub employee_code: Option<String>,
    #[validate(length(min = 1, max = 100, message = "first_name must be 1 to 100 characters"))]
    pub first_name: Option<String>,
    #[validate(length(max = 100, message = "middle_name is too long"))]
    pub middle_name: Option<String>,
    #[validate(length(min = 1, max = 100, message = "last_name must be 1 to 100 characters"))]
    pub last_name: Option<String>,
    #[validate(
        email(message = "email is not a valid address"),
        length(max = 255, message = "email is too long")
    )]
    pub email: Option<String>,
    #[validate(length(max = 32, message = "phone is too long"))]
    pub phone: Option<String>,
    #[schema(value_type = Option<String>, format = "date")]
    pub birth_date: Option<NaiveDate>,
    #[validate(length(max = 16, message = "gender is too long"))]
    pub gender: Option<String>,
    #[validate(length(max = 255, message = "address is too long"))]
    pub address: Option<String>,
    pub department_id: Option<u64>,
    pub site_id: Option<u64>,
    pub position_id: Option<u64>,
    pub manager_id: Option<u64>,
    pub schedule_id: Option<u64>,
    #[schema(value_type = Option<String>, format = "date")]
    pub hire_date: Option<NaiveDate>,
    pub employment_status: Option<EmploymentStatus>,
    #[validate(custom(function = "salary_amount"))]
    #[schema(value_type = Option<f64>)]
    pub salary_rate: Option<Decimal>,
    pub pay_schedule: Option<PaySchedule>,
    #[validate(length(max = 120, message = "bank_name is too long"))]
    pub bank_name: Option<String>,
    #[validate(length(max = 64, message = "bank_account_number is too long"))]
    pub bank_account_number: Option<String>,
    #[validate(length(max = 32, message = "tax_id is too long"))]
    pub tax_id: Option<String>,
    #[validate(length(max = 32, message = "sss_number is too long"))]
    pub sss_number: Option<String>,
    #[validate(length(max = 32, message = "philhealth_number is too long"))]
    pub philhealth_number: Option<String>,
    #[validate(length(max = 32, message = "pagibig_number is too long"))]
    pub pagibig_number: Option<String>,
}

impl UpdateEmployee {
    fn to_update(&self) -> UpdateBuilder {
        let mut update = UpdateBuilder::new("employees");
        update
            .set_opt("employee_code", self.employee_code.clone())
            .set_opt("first_name", self.first_name.clone())
            .set_opt("middle_name", self.middle_name.clone())
            .set_opt("last_name", self.last_name.clone())
            .set_opt("email", self.email.as_ref().map(|e| e.trim().to_lowercase()))
            .set_opt("phone", self.phone.clone())
            .set_opt("birth_date", self.birth_date)
            .set_opt("gender", self.gender.clone())
            .set_opt("address", self.address.clone())
            .set_opt("department_id", self.department_id)
            .set_opt("site_id", self.site_id)
            .set_opt("position_id", self.position_id)
            .set_opt("manager_id", self.manager_id)
            .set_opt("schedule_id", self.schedule_id)
            .set_opt("hire_date", self.hire_date)
            .set_opt("employment_status", self.employment_status.map(|s| s.to_string()))
            .set_opt("salary_rate", self.salary_rate)
            .set_opt("pay_schedule", self.pay_schedule.map(|s| s.to_string()))
            .set_opt("bank_name", self.bank_name.clone())
            .set_opt("bank_account_number", self.bank_account_number.clone())
            .set_opt("tax_id", self.tax_id.clone())
            .set_opt("sss_number", self.sss_number.clone())
            .set_opt("philhealth_number", self.philhealth_number.clone())
            .set_opt("pagibig_number", self.pagibig_number.clone());
        update
    }
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct EmployeeQuery {
    #[schema(example = 1)]
    pub page: Option<u32>,
    #[schema(example = 20)]
    pub per_page: Option<u32>,
    pub department_id: Option<u64>,
    pub site_id: Option<u64>,
    pub position_id: Option<u64>,
    #[schema(example = "active")]
    pub status: Option<EmploymentStatus>,
    /// Matches name, email or employee code
    #[schema(example = "doe")]
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeListResponse {
    pub data: Vec<Employee>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 10)]
    pub total: i64,
}

#[derive(Serialize, ToSchema)]
pub struct ImportSummary {
    #[schema(example = 25)]
    pub imported: usize,
}

/// Ids a create/update points at, checked before writing so a bad id is a
/// field error rather than a foreign-key failure.
#[derive(Debug, Default)]
struct References {
    employee_id: Option<u64>,
    department_id: Option<u64>,
    site_id: Option<u64>,
    position_id: Option<u64>,
    manager_id: Option<u64>,
    schedule_id: Option<u64>,
}

async fn check_references(pool: &MySqlPool, refs: &References) -> Result<(), AppError> {
    let mut errors = ValidationErrors::new();

    for (lookup, field, id) in [
        (Lookup::Department, "department_id", refs.department_id),
        (Lookup::Site, "site_id", refs.site_id),
        (Lookup::Position, "position_id", refs.position_id),
    ] {
        if let Some(id) = id {
            let items = lookup_cache::items(pool, lookup).await?;
            if !items.iter().any(|item| item.id == id) {
                errors.add(field, invalid("exists", format!("{lookup} {id} does not exist")));
            }
        }
    }

    if let Some(manager_id) = refs.manager_id {
        if refs.employee_id == Some(manager_id) {
            errors.add("manager_id", invalid("self", "an employee cannot manage themselves"));
        } else {
            let found: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM employees WHERE id = ? AND deleted_at IS NULL")
                    .bind(manager_id)
                    .fetch_one(pool)
                    .await?;
            if found == 0 {
                errors.add("manager_id", invalid("exists", format!("employee {manager_id} does not exist")));
            }
        }
    }

    if let Some(schedule_id) = refs.schedule_id {
        let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schedules WHERE id = ?")
            .bind(schedule_id)
            .fetch_one(pool)
            .await?;
        if found == 0 {
            errors.add("schedule_id", invalid("exists", format!("schedule {schedule_id} does not exist")));
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors.into()) }
}

async fn fetch_employee<'e, E>(executor: E, id: u64) -> Result<Employee, AppError>
where
    E: Executor<'e, Database = MySql>,
{
    sqlx::query_as(&format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees e WHERE e.id = ? AND e.deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or(AppError::NotFound("Employee"))
}

async fn insert_employee<'e, E>(executor: E, emp: &CreateEmployee) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO employees (
            employee_code, first_name, middle_name, last_name, email, phone,
            birth_date, gender, address,
            department_id, site_id, position_id, manager_id, schedule_id,
            hire_date, employment_status, salary_rate, pay_schedule,
            bank_name, bank_account_number, tax_id, sss_number, philhealth_number, pagibig_number
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&emp.employee_code)
    .bind(&emp.first_name)
    .bind(&emp.middle_name)
    .bind(&emp.last_name)
    .bind(emp.email.trim().to_lowercase())
    .bind(&emp.phone)
    .bind(emp.birth_date)
    .bind(&emp.gender)
    .bind(&emp.address)
    .bind(emp.department_id)
    .bind(emp.site_id)
    .bind(emp.position_id)
    .bind(emp.manager_id)
    .bind(emp.schedule_id)
    .bind(emp.hire_date)
    .bind(emp.employment_status.to_string())
    .bind(emp.salary_rate)
    .bind(emp.pay_schedule.to_string())
    .bind(&emp.bank_name)
    .bind(&emp.bank_account_number)
    .bind(&emp.tax_id)
    .bind(&emp.sss_number)
    .bind(&emp.philhealth_number)
    .bind(&emp.pagibig_number)
    .execute(executor)
    .await?;

    Ok(result.last_insert_id())
}

fn duplicate_employee(e: sqlx::Error) -> AppError {
    if is_unique_violation(&e) {
        AppError::Conflict("Employee code or email already exists".to_string())
    } else {
        e.into()
    }
}

fn employee_filters(query: &EmployeeQuery) -> Filters {
    let mut filters = Filters::new();
    filters.push_raw("e.deleted_at IS NULL");

    if let Some(id) = query.department_id {
        filters.push("e.department_id = ?", [FilterValue::U64(id)]);
    }
    if let Some(id) = query.site_id {
        filters.push("e.site_id = ?", [FilterValue::U64(id)]);
    }
    if let Some(id) = query.position_id {
        filters.push("e.position_id = ?", [FilterValue::U64(id)]);
    }
    if let Some(status) = query.status {
        filters.push("e.employment_status = ?", [FilterValue::Str(status.to_string())]);
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let like = like_pattern(search);
        filters.push(
            "(e.first_name LIKE ? OR e.last_name LIKE ? OR e.email LIKE ? OR e.employee_code LIKE ?)",
            std::iter::repeat_n(FilterValue::Str(like), 4),
        );
    }
    filters
}

/* =========================
Import resolution
========================= */

/// What the database already holds, loaded once per import.
#[derive(Debug, Default)]
struct ImportContext {
    departments: HashMap<String, u64>,
    sites: HashMap<String, u64>,
    positions: HashMap<String, u64>,
    /// lowercased code -> id, or None when that employee is soft-deleted
    codes: HashMap<String, Option<u64>>,
    emails: HashSet<String>,
}

impl ImportContext {
    async fn load(pool: &MySqlPool) -> Result<Self, AppError> {
        let existing: Vec<(u64, String, String, i64)> = sqlx::query_as(
            "SELECT id, employee_code, email, CAST(deleted_at IS NULL AS SIGNED) FROM employees",
        )
        .fetch_all(pool)
        .await?;

        let mut ctx = ImportContext {
            departments: lookup_cache::name_index(pool, Lookup::Department).await?,
            sites: lookup_cache::name_index(pool, Lookup::Site).await?,
            positions: lookup_cache::name_index(pool, Lookup::Position).await?,
            ..ImportContext::default()
        };
        for (id, code, email, active) in existing {
            ctx.codes.insert(code.to_lowercase(), (active != 0).then_some(id));
            ctx.emails.insert(email.to_lowercase());
        }
        Ok(ctx)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ManagerRef {
    None,
    Existing(u64),
    /// Lowercased code of another row in the same file.
    InFile(String),
}

#[derive(Debug)]
struct ResolvedEmployee {
    employee: CreateEmployee,
    manager: ManagerRef,
}

fn resolve_import(rows: Vec<ImportedEmployee>, ctx: &ImportContext) -> Result<Vec<ResolvedEmployee>, Vec<RowError>> {
    let file_codes: HashSet<String> = rows.iter().map(|r| r.employee_code.to_lowercase()).collect();
    let mut resolved = Vec::with_capacity(rows.len());
    let mut errors = Vec::new();

    for row in rows {
        let mut fail = |field: &str, message: String| {
            errors.push(RowError {
                row: row.line,
                field: field.to_string(),
                message,
            })
        };

        let code = row.employee_code.to_lowercase();
        if ctx.codes.contains_key(&code) {
            fail("employee_code", format!("employee_code {} already exists", row.employee_code));
        }
        if ctx.emails.contains(&row.email) {
            fail("email", format!("email {} already exists", row.email));
        }

        let mut lookup = |field: &str, index: &HashMap<String, u64>, name: &str| {
            let id = index.get(&name.trim().to_lowercase()).copied();
            if id.is_none() {
                fail(field, format!("unknown {field} '{name}'"));
            }
            id
        };
        let department_id = lookup("department", &ctx.departments, &row.department);
        let site_id = lookup("site", &ctx.sites, &row.site);
        let position_id = lookup("position", &ctx.positions, &row.position);

        let manager = match row.manager_code.as_deref().map(str::to_lowercase) {
            None => ManagerRef::None,
            Some(m) if m == code => {
                fail("manager_code", "an employee cannot manage themselves".to_string());
                ManagerRef::None
            }
            Some(m) if file_codes.contains(&m) => ManagerRef::InFile(m),
            Some(m) => match ctx.codes.get(&m) {
                Some(Some(id)) => ManagerRef::Existing(*id),
                _ => {
                    fail(
                        "manager_code",
                        format!("manager_code {} does not match any employee", m.to_uppercase()),
                    );
                    ManagerRef::None
                }
            },
        };

        let (Some(department_id), Some(site_id), Some(position_id)) = (department_id, site_id, position_id)
        else {
            continue;
        };

        resolved.push(ResolvedEmployee {
            manager: manager.clone(),
            employee: CreateEmployee {
                employee_code: row.employee_code,
                first_name: row.first_name,
                middle_name: row.middle_name,
                last_name: row.last_name,
                email: row.email,
                phone: row.phone,
                birth_date: row.birth_date,
                gender: row.gender,
                address: row.address,
                department_id,
                site_id,
                position_id,
                manager_id: match manager {
                    ManagerRef::Existing(id) => Some(id),
                    _ => None,
                },
                schedule_id: None,
                hire_date: row.hire_date,
                employment_status: row.employment_status,
                salary_rate: row.salary_rate,
                pay_schedule: row.pay_schedule,
                bank_name: row.bank_name,
                bank_account_number: row.bank_account_number,
                tax_id: row.tax_id,
                sss_number: row.sss_number,
                philhealth_number: row.philhealth_number,
                pagibig_number: row.pagibig_number,
            },
        });
    }

    if errors.is_empty() { Ok(resolved) } else { Err(errors) }
}

/* =========================
Create Employee
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created", body = Employee),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Employee code or email already exists"),
        (status = 422, description = "Invalid fields", body = Object, example = json!({
            "message": "One or more fields are invalid",
            "errors": { "email": ["email is not a valid address"] }
        }))
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateEmployee>,
) -> Result<impl Responder, AppError> {
    auth.require_hr_or_admin()?;
    payload.validate()?;

    check_references(
        pool.get_ref(),
        &References {
            employee_id: None,
            department_id: Some(payload.department_id),
            site_id: Some(payload.site_id),
            position_id: Some(payload.position_id),
            manager_id: payload.manager_id,
            schedule_id: payload.schedule_id,
        },
    )
    .await?;

    let id = insert_employee(pool.get_ref(), &payload)
        .await
        .map_err(duplicate_employee)?;

    info!(id, code = %payload.employee_code, by = auth.user_id, "Employee created");
    let employee = fetch_employee(pool.get_ref(), id).await?;
    Ok(HttpResponse::Created().json(employee))
}

/* =========================
List Employees
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeeListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> Result<impl Responder, AppError> {
    auth.require_hr_or_admin()?;

    let page = Page::new(query.page, query.per_page, 20);
    let filters = employee_filters(&query);
    let where_sql = filters.where_sql();

    let count_sql = format!("SELECT COUNT(*) FROM employees e{where_sql}");
    debug!(sql = %count_sql, args = ?filters.args(), "Counting employees");
    let total: i64 = filters
        .bind_scalar(sqlx::query_scalar(&count_sql))
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees e{where_sql} ORDER BY e.last_name, e.first_name, e.id LIMIT ? OFFSET ?"
    );
    let data: Vec<Employee> = filters
        .bind_as(sqlx::query_as(&data_sql))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(EmployeeListResponse {
        data,
        page: page.page,
        per_page: page.per_page,
        total,
    }))
}

/* =========================
Get Employee
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/employees/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "message": "Employee not found"
        }))
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<impl Responder, AppError> {
    let employee_id = path.into_inner();
    auth.require_self_or_hr(employee_id)?;

    let employee = fetch_employee(pool.get_ref(), employee_id).await?;
    Ok(HttpResponse::Ok().json(employee))
}

/* =========================
Update Employee
========================= */
#[utoipa::path(
    put,
    path = "/api/v1/employees/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    request_body = UpdateEmployee,
    responses(
        (status = 200, description = "Employee updated", body = Employee),
        (status = 400, description = "No fields provided"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Employee code or email already exists"),
        (status = 422, description = "Invalid fields")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateEmployee>,
) -> Result<impl Responder, AppError> {
    auth.require_hr_or_admin()?;
    let employee_id = path.into_inner();
    payload.validate()?;

    let update = payload.to_update().build("id", employee_id, Some("deleted_at IS NULL"))?;

    // 404 before reference checks so a missing employee is not reported as a field error.
    fetch_employee(pool.get_ref(), employee_id).await?;
    check_references(
        pool.get_ref(),
        &References {
            employee_id: Some(employee_id),
            department_id: payload.department_id,
            site_id: payload.site_id,
            position_id: payload.position_id,
            manager_id: payload.manager_id,
            schedule_id: payload.schedule_id,
        },
    )
    .await?;

    execute_update(pool.get_ref(), update)
        .await
        .map_err(duplicate_employee)?;

    info!(employee_id, by = auth.user_id, "Employee updated");
    let employee = fetch_employee(pool.get_ref(), employee_id).await?;
    Ok(HttpResponse::Ok().json(employee))
}

/* =========================
Delete Employee (soft)
========================= */
#[utoipa::path(
    delete,
    path = "/api/v1/employees/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Successfully deleted", body = Object, example = json!({
            "message": "Successfully deleted"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "message": "Employee not found"
        }))
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<impl Responder, AppError> {
    auth.require_hr_or_admin()?;
    let employee_id = path.into_inner();

    let result = sqlx::query("UPDATE employees SET deleted_at = UTC_TIMESTAMP() WHERE id = ? AND deleted_at IS NULL")
        .bind(employee_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Employee"));
    }

    info!(employee_id, by = auth.user_id, "Employee soft-deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}

/* =========================
Import Employees
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/employees/import",
    request_body(
        content = String,
        description = "Raw xlsx or csv file. Headers are matched by name, case-insensitively.",
        content_type = "text/csv"
    ),
    responses(
        (status = 201, description = "Every row imported", body = ImportSummary),
        (status = 400, description = "Unreadable or empty file"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 422, description = "Rows rejected; nothing was saved", body = Object, example = json!({
            "message": "Import rejected, nothing was saved",
            "rows": [{ "row": 3, "field": "email", "message": "email is not a valid address" }]
        }))
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn import_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<impl Responder, AppError> {
    auth.require_hr_or_admin()?;

    if body.is_empty() {
        return Err(AppError::BadRequest("Upload an xlsx or csv file".to_string()));
    }

    let content_type = req.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let kind = SheetKind::detect(content_type, &body);
    let raw = read_rows(&body, kind)?;
    if raw.is_empty() {
        return Err(AppError::BadRequest("The file has no data rows".to_string()));
    }

    let parsed = parse_employees(&raw).map_err(AppError::Import)?;
    let ctx = ImportContext::load(pool.get_ref()).await?;
    let resolved = resolve_import(parsed, &ctx).map_err(|rows| {
        info!(rejected = rows.len(), by = auth.user_id, "Employee import rejected");
        AppError::Import(rows)
    })?;

    let mut tx = pool.begin().await?;
    let mut ids: HashMap<String, u64> = HashMap::with_capacity(resolved.len());

    for row in &resolved {
        let id = insert_employee(&mut *tx, &row.employee)
            .await
            .map_err(duplicate_employee)?;
        ids.insert(row.employee.employee_code.to_lowercase(), id);
    }

    // Managers listed in the same file exist only after the first pass.
    for row in &resolved {
        if let ManagerRef::InFile(code) = &row.manager {
            let (Some(manager_id), Some(employee_id)) =
                (ids.get(code), ids.get(&row.employee.employee_code.to_lowercase()))
            else {
                continue;
            };
            sqlx::query("UPDATE employees SET manager_id = ? WHERE id = ?")
                .bind(manager_id)
                .bind(employee_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    let imported = resolved.len();
    notify_user(
        &mut *tx,
        auth.user_id,
        "Employee import complete",
        &format!("{imported} employee(s) were imported."),
        Some("/employees"),
    )
    .await?;

    tx.commit().await?;

    info!(imported, ?kind, by = auth.user_id, "Employee import committed");
    Ok(HttpResponse::Created().json(ImportSummary { imported }))
}

/* =========================
Export Employees
========================= */
#[derive(FromRow)]
struct EmployeeExportRow {
    employee_code: String,
    last_name: String,
    first_name: String,
    email: String,
    department: String,
    site: String,
    position: String,
    hire_date: NaiveDate,
    employment_status: String,
    pay_schedule: String,
    salary_rate: Decimal,
}

fn employee_table(rows: &[EmployeeExportRow]) -> Table {
    Table {
        title: "Employees".to_string(),
        headers: vec![
            "Employee Code",
            "Last Name",
            "First Name",
            "Email",
            "Department",
            "Site",
            "Position",
            "Hire Date",
            "Status",
            "Pay Schedule",
            "Salary Rate",
        ],
        rows: rows
            .iter()
            .map(|r| {
                vec![
                    Cell::from(r.employee_code.as_str()),
                    Cell::from(r.last_name.as_str()),
                    Cell::from(r.first_name.as_str()),
                    Cell::from(r.email.as_str()),
                    Cell::from(r.department.as_str()),
                    Cell::from(r.site.as_str()),
                    Cell::from(r.position.as_str()),
                    Cell::from(r.hire_date),
                    Cell::from(r.employment_status.as_str()),
                    Cell::from(r.pay_schedule.as_str()),
                    Cell::from(r.salary_rate),
                ]
            })
            .collect(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/employees/export",
    params(EmployeeQuery, ExportQuery),
    responses(
        (status = 200, description = "Filtered employees as xlsx, csv or pdf"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn export_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<EmployeeQuery>,
    export_query: web::Query<ExportQuery>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let format = export_query.format.unwrap_or_default();

    let filters = employee_filters(&query);
    let sql = format!(
        r#"
        SELECT
            e.employee_code, e.last_name, e.first_name, e.email,
            d.name AS department, s.name AS site, ps.name AS position,
            e.hire_date, e.employment_status, e.pay_schedule, e.salary_rate
        FROM employees e
        JOIN departments d ON d.id = e.department_id
        JOIN sites s ON s.id = e.site_id
        JOIN positions ps ON ps.id = e.position_id
        {}
        ORDER BY e.last_name, e.first_name
        "#,
        filters.where_sql()
    );
    let rows: Vec<EmployeeExportRow> = filters
        .bind_as(sqlx::query_as(&sql))
        .fetch_all(pool.get_ref())
        .await?;

    info!(rows = rows.len(), %format, by = auth.user_id, "Employee export");

    let table = employee_table(&rows);
    let settings = PdfSettings::from(config.get_ref());
    let bytes = web::block(move || export::render(&table, format, &settings))
        .await
        .map_err(AppError::internal)??;

    Ok(export::attachment(format, "employees", bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::spreadsheet::RawRow;

    fn payload() -> CreateEmployee {
        serde_json::from_value(json!({
            "employee_code": "EMP-001",
            "first_name": "John",
            "last_name": "Doe",
            "email": "john.doe@company.com",
            "department_id": 1,
            "site_id": 1,
            "position_id": 3,
            "hire_date": "2024-01-01",
            "salary_rate": 13000,
            "pay_schedule": "semi_monthly"
        }))
        .unwrap()
    }

    #[test]
    fn create_defaults_to_active_and_validates() {
        let emp = payload();
        assert_eq!(emp.employment_status, EmploymentStatus::Active);
        assert!(emp.validate().is_ok());

        let mut bad = payload();
        bad.email = "nope".into();
        bad.first_name = String::new();
        bad.salary_rate = Decimal::from(-1);
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("first_name"));
        assert!(fields.contains_key("salary_rate"));
    }

    #[test]
    fn salary_and_text_limits_follow_columns() {
        let mut emp = payload();
        emp.salary_rate = MAX_MONEY;
        assert!(emp.validate().is_ok());

        emp.salary_rate = MAX_MONEY + Decimal::new(1, 2);
        emp.gender = Some("x".repeat(17));
        let errors = emp.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("salary_rate"));
        assert!(fields.contains_key("gender"));
    }

    #[test]
    fn update_sets_only_provided_columns() {
        let update = UpdateEmployee {
            email: Some(" Jane@Corp.Test ".into()),
            employment_status: Some(EmploymentStatus::Resigned),
            ..UpdateEmployee::default()
        };
        let sql = update.to_update().build("id", 4, Some("deleted_at IS NULL")).unwrap();
        assert_eq!(
            sql.sql,
            "UPDATE employees SET email = ?, employment_status = ? WHERE id = ? AND deleted_at IS NULL"
        );
        assert_eq!(
            sql.values[0],
            crate::utils::db_utils::SqlValue::String("jane@corp.test".into())
        );

        let empty = UpdateEmployee::default().to_update().build("id", 4, None);
        assert!(matches!(empty, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn filters_exclude_deleted_and_search_four_columns() {
        let query = EmployeeQuery {
            page: None,
            per_page: None,
            department_id: Some(2),
            site_id: None,
            position_id: None,
            status: Some(EmploymentStatus::Active),
            search: Some("doe".into()),
        };
        let filters = employee_filters(&query);
        let sql = filters.where_sql();
        assert!(sql.starts_with(" WHERE e.deleted_at IS NULL AND e.department_id = ?"));
        assert!(sql.contains("e.employment_status = ?"));
        assert_eq!(filters.args().len(), 6);
        assert_eq!(filters.args()[5], FilterValue::Str("%doe%".into()));
    }

    fn context() -> ImportContext {
        let mut ctx = ImportContext::default();
        ctx.departments.insert("finance".into(), 1);
        ctx.sites.insert("manila".into(), 2);
        ctx.positions.insert("clerk".into(), 3);
        ctx.codes.insert("emp-001".into(), Some(10));
        ctx.codes.insert("emp-002".into(), None);
        ctx.emails.insert("taken@corp.test".into());
        ctx
    }

    fn imported(csv: &str) -> Vec<ImportedEmployee> {
        let rows: Vec<RawRow> = read_rows(csv.as_bytes(), SheetKind::Csv).unwrap();
        parse_employees(&rows).unwrap()
    }

    const HEADER: &str = "employee_code,first_name,last_name,email,department,site,position,hire_date,manager_code\n";

    #[test]
    fn import_resolves_lookups_and_managers() {
        let csv = format!(
            "{HEADER}EMP-100,Ana,Reyes,ana@corp.test,Finance,MANILA,Clerk,2024-02-01,EMP-001\n\
             EMP-101,Ben,Cruz,ben@corp.test,finance,Manila,clerk,2024-02-01,emp-100\n"
        );
        let resolved = resolve_import(imported(&csv), &context()).unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].employee.department_id, 1);
        assert_eq!(resolved[0].employee.site_id, 2);
        assert_eq!(resolved[0].manager, ManagerRef::Existing(10));
        assert_eq!(resolved[0].employee.manager_id, Some(10));
        assert_eq!(resolved[1].manager, ManagerRef::InFile("emp-100".into()));
        assert_eq!(resolved[1].employee.manager_id, None);
    }

    #[test]
    fn import_reports_every_conflict() {
        let csv = format!(
            "{HEADER}EMP-001,Ana,Reyes,taken@corp.test,Legal,Manila,Clerk,2024-02-01,\n\
             EMP-102,Ben,Cruz,ben@corp.test,Finance,Manila,Clerk,2024-02-01,EMP-002\n"
        );
        let errors = resolve_import(imported(&csv), &context()).unwrap_err();

        let row2: Vec<_> = errors.iter().filter(|e| e.row == 2).map(|e| e.field.as_str()).collect();
        assert_eq!(row2, vec!["employee_code", "email", "department"]);

        // A soft-deleted manager cannot be assigned.
        let row3: Vec<_> = errors.iter().filter(|e| e.row == 3).collect();
        assert_eq!(row3.len(), 1);
        assert_eq!(row3[0].field, "manager_code");
    }
}
