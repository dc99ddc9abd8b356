use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, MySql, MySqlPool};
use utoipa::{IntoParams, ToSchema};

use crate::api::notification::notify_employee;
use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::{AppError, is_unique_violation};
use crate::model::employee::EmploymentStatus;
use crate::model::payroll::{
    Deductions, Earnings, PaySchedule, PayTotals, PayrollRecord, PayrollStatus, compute_totals,
    validate_inputs,
};
use crate::models::Page;
use crate::utils::db_utils::{FilterValue, Filters, UpdateBuilder, execute_update};
use crate::utils::export::{self, Cell, ExportQuery, Table};
use crate::utils::pdf::{self, PdfSettings};

const SELECT_PAYROLL: &str = r#"
    SELECT
        p.id, p.employee_id, e.employee_code,
        CONCAT(e.first_name, ' ', e.last_name) AS employee_name,
        p.period_start, p.period_end, p.pay_schedule,
        p.daily_rate, p.days_worked, p.allowance, p.overtime, p.holiday_pay, p.adjustments,
        p.sss, p.philhealth, p.pagibig, p.withholding_tax, p.sss_loan, p.pagibig_loan,
        p.cash_advance, p.tardiness, p.other_deductions,
        p.gross_pay, p.total_deductions, p.net_pay,
        p.status, p.approved_by, p.approved_at, p.created_at, p.updated_at
    FROM payroll_records p
    JOIN employees e ON e.id = p.employee_id
"#;

/// Deduction inputs; omitted fields are zero.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct DeductionInput {
    #[schema(value_type = f64, example = 450.0)]
    pub sss: Decimal,
    #[schema(value_type = f64, example = 250.0)]
    pub philhealth: Decimal,
    #[schema(value_type = f64, example = 100.0)]
    pub pagibig: Decimal,
    #[schema(value_type = f64)]
    pub withholding_tax: Decimal,
    #[schema(value_type = f64)]
    pub sss_loan: Decimal,
    #[schema(value_type = f64)]
    pub pagibig_loan: Decimal,
    #[schema(value_type = f64)]
    pub cash_advance: Decimal,
    #[schema(value_type = f64)]
    pub tardiness: Decimal,
    #[schema(value_type = f64)]
    pub other_deductions: Decimal,
}

impl From<&DeductionInput> for Deductions {
    fn from(d: &DeductionInput) -> Self {
        Deductions {
            sss: d.sss,
            philhealth: d.philhealth,
            pagibig: d.pagibig,
            withholding_tax: d.withholding_tax,
            sss_loan: d.sss_loan,
            pagibig_loan: d.pagibig_loan,
            cash_advance: d.cash_advance,
            tardiness: d.tardiness,
            other_deductions: d.other_deductions,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreatePayroll {
    #[schema(example = 1001)]
    pub employee_id: u64,

    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub period_start: NaiveDate,

    #[schema(example = "2026-01-15", value_type = String, format = "date")]
    pub period_end: NaiveDate,

    #[schema(example = 13.0, value_type = f64)]
    pub days_worked: Decimal,

    /// Overrides the rate derived from the employee's salary.
    #[schema(example = 1000.0, value_type = Option<f64>)]
    pub daily_rate: Option<Decimal>,

    #[serde(default)]
    #[schema(example = 1500.0, value_type = f64)]
    pub allowance: Decimal,

    #[serde(default)]
    #[schema(value_type = f64)]
    pub overtime: Decimal,

    #[serde(default)]
    #[schema(value_type = f64)]
    pub holiday_pay: Decimal,

    /// May be negative.
    #[serde(default)]
    #[schema(value_type = f64)]
    pub adjustments: Decimal,

    #[serde(flatten)]
    pub deductions: DeductionInput,
}

impl CreatePayroll {
    /// Inputs rounded to their stored scale; the daily rate falls back to the
    /// employee's salary over the schedule divisor.
    fn inputs(&self, salary_rate: Decimal, schedule: PaySchedule) -> (Earnings, Deductions) {
        let earnings = Earnings {
            daily_rate: self.daily_rate.unwrap_or_else(|| schedule.daily_rate(salary_rate)),
            days_worked: self.days_worked,
            allowance: self.allowance,
            overtime: self.overtime,
            holiday_pay: self.holiday_pay,
            adjustments: self.adjustments,
        };
        let deductions = Deductions::from(&self.deductions);
        (earnings.rounded(), deductions.rounded())
    }
}

/// Fields left out keep their current value.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdatePayroll {
    #[schema(value_type = Option<f64>)]
    pub daily_rate: Option<Decimal>,
    #[schema(value_type = Option<f64>, example = 12.0)]
    pub days_worked: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub allowance: Option<Decimal>,
    #[schema(value_type = Option<f64>, example = 850.0)]
    pub overtime: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub holiday_pay: Option<Decimal>,
    #[schema(value_type = Option<f64>, example = -200.0)]
    pub adjustments: Option<Decimal>,

    #[schema(value_type = Option<f64>)]
    pub sss: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub philhealth: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub pagibig: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub withholding_tax: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub sss_loan: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub pagibig_loan: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub cash_advance: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub tardiness: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub other_deductions: Option<Decimal>,
}

fn merge(target: &mut Decimal, value: Option<Decimal>) {
    if let Some(v) = value {
        *target = v;
    }
}

impl UpdatePayroll {
    fn is_empty(&self) -> bool {
        [
            self.daily_rate,
            self.days_worked,
            self.allowance,
            self.overtime,
            self.holiday_pay,
            self.adjustments,
            self.sss,
            self.philhealth,
            self.pagibig,
            self.withholding_tax,
            self.sss_loan,
            self.pagibig_loan,
            self.cash_advance,
            self.tardiness,
            self.other_deductions,
        ]
        .iter()
        .all(Option::is_none)
    }

    /// The record's inputs with this update merged in, at stored scale.
    fn apply_to(&self, record: &PayrollRecord) -> (Earnings, Deductions) {
        let mut earnings = record.earnings();
        let mut deductions = record.deductions();
        self.apply(&mut earnings, &mut deductions);
        (earnings.rounded(), deductions.rounded())
    }

    fn apply(&self, earnings: &mut Earnings, deductions: &mut Deductions) {
        merge(&mut earnings.daily_rate, self.daily_rate);
        merge(&mut earnings.days_worked, self.days_worked);
        merge(&mut earnings.allowance, self.allowance);
        merge(&mut earnings.overtime, self.overtime);
        merge(&mut earnings.holiday_pay, self.holiday_pay);
        merge(&mut earnings.adjustments, self.adjustments);

        merge(&mut deductions.sss, self.sss);
        merge(&mut deductions.philhealth, self.philhealth);
        merge(&mut deductions.pagibig, self.pagibig);
        merge(&mut deductions.withholding_tax, self.withholding_tax);
        merge(&mut deductions.sss_loan, self.sss_loan);
        merge(&mut deductions.pagibig_loan, self.pagibig_loan);
        merge(&mut deductions.cash_advance, self.cash_advance);
        merge(&mut deductions.tardiness, self.tardiness);
        merge(&mut deductions.other_deductions, self.other_deductions);
    }
}

#[derive(Deserialize, ToSchema)]
pub struct GeneratePayroll {
    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub period_start: NaiveDate,
    #[schema(example = "2026-01-15", value_type = String, format = "date")]
    pub period_end: NaiveDate,
    #[schema(example = "semi_monthly")]
    pub pay_schedule: PaySchedule,
}

#[derive(Debug, Serialize, ToSchema, PartialEq, Eq)]
pub struct GenerateSummary {
    #[schema(example = 42)]
    pub created: usize,
    /// Eligible employees that already had a record for the period.
    #[schema(example = 3)]
    pub skipped: usize,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct PayrollQuery {
    #[schema(example = 1)]
    pub page: Option<u32>,

    #[schema(example = 10)]
    pub per_page: Option<u32>,

    #[schema(example = 1001)]
    pub employee_id: Option<u64>,

    #[schema(example = "pending")]
    pub status: Option<PayrollStatus>,

    /// Records whose period starts on or after this date
    #[schema(example = "2026-01-01", value_type = Option<String>, format = "date")]
    pub period_from: Option<NaiveDate>,

    /// Records whose period ends on or before this date
    #[schema(example = "2026-01-31", value_type = Option<String>, format = "date")]
    pub period_to: Option<NaiveDate>,
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedPayrollResponse {
    pub data: Vec<PayrollRecord>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

#[derive(FromRow)]
struct PayBasis {
    salary_rate: Decimal,
    pay_schedule: String,
}

fn parse_schedule(value: &str) -> Result<PaySchedule, AppError> {
    value
        .parse()
        .map_err(|_| AppError::internal(format!("unknown pay schedule {value:?}")))
}

/// Current salary rate and pay schedule of a non-deleted employee.
async fn pay_basis<'e, E>(executor: E, employee_id: u64) -> Result<(Decimal, PaySchedule), AppError>
where
    E: Executor<'e, Database = MySql>,
{
    let basis: PayBasis = sqlx::query_as(
        "SELECT salary_rate, pay_schedule FROM employees WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(employee_id)
    .fetch_optional(executor)
    .await?
    .ok_or(AppError::NotFound("Employee"))?;

    Ok((basis.salary_rate, parse_schedule(&basis.pay_schedule)?))
}

async fn fetch_record<'e, E>(executor: E, id: u64) -> Result<PayrollRecord, AppError>
where
    E: Executor<'e, Database = MySql>,
{
    sqlx::query_as(&format!("{SELECT_PAYROLL} WHERE p.id = ? AND e.deleted_at IS NULL"))
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or(AppError::NotFound("Payroll record"))
}

#[allow(clippy::too_many_arguments)]
async fn insert_record<'e, E>(
    executor: E,
    employee_id: u64,
    period_start: NaiveDate,
    period_end: NaiveDate,
    schedule: PaySchedule,
    earnings: &Earnings,
    deductions: &Deductions,
    totals: &PayTotals,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO payroll_records (
            employee_id, period_start, period_end, pay_schedule,
            daily_rate, days_worked, allowance, overtime, holiday_pay, adjustments,
            sss, philhealth, pagibig, withholding_tax, sss_loan, pagibig_loan,
            cash_advance, tardiness, other_deductions,
            gross_pay, total_deductions, net_pay, status
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending')
        "#,
    )
    .bind(employee_id)
    .bind(period_start)
    .bind(period_end)
    .bind(schedule.to_string())
    .bind(earnings.daily_rate)
    .bind(earnings.days_worked)
    .bind(earnings.allowance)
    .bind(earnings.overtime)
    .bind(earnings.holiday_pay)
    .bind(earnings.adjustments)
    .bind(deductions.sss)
    .bind(deductions.philhealth)
    .bind(deductions.pagibig)
    .bind(deductions.withholding_tax)
    .bind(deductions.sss_loan)
    .bind(deductions.pagibig_loan)
    .bind(deductions.cash_advance)
    .bind(deductions.tardiness)
    .bind(deductions.other_deductions)
    .bind(totals.gross_pay)
    .bind(totals.total_deductions)
    .bind(totals.net_pay)
    .execute(executor)
    .await?;

    Ok(result.last_insert_id())
}

/// Every computed column of a pending record, rewritten together so totals
/// never drift from their inputs.
fn recompute_update(earnings: &Earnings, deductions: &Deductions, totals: &PayTotals) -> UpdateBuilder {
    let mut update = UpdateBuilder::new("payroll_records");
    update
        .set("daily_rate", earnings.daily_rate)
        .set("days_worked", earnings.days_worked)
        .set("allowance", earnings.allowance)
        .set("overtime", earnings.overtime)
        .set("holiday_pay", earnings.holiday_pay)
        .set("adjustments", earnings.adjustments);
    for (column, value) in deductions.entries() {
        update.set(column, value);
    }
    update
        .set("gross_pay", totals.gross_pay)
        .set("total_deductions", totals.total_deductions)
        .set("net_pay", totals.net_pay);
    update
}

fn warn_if_negative(employee_id: u64, totals: &PayTotals) {
    if totals.net_pay.is_sign_negative() && !totals.net_pay.is_zero() {
        tracing::warn!(employee_id, net_pay = %totals.net_pay, "Payroll computed a negative net pay");
    }
}

/// Applies `update` to a pending record. A zero row count means either the
/// record was approved meanwhile or nothing changed; re-read to tell.
async fn save_pending(pool: &MySqlPool, id: u64, update: UpdateBuilder) -> Result<PayrollRecord, AppError> {
    let affected = execute_update(pool, update.build("id", id, Some("status = 'pending'"))?).await?;
    let record = fetch_record(pool, id).await?;
    if affected == 0 {
        record.ensure_pending()?;
    }
    Ok(record)
}

/// WHERE clause for list/export. Employees are pinned to their own records.
fn payroll_filters(auth: &AuthUser, query: &PayrollQuery) -> Result<Filters, AppError> {
    let mut filters = Filters::new();
    filters.push_raw("e.deleted_at IS NULL");

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
        filters.push("p.employee_id = ?", [FilterValue::U64(id)]);
    }
    if let Some(status) = query.status {
        filters.push("p.status = ?", [FilterValue::Str(status.to_string())]);
    }
    if let Some(from) = query.period_from {
        filters.push("p.period_start >= ?", [FilterValue::Date(from)]);
    }
    if let Some(to) = query.period_to {
        filters.push("p.period_end <= ?", [FilterValue::Date(to)]);
    }
    Ok(filters)
}

fn payroll_table(records: &[PayrollRecord]) -> Table {
    Table {
        title: "Payroll".to_string(),
        headers: vec![
            "Employee Code",
            "Employee",
            "Period Start",
            "Period End",
            "Pay Schedule",
            "Daily Rate",
            "Days Worked",
            "Gross Pay",
            "Total Deductions",
            "Net Pay",
            "Status",
        ],
        rows: records
            .iter()
            .map(|r| {
                vec![
                    Cell::from(r.employee_code.as_str()),
                    Cell::from(r.employee_name.as_str()),
                    Cell::from(r.period_start),
                    Cell::from(r.period_end),
                    Cell::from(r.pay_schedule.as_str()),
                    Cell::from(r.daily_rate),
                    Cell::from(r.days_worked),
                    Cell::from(r.gross_pay),
                    Cell::from(r.total_deductions),
                    Cell::from(r.net_pay),
                    Cell::from(r.status.as_str()),
                ]
            })
            .collect(),
    }
}

#[derive(FromRow)]
struct GenerateCandidate {
    id: u64,
    salary_rate: Decimal,
    employment_status: String,
    has_record: i64,
}

/// (employee id, daily rate) for each payable employee without a record,
/// plus how many payable employees already had one.
fn plan_generation(candidates: &[GenerateCandidate], schedule: PaySchedule) -> (Vec<(u64, Decimal)>, usize) {
    let mut to_create = Vec::new();
    let mut skipped = 0;
    for c in candidates {
        let payable = c
            .employment_status
            .parse::<EmploymentStatus>()
            .map(EmploymentStatus::is_payable)
            .unwrap_or(false);
        if !payable {
            continue;
        }
        if c.has_record != 0 {
            skipped += 1;
        } else {
            to_create.push((c.id, schedule.daily_rate(c.salary_rate)));
        }
    }
    (to_create, skipped)
}

/* =========================
Create payroll record
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/payroll",
    request_body = CreatePayroll,
    responses(
        (status = 201, description = "Payroll record created as pending", body = PayrollRecord),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "A record for this employee and period already exists"),
        (status = 422, description = "Invalid fields")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn create_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePayroll>,
) -> Result<impl Responder, AppError> {
    auth.require_hr_or_admin()?;
    let payload = payload.into_inner();

    let (salary_rate, schedule) = pay_basis(pool.get_ref(), payload.employee_id).await?;

    let (earnings, deductions) = payload.inputs(salary_rate, schedule);
    validate_inputs(payload.period_start, payload.period_end, &earnings, &deductions)?;

    let totals = compute_totals(&earnings, &deductions);
    warn_if_negative(payload.employee_id, &totals);

    let id = insert_record(
        pool.get_ref(),
        payload.employee_id,
        payload.period_start,
        payload.period_end,
        schedule,
        &earnings,
        &deductions,
        &totals,
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Payroll for this employee and period already exists".to_string())
        } else {
            e.into()
        }
    })?;

    tracing::info!(id, employee_id = payload.employee_id, by = auth.user_id, "Payroll record created");
    let record = fetch_record(pool.get_ref(), id).await?;
    Ok(HttpResponse::Created().json(record))
}

/* =========================
Generate a period for everyone on a pay schedule
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/payroll/generate",
    request_body = GeneratePayroll,
    responses(
        (status = 200, description = "Pending records created", body = GenerateSummary),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 422, description = "Invalid period")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn generate_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<GeneratePayroll>,
) -> Result<impl Responder, AppError> {
    auth.require_hr_or_admin()?;
    let GeneratePayroll {
        period_start,
        period_end,
        pay_schedule,
    } = payload.into_inner();

    let period_days = Decimal::from((period_end - period_start).num_days() + 1);
    let days_worked = pay_schedule.divisor().min(period_days.max(Decimal::ZERO));
    let period_check = Earnings {
        days_worked,
        ..Earnings::default()
    };
    validate_inputs(period_start, period_end, &period_check, &Deductions::default())?;

    let mut tx = pool.begin().await?;

    let candidates: Vec<GenerateCandidate> = sqlx::query_as(
        r#"
        SELECT
            e.id, e.salary_rate, e.employment_status,
            CAST(EXISTS(
                SELECT 1 FROM payroll_records p
                WHERE p.employee_id = e.id AND p.period_start = ? AND p.period_end = ?
            ) AS SIGNED) AS has_record
        FROM employees e
        WHERE e.deleted_at IS NULL AND e.pay_schedule = ?
        ORDER BY e.id
        "#,
    )
    .bind(period_start)
    .bind(period_end)
    .bind(pay_schedule.to_string())
    .fetch_all(&mut *tx)
    .await?;

    let (to_create, mut skipped) = plan_generation(&candidates, pay_schedule);
    let deductions = Deductions::default();
    let mut created = 0;

    for (employee_id, daily_rate) in to_create {
        let earnings = Earnings {
            daily_rate,
            days_worked,
            ..Earnings::default()
        };
        validate_inputs(period_start, period_end, &earnings, &deductions)?;
        let totals = compute_totals(&earnings, &deductions);
        match insert_record(
            &mut *tx,
            employee_id,
            period_start,
            period_end,
            pay_schedule,
            &earnings,
            &deductions,
            &totals,
        )
        .await
        {
            Ok(_) => created += 1,
            // Created concurrently by someone else.
            Err(e) if is_unique_violation(&e) => skipped += 1,
            Err(e) => return Err(e.into()),
        }
    }

    tx.commit().await?;

    tracing::info!(
        %period_start,
        %period_end,
        schedule = %pay_schedule,
        created,
        skipped,
        by = auth.user_id,
        "Payroll period generated"
    );
    Ok(HttpResponse::Ok().json(GenerateSummary { created, skipped }))
}

/* =========================
Update a pending record
========================= */
#[utoipa::path(
    put,
    path = "/api/v1/payroll/{id}",
    params(("id" = u64, Path, description = "Payroll record id")),
    request_body = UpdatePayroll,
    responses(
        (status = 200, description = "Record updated and totals recomputed", body = PayrollRecord),
        (status = 400, description = "No fields provided"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Payroll record not found"),
        (status = 409, description = "Approved records are read-only"),
        (status = 422, description = "Invalid fields")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn update_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdatePayroll>,
) -> Result<impl Responder, AppError> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    if payload.is_empty() {
        return Err(AppError::BadRequest("No fields provided for update".to_string()));
    }

    let record = fetch_record(pool.get_ref(), id).await?;
    record.ensure_pending()?;

    let (earnings, deductions) = payload.apply_to(&record);
    validate_inputs(record.period_start, record.period_end, &earnings, &deductions)?;

    let totals = compute_totals(&earnings, &deductions);
    warn_if_negative(record.employee_id, &totals);

    let updated = save_pending(pool.get_ref(), id, recompute_update(&earnings, &deductions, &totals)).await?;
    tracing::info!(id, by = auth.user_id, net_pay = %updated.net_pay, "Payroll record updated");
    Ok(HttpResponse::Ok().json(updated))
}

/* =========================
Re-derive the daily rate from the employee's current salary
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/payroll/{id}/regenerate",
    params(("id" = u64, Path, description = "Payroll record id")),
    responses(
        (status = 200, description = "Record recomputed", body = PayrollRecord),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Payroll record or employee not found"),
        (status = 409, description = "Approved records are read-only")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn regenerate_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<impl Responder, AppError> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let record = fetch_record(pool.get_ref(), id).await?;
    record.ensure_pending()?;

    let (salary_rate, schedule) = pay_basis(pool.get_ref(), record.employee_id).await?;
    let mut earnings = record.earnings();
    earnings.daily_rate = schedule.daily_rate(salary_rate);
    let deductions = record.deductions();
    validate_inputs(record.period_start, record.period_end, &earnings, &deductions)?;

    let totals = compute_totals(&earnings, &deductions);
    warn_if_negative(record.employee_id, &totals);

    let mut update = recompute_update(&earnings, &deductions, &totals);
    update.set("pay_schedule", schedule.to_string());

    let updated = save_pending(pool.get_ref(), id, update).await?;
    tracing::info!(id, daily_rate = %updated.daily_rate, by = auth.user_id, "Payroll record regenerated");
    Ok(HttpResponse::Ok().json(updated))
}

/* =========================
Approve (Admin)
========================= */
#[utoipa::path(
    put,
    path = "/api/v1/payroll/{id}/approve",
    params(("id" = u64, Path, description = "Payroll record id")),
    responses(
        (status = 200, description = "Record approved; the employee is notified", body = PayrollRecord),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Payroll record not found"),
        (status = 409, description = "Already approved")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn approve_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<impl Responder, AppError> {
    auth.require_admin()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;

    let record = fetch_record(&mut *tx, id).await?;
    if record.status()? == PayrollStatus::Approved {
        return Err(AppError::Conflict("Payroll record is already approved".to_string()));
    }

    let result = sqlx::query(
        r#"
        UPDATE payroll_records
        SET status = 'approved', approved_by = ?, approved_at = UTC_TIMESTAMP()
        WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(auth.user_id)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict("Payroll record is already approved".to_string()));
    }

    let message = format!(
        "Your payslip for {} to {} is now available.",
        record.period_start, record.period_end
    );
    let link = format!("/payroll/{id}/payslip");
    notify_employee(&mut *tx, record.employee_id, "Payslip available", &message, Some(&link)).await?;

    tx.commit().await?;

    tracing::info!(id, employee_id = record.employee_id, by = auth.user_id, "Payroll record approved");
    let approved = fetch_record(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(approved))
}

/* =========================
Payslip PDF
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/payroll/{id}/payslip",
    params(("id" = u64, Path, description = "Payroll record id")),
    responses(
        (status = 200, description = "Payslip PDF", content_type = "application/pdf"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the caller's payslip"),
        (status = 404, description = "Payroll record not found"),
        (status = 409, description = "Record is not approved yet")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn download_payslip(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let record = fetch_record(pool.get_ref(), id).await?;
    auth.require_self_or_hr(record.employee_id)?;

    if record.status()? != PayrollStatus::Approved {
        return Err(AppError::Conflict(
            "Payslip is available only after the record is approved".to_string(),
        ));
    }

    let settings = PdfSettings::from(config.get_ref());
    let basename = format!("payslip-{}-{}", record.employee_code, record.period_start);
    let bytes = web::block(move || pdf::render_payslip(&record, &settings))
        .await
        .map_err(AppError::internal)??;

    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header((
            actix_web::http::header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{basename}.pdf\""),
        ))
        .body(bytes))
}

/* =========================
Get one
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/payroll/{id}",
    params(("id" = u64, Path, description = "Payroll record id")),
    responses(
        (status = 200, description = "Payroll record", body = PayrollRecord),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the caller's record"),
        (status = 404, description = "Payroll record not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn get_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<impl Responder, AppError> {
    let record = fetch_record(pool.get_ref(), path.into_inner()).await?;
    auth.require_self_or_hr(record.employee_id)?;
    Ok(HttpResponse::Ok().json(record))
}

/* =========================
List
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/payroll",
    params(PayrollQuery),
    responses(
        (status = 200, description = "Paginated payroll records", body = PaginatedPayrollResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn list_payrolls(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PayrollQuery>,
) -> Result<impl Responder, AppError> {
    let page = Page::new(query.page, query.per_page, 10);
    let filters = payroll_filters(&auth, &query)?;
    let where_sql = filters.where_sql();

    let list_sql = format!(
        "{SELECT_PAYROLL}{where_sql} ORDER BY p.period_start DESC, p.id DESC LIMIT ? OFFSET ?"
    );
    let data: Vec<PayrollRecord> = filters
        .bind_as(sqlx::query_as(&list_sql))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    let count_sql = format!(
        "SELECT COUNT(*) FROM payroll_records p JOIN employees e ON e.id = p.employee_id{where_sql}"
    );
    let total: i64 = filters
        .bind_scalar(sqlx::query_scalar(&count_sql))
        .fetch_one(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(PaginatedPayrollResponse {
        data,
        page: page.page,
        per_page: page.per_page,
        total,
    }))
}

/* =========================
Export
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/payroll/export",
    params(PayrollQuery, ExportQuery),
    responses(
        (status = 200, description = "Filtered payroll records as xlsx, csv or pdf"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn export_payrolls(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<PayrollQuery>,
    export_query: web::Query<ExportQuery>,
) -> Result<HttpResponse, AppError> {
    auth.require_hr_or_admin()?;
    let format = export_query.format.unwrap_or_default();

    let filters = payroll_filters(&auth, &query)?;
    let sql = format!(
        "{SELECT_PAYROLL}{} ORDER BY p.period_start, e.last_name, e.first_name",
        filters.where_sql()
    );
    let records: Vec<PayrollRecord> = filters
        .bind_as(sqlx::query_as(&sql))
        .fetch_all(pool.get_ref())
        .await?;

    tracing::info!(rows = records.len(), %format, by = auth.user_id, "Payroll export");

    let table = payroll_table(&records);
    let settings = PdfSettings::from(config.get_ref());
    let bytes = web::block(move || export::render(&table, format, &settings))
        .await
        .map_err(AppError::internal)??;

    Ok(export::attachment(format, "payroll", bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::payroll::round_money;
    use crate::model::role::Role;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn user(role: Role, employee_id: Option<u64>) -> AuthUser {
        AuthUser {
            user_id: 7,
            username: "tester".into(),
            role,
            employee_id,
        }
    }

    fn query() -> PayrollQuery {
        PayrollQuery {
            page: None,
            per_page: None,
            employee_id: None,
            status: None,
            period_from: None,
            period_to: None,
        }
    }

    #[test]
    fn create_payload_defaults_missing_amounts_to_zero() {
        let payload: CreatePayroll = serde_json::from_value(serde_json::json!({
            "employee_id": 5,
            "period_start": "2026-01-01",
            "period_end": "2026-01-15",
            "days_worked": 13,
            "sss": 450.5,
            "adjustments": -100
        }))
        .unwrap();

        assert_eq!(payload.daily_rate, None);
        assert_eq!(payload.allowance, Decimal::ZERO);
        assert_eq!(payload.adjustments, d("-100"));
        let deductions = Deductions::from(&payload.deductions);
        assert_eq!(deductions.sss, d("450.5"));
        assert_eq!(deductions.total(), d("450.50"));
    }

    #[test]
    fn update_only_touches_provided_fields() {
        let record = PayrollRecord::sample();
        let mut earnings = record.earnings();
        let mut deductions = record.deductions();

        let update = UpdatePayroll {
            overtime: Some(d("850")),
            tardiness: Some(d("120.25")),
            ..UpdatePayroll::default()
        };
        assert!(!update.is_empty());
        update.apply(&mut earnings, &mut deductions);

        assert_eq!(earnings.daily_rate, d("1000.00"));
        assert_eq!(earnings.overtime, d("850"));
        assert_eq!(deductions.sss, d("500.00"));
        assert_eq!(deductions.tardiness, d("120.25"));

        let totals = compute_totals(&earnings, &deductions);
        assert_eq!(totals.gross_pay, d("10850.00"));
        assert_eq!(totals.net_pay, d("10229.75"));
    }

    #[test]
    fn create_inputs_are_rounded_before_totals() {
        let payload: CreatePayroll = serde_json::from_value(serde_json::json!({
            "employee_id": 5,
            "period_start": "2026-01-01",
            "period_end": "2026-01-15",
            "daily_rate": 1000.006,
            "days_worked": 10.333,
            "tardiness": 0.004
        }))
        .unwrap();

        let (earnings, deductions) = payload.inputs(d("13000"), PaySchedule::SemiMonthly);
        assert_eq!(earnings.daily_rate, d("1000.01"));
        assert_eq!(earnings.days_worked, d("10.33"));
        assert_eq!(deductions.tardiness, Decimal::ZERO);

        let totals = compute_totals(&earnings, &deductions);
        assert_eq!(totals.gross_pay, d("10330.10"));
        assert_eq!(totals.gross_pay, round_money(earnings.daily_rate * earnings.days_worked));
    }

    #[test]
    fn create_without_override_uses_salary_divisor() {
        let payload: CreatePayroll = serde_json::from_value(serde_json::json!({
            "employee_id": 5,
            "period_start": "2026-01-01",
            "period_end": "2026-01-07",
            "days_worked": 6
        }))
        .unwrap();
        let (earnings, _) = payload.inputs(d("3000"), PaySchedule::Weekly);
        assert_eq!(earnings.daily_rate, d("500.00"));
    }

    #[test]
    fn oversized_create_is_rejected_before_computing() {
        let payload: CreatePayroll = serde_json::from_value(serde_json::json!({
            "employee_id": 5,
            "period_start": "2026-01-01",
            "period_end": "2026-01-15",
            "daily_rate": 7.0e28,
            "days_worked": 2
        }))
        .unwrap();
        let (earnings, deductions) = payload.inputs(d("13000"), PaySchedule::SemiMonthly);
        let errors =
            validate_inputs(payload.period_start, payload.period_end, &earnings, &deductions).unwrap_err();
        assert!(errors.field_errors().contains_key("daily_rate"));
    }

    #[test]
    fn update_rounds_merged_inputs() {
        let record = PayrollRecord::sample();
        let update = UpdatePayroll {
            days_worked: Some(d("10.333")),
            overtime: Some(d("0.125")),
            ..UpdatePayroll::default()
        };
        let (earnings, deductions) = update.apply_to(&record);
        assert_eq!(earnings.days_worked, d("10.33"));
        assert_eq!(earnings.overtime, d("0.13"));
        assert_eq!(deductions.sss, d("500.00"));
    }

    #[test]
    fn empty_update_is_detected() {
        assert!(UpdatePayroll::default().is_empty());
    }

    #[test]
    fn recompute_update_rewrites_all_money_columns() {
        let record = PayrollRecord::sample();
        let totals = compute_totals(&record.earnings(), &record.deductions());
        let update = recompute_update(&record.earnings(), &record.deductions(), &totals)
            .build("id", record.id, Some("status = 'pending'"))
            .unwrap();

        assert!(update.sql.starts_with("UPDATE payroll_records SET daily_rate = ?"));
        assert!(update.sql.contains("other_deductions = ?"));
        assert!(update.sql.ends_with("WHERE id = ? AND status = 'pending'"));
        // 6 earnings + 9 deductions + 3 totals + id
        assert_eq!(update.values.len(), 19);
    }

    #[test]
    fn employees_are_pinned_to_their_own_records() {
        let filters = payroll_filters(&user(Role::Employee, Some(42)), &query()).unwrap();
        assert_eq!(filters.where_sql(), " WHERE e.deleted_at IS NULL AND p.employee_id = ?");
        assert_eq!(filters.args(), &[FilterValue::U64(42)]);

        let mut other = query();
        other.employee_id = Some(43);
        let err = payroll_filters(&user(Role::Employee, Some(42)), &other).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = payroll_filters(&user(Role::Employee, None), &query()).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn hr_filters_by_status_and_period() {
        let mut q = query();
        q.status = Some(PayrollStatus::Approved);
        q.period_from = NaiveDate::from_ymd_opt(2026, 1, 1);
        q.period_to = NaiveDate::from_ymd_opt(2026, 1, 31);

        let filters = payroll_filters(&user(Role::Hr, None), &q).unwrap();
        assert_eq!(
            filters.where_sql(),
            " WHERE e.deleted_at IS NULL AND p.status = ? AND p.period_start >= ? AND p.period_end <= ?"
        );
        assert_eq!(filters.args()[0], FilterValue::Str("approved".into()));
    }

    #[test]
    fn generation_covers_only_active_employees() {
        let candidate = |id, status: &str, has_record| GenerateCandidate {
            id,
            salary_rate: d("13000"),
            employment_status: status.into(),
            has_record,
        };
        let candidates = vec![
            candidate(1, "active", 0),
            candidate(2, "active", 1),
            candidate(3, "probationary", 0),
            candidate(4, "probationary", 1),
            candidate(5, "resigned", 0),
            candidate(6, "terminated", 0),
        ];

        let (to_create, skipped) = plan_generation(&candidates, PaySchedule::SemiMonthly);
        assert_eq!(to_create, vec![(1, d("1000.00"))]);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn export_table_has_one_row_per_record() {
        let table = payroll_table(&[PayrollRecord::sample()]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].len(), table.headers.len());
        assert_eq!(table.rows[0][9], Cell::Number(d("9500.00")));
    }
}
