//! Reading employee spreadsheets (xlsx or csv) into validated rows.
//!
//! Parsing is header-driven: column order does not matter and headers are
//! matched case-insensitively with spaces and dashes treated as underscores.
//! Lookups (department, site, position, manager) stay as names/codes here;
//! the import handler resolves them against the database.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::str::FromStr;

use calamine::{Data, Reader, Xlsx};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use validator::Validate;

use crate::error::{AppError, RowError, field_messages};
use crate::model::employee::EmploymentStatus;
use crate::model::payroll::{MAX_MONEY, PaySchedule};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetKind {
    Xlsx,
    Csv,
}

impl SheetKind {
    /// xlsx files are zip containers; anything else is treated as csv unless
    /// the content type says otherwise.
    pub fn detect(content_type: Option<&str>, bytes: &[u8]) -> Self {
        let declared_xlsx = content_type.is_some_and(|ct| ct.contains("spreadsheetml") || ct.contains("excel"));
        if declared_xlsx || bytes.starts_with(b"PK\x03\x04") {
            SheetKind::Xlsx
        } else {
            SheetKind::Csv
        }
    }
}

/// One data line with its 1-based line number (header is line 1).
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub line: usize,
    pub values: HashMap<String, String>,
}

impl RawRow {
    fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

fn to_rows(headers: Vec<String>, lines: impl Iterator<Item = Vec<String>>) -> Vec<RawRow> {
    lines
        .enumerate()
        .filter(|(_, cells)| cells.iter().any(|c| !c.trim().is_empty()))
        .map(|(i, cells)| RawRow {
            line: i + 2,
            values: headers
                .iter()
                .cloned()
                .zip(cells.into_iter().map(|c| c.trim().to_string()))
                .collect(),
        })
        .collect()
}

pub fn read_rows(bytes: &[u8], kind: SheetKind) -> Result<Vec<RawRow>, AppError> {
    match kind {
        SheetKind::Csv => read_csv(bytes),
        SheetKind::Xlsx => read_xlsx(bytes),
    }
}

fn read_csv(bytes: &[u8]) -> Result<Vec<RawRow>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| AppError::BadRequest(format!("Unreadable CSV header: {e}")))?
        .iter()
        .map(normalize_header)
        .collect();

    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| AppError::BadRequest(format!("Unreadable CSV: {e}")))?;
        lines.push(record.iter().map(str::to_string).collect());
    }

    Ok(to_rows(headers, lines.into_iter()))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.date().format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

fn read_xlsx(bytes: &[u8]) -> Result<Vec<RawRow>, AppError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| AppError::BadRequest(format!("Unreadable xlsx file: {e}")))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::BadRequest("Workbook has no sheets".to_string()))?
        .map_err(|e| AppError::BadRequest(format!("Unreadable worksheet: {e}")))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Vec::new());
    };
    let headers = header_row.iter().map(|c| normalize_header(&cell_text(c))).collect();
    let lines = rows.map(|r| r.iter().map(cell_text).collect::<Vec<_>>());

    Ok(to_rows(headers, lines))
}

/// An employee row after parsing, before lookup resolution.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct ImportedEmployee {
    pub line: usize,
    #[validate(length(min = 1, max = 32, message = "employee_code must be 1 to 32 characters"))]
    pub employee_code: String,
    #[validate(length(min = 1, max = 100, message = "first_name must be 1 to 100 characters"))]
    pub first_name: String,
    #[validate(length(max = 100, message = "middle_name is too long"))]
    pub middle_name: Option<String>,
    #[validate(length(min = 1, max = 100, message = "last_name must be 1 to 100 characters"))]
    pub last_name: String,
    #[validate(
        email(message = "email is not a valid address"),
        length(max = 255, message = "email is too long")
    )]
    pub email: String,
    #[validate(length(max = 32, message = "phone is too long"))]
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    #[validate(length(max = 16, message = "gender is too long"))]
    pub gender: Option<String>,
    #[validate(length(max = 255, message = "address is too long"))]
    pub address: Option<String>,
    pub department: String,
    pub site: String,
    pub position: String,
    pub manager_code: Option<String>,
    pub hire_date: NaiveDate,
    pub employment_status: EmploymentStatus,
    pub salary_rate: Decimal,
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

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

struct RowParser<'a> {
    row: &'a RawRow,
    errors: Vec<RowError>,
}

impl<'a> RowParser<'a> {
    fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(RowError {
            row: self.row.line,
            field: field.to_string(),
            message: message.into(),
        });
    }

    fn optional(&self, field: &str) -> Option<String> {
        self.row.get(field).map(str::to_string)
    }

    fn required(&mut self, field: &str) -> String {
        match self.row.get(field) {
            Some(v) => v.to_string(),
            None => {
                self.fail(field, format!("{field} is required"));
                String::new()
            }
        }
    }

    fn date(&mut self, field: &str) -> Option<NaiveDate> {
        let raw = self.row.get(field)?;
        let parsed = parse_date(raw);
        if parsed.is_none() {
            self.fail(field, format!("{field} must be a date (YYYY-MM-DD)"));
        }
        parsed
    }

    fn parsed<T: FromStr>(&mut self, field: &str, default: T, expected: &str) -> T {
        match self.row.get(field) {
            None => default,
            Some(raw) => raw.to_lowercase().replace([' ', '-'], "_").parse().unwrap_or_else(|_| {
                self.fail(field, format!("{field} must be one of: {expected}"));
                default
            }),
        }
    }
}

pub fn parse_employee_row(row: &RawRow) -> Result<ImportedEmployee, Vec<RowError>> {
    let mut p = RowParser { row, errors: Vec::new() };

    let employee_code = p.required("employee_code");
    let first_name = p.required("first_name");
    let last_name = p.required("last_name");
    let email = p.required("email");
    let department = p.required("department");
    let site = p.required("site");
    let position = p.required("position");

    let hire_date = if p.row.get("hire_date").is_some() {
        p.date("hire_date")
    } else {
        p.fail("hire_date", "hire_date is required");
        None
    };
    let birth_date = p.date("birth_date");

    let salary_rate = match p.row.get("salary_rate").map(|v| v.replace(',', "")) {
        None => Decimal::ZERO,
        Some(raw) => match Decimal::from_str(&raw) {
            Ok(v) if !v.is_sign_negative() && v <= MAX_MONEY => v,
            _ => {
                p.fail("salary_rate", format!("salary_rate must be a number from 0 to {MAX_MONEY}"));
                Decimal::ZERO
            }
        },
    };

    let employment_status = p.parsed(
        "employment_status",
        EmploymentStatus::Active,
        "active, probationary, resigned, terminated",
    );
    let pay_schedule = p.parsed("pay_schedule", PaySchedule::SemiMonthly, "weekly, semi_monthly");

    let imported = ImportedEmployee {
        line: row.line,
        employee_code,
        first_name,
        middle_name: p.optional("middle_name"),
        last_name,
        email: email.to_lowercase(),
        phone: p.optional("phone"),
        birth_date,
        gender: p.optional("gender"),
        address: p.optional("address"),
        department,
        site,
        position,
        manager_code: p.optional("manager_code"),
        hire_date: hire_date.unwrap_or(NaiveDate::MIN),
        employment_status,
        salary_rate,
        pay_schedule,
        bank_name: p.optional("bank_name"),
        bank_account_number: p.optional("bank_account_number"),
        tax_id: p.optional("tax_id"),
        sss_number: p.optional("sss_number"),
        philhealth_number: p.optional("philhealth_number"),
        pagibig_number: p.optional("pagibig_number"),
    };

    let mut errors = p.errors;
    if let Err(validation) = imported.validate() {
        for (field, messages) in field_messages(&validation) {
            // Missing fields were already reported as "required".
            if errors.iter().any(|e| e.field == field) {
                continue;
            }
            for message in messages {
                errors.push(RowError {
                    row: row.line,
                    field: field.clone(),
                    message,
                });
            }
        }
    }

    if errors.is_empty() { Ok(imported) } else { Err(errors) }
}

/// Employee codes and emails must be unique within the file.
pub fn duplicate_errors(rows: &[ImportedEmployee]) -> Vec<RowError> {
    let mut codes = HashSet::new();
    let mut emails = HashSet::new();
    let mut errors = Vec::new();

    for row in rows {
        if !codes.insert(row.employee_code.to_lowercase()) {
            errors.push(RowError {
                row: row.line,
                field: "employee_code".into(),
                message: format!("employee_code {} appears more than once in the file", row.employee_code),
            });
        }
        if !emails.insert(row.email.clone()) {
            errors.push(RowError {
                row: row.line,
                field: "email".into(),
                message: format!("email {} appears more than once in the file", row.email),
            });
        }
    }
    errors
}

/// Parses every row; returns all row errors at once so the user can fix the
/// whole file in one pass.
pub fn parse_employees(rows: &[RawRow]) -> Result<Vec<ImportedEmployee>, Vec<RowError>> {
    let mut parsed = Vec::with_capacity(rows.len());
    let mut errors = Vec::new();

    for row in rows {
        match parse_employee_row(row) {
            Ok(emp) => parsed.push(emp),
            Err(mut e) => errors.append(&mut e),
        }
    }

    errors.extend(duplicate_errors(&parsed));
    if errors.is_empty() { Ok(parsed) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
Employee Code,First Name,Last Name,Email,Department,Site,Position,Hire Date,Salary Rate,Pay Schedule
EMP-100,Ana,Reyes,ANA@corp.test,Finance,Manila,Clerk,2024-02-01,\"13,000.00\",semi-monthly
EMP-101,Ben,Cruz,ben@corp.test,Finance,Cebu,Clerk,03/15/2024,3000,weekly
";

    #[test]
    fn headers_are_normalized() {
        assert_eq!(normalize_header(" Employee Code "), "employee_code");
        assert_eq!(normalize_header("Pay-Schedule"), "pay_schedule");
    }

    #[test]
    fn csv_rows_parse_with_line_numbers() {
        let rows = read_rows(CSV.as_bytes(), SheetKind::Csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);

        let employees = parse_employees(&rows).unwrap();
        assert_eq!(employees[0].email, "ana@corp.test");
        assert_eq!(employees[0].salary_rate, Decimal::new(1300000, 2));
        assert_eq!(employees[0].pay_schedule, PaySchedule::SemiMonthly);
        assert_eq!(employees[0].employment_status, EmploymentStatus::Active);
        assert_eq!(employees[1].hire_date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(employees[1].pay_schedule, PaySchedule::Weekly);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let csv = "employee_code,first_name\n,\nEMP-1,Ana\n";
        let rows = read_rows(csv.as_bytes(), SheetKind::Csv).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].line, 3);
    }

    #[test]
    fn row_errors_name_line_and_field() {
        let csv = "\
employee_code,first_name,last_name,email,department,site,position,hire_date,pay_schedule
EMP-1,Ana,Reyes,not-an-email,Finance,Manila,Clerk,yesterday,monthly
";
        let rows = read_rows(csv.as_bytes(), SheetKind::Csv).unwrap();
        let errors = parse_employees(&rows).unwrap_err();

        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"email"));
        assert!(fields.contains(&"hire_date"));
        assert!(fields.contains(&"pay_schedule"));
        assert!(errors.iter().all(|e| e.row == 2));
    }

    #[test]
    fn missing_required_fields_are_reported_once() {
        let csv = "employee_code,first_name\nEMP-1,\n";
        let rows = read_rows(csv.as_bytes(), SheetKind::Csv).unwrap();
        let errors = parse_employee_row(&rows[0]).unwrap_err();
        let first_name: Vec<_> = errors.iter().filter(|e| e.field == "first_name").collect();
        assert_eq!(first_name.len(), 1);
        assert!(errors.iter().any(|e| e.field == "hire_date"));
    }

    #[test]
    fn over_long_cells_are_row_errors() {
        let csv = "\
employee_code,first_name,last_name,email,department,site,position,hire_date,gender,sss_number
EMP-1,Ana,Reyes,ana@corp.test,Finance,Manila,Clerk,2024-02-01,Female-identified,01-2345678-9
EMP-2,Ben,Cruz,ben@corp.test,Finance,Cebu,Clerk,2024-02-01,Male,012345678901234567890123456789012
";
        let rows = read_rows(csv.as_bytes(), SheetKind::Csv).unwrap();
        let errors = parse_employees(&rows).unwrap_err();

        assert_eq!(errors.len(), 2);
        assert_eq!((errors[0].row, errors[0].field.as_str()), (2, "gender"));
        assert_eq!(errors[0].message, "gender is too long");
        assert_eq!((errors[1].row, errors[1].field.as_str()), (3, "sss_number"));
    }

    #[test]
    fn salary_beyond_column_is_a_row_error() {
        let csv = "\
employee_code,first_name,last_name,email,department,site,position,hire_date,salary_rate
EMP-1,Ana,Reyes,ana@corp.test,Finance,Manila,Clerk,2024-02-01,10000000000
";
        let rows = read_rows(csv.as_bytes(), SheetKind::Csv).unwrap();
        let errors = parse_employees(&rows).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "salary_rate");
    }

    #[test]
    fn duplicates_within_file_are_rejected() {
        let csv = format!("{CSV}EMP-100,Ana,Dup,other@corp.test,Finance,Manila,Clerk,2024-02-01,1,weekly\n");
        let rows = read_rows(csv.as_bytes(), SheetKind::Csv).unwrap();
        let errors = parse_employees(&rows).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].row, 4);
        assert_eq!(errors[0].field, "employee_code");
    }

    #[test]
    fn kind_is_detected_from_magic_or_content_type() {
        assert_eq!(SheetKind::detect(None, b"PK\x03\x04rest"), SheetKind::Xlsx);
        assert_eq!(SheetKind::detect(Some("text/csv"), b"a,b"), SheetKind::Csv);
        assert_eq!(
            SheetKind::detect(
                Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
                b""
            ),
            SheetKind::Xlsx
        );
    }

    #[test]
    fn xlsx_written_by_export_reads_back() {
        use crate::utils::export::{Cell, Table, to_xlsx};

        let table = Table {
            title: "Employees".into(),
            headers: vec!["employee_code", "hire_date", "salary_rate"],
            rows: vec![vec![
                "EMP-7".into(),
                NaiveDate::from_ymd_opt(2025, 5, 1).unwrap().into(),
                Cell::Number(Decimal::from(3000)),
            ]],
        };
        let bytes = to_xlsx(&table).unwrap();
        let rows = read_rows(&bytes, SheetKind::Xlsx).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values["employee_code"], "EMP-7");
        assert_eq!(rows[0].values["hire_date"], "2025-05-01");
        assert_eq!(rows[0].values["salary_rate"], "3000");
    }

    #[test]
    fn garbage_xlsx_is_a_bad_request() {
        let err = read_rows(b"PK\x03\x04garbage", SheetKind::Xlsx).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
