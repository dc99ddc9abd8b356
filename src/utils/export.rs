//! Tabular exports shared by the employee and payroll list screens.

use actix_web::{HttpResponse, http::header};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde::Deserialize;
use strum_macros::{Display, EnumString};
use utoipa::{IntoParams, ToSchema};

use crate::error::AppError;
use crate::utils::pdf::{self, PdfSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
    Pdf,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ExportQuery {
    /// xlsx (default), csv or pdf
    pub format: Option<ExportFormat>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(Decimal),
    Date(NaiveDate),
    Empty,
}

impl Cell {
    pub fn text(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
            Cell::Empty => String::new(),
        }
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Text(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

impl From<Decimal> for Cell {
    fn from(v: Decimal) -> Self {
        Cell::Number(v)
    }
}

impl From<NaiveDate> for Cell {
    fn from(v: NaiveDate) -> Self {
        Cell::Date(v)
    }
}

impl From<u64> for Cell {
    fn from(v: u64) -> Self {
        Cell::Number(Decimal::from(v))
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Cell::Empty)
    }
}

#[derive(Debug, Clone)]
pub struct Table {
    pub title: String,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<Cell>>,
}

pub fn to_csv(table: &Table) -> Result<Vec<u8>, AppError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(&table.headers).map_err(AppError::internal)?;
    for row in &table.rows {
        wtr.write_record(row.iter().map(Cell::text))
            .map_err(AppError::internal)?;
    }
    wtr.into_inner().map_err(|e| AppError::internal(e.error()))
}

pub fn to_xlsx(table: &Table) -> Result<Vec<u8>, AppError> {
    build_workbook(table).map_err(AppError::internal)
}

fn build_workbook(table: &Table) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let money = Format::new().set_num_format("#,##0.00");
    let date = Format::new().set_num_format("yyyy-mm-dd");

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name(&table.title))?;

    for (col, header) in table.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        let r = r as u32 + 1;
        for (c, cell) in row.iter().enumerate() {
            let c = c as u16;
            match cell {
                Cell::Text(s) => {
                    worksheet.write_string(r, c, s)?;
                }
                Cell::Number(n) => {
                    worksheet.write_number_with_format(r, c, n.to_f64().unwrap_or_default(), &money)?;
                }
                Cell::Date(d) => {
                    worksheet.write_string_with_format(r, c, d.format("%Y-%m-%d").to_string(), &date)?;
                }
                Cell::Empty => {}
            }
        }
    }

    workbook.save_to_buffer()
}

/// Excel limits sheet names to 31 characters and bans a few symbols.
fn sheet_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(31)
        .collect();
    if cleaned.trim().is_empty() {
        "Sheet1".to_string()
    } else {
        cleaned
    }
}

pub fn render(table: &Table, format: ExportFormat, pdf_settings: &PdfSettings) -> Result<Vec<u8>, AppError> {
    match format {
        ExportFormat::Xlsx => to_xlsx(table),
        ExportFormat::Csv => to_csv(table),
        ExportFormat::Pdf => pdf::render_table(table, pdf_settings),
    }
}

/// Wraps rendered bytes in a download response.
pub fn attachment(format: ExportFormat, basename: &str, bytes: Vec<u8>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(format.content_type())
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{basename}.{format}\""),
        ))
        .body(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table {
            title: "Payroll 2026/01".into(),
            headers: vec!["Employee", "Period Start", "Net Pay", "Notes"],
            rows: vec![
                vec![
                    "Doe, John".into(),
                    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap().into(),
                    Decimal::new(941920, 2).into(),
                    Cell::Empty,
                ],
                vec![
                    "Smith".into(),
                    Cell::Empty,
                    Decimal::new(-30000, 2).into(),
                    Cell::from(Some("advance")),
                ],
            ],
        }
    }

    #[test]
    fn csv_quotes_and_formats_cells() {
        let text = String::from_utf8(to_csv(&table()).unwrap()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Employee,Period Start,Net Pay,Notes");
        assert_eq!(lines[1], "\"Doe, John\",2026-01-01,9419.20,");
        assert_eq!(lines[2], "Smith,,-300.00,advance");
    }

    #[test]
    fn xlsx_is_a_zip_container() {
        let bytes = to_xlsx(&table()).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn sheet_names_are_sanitized() {
        assert_eq!(sheet_name("Payroll 2026/01"), "Payroll 202601");
        assert_eq!(sheet_name("???"), "Sheet1");
        assert_eq!(sheet_name(&"x".repeat(40)).len(), 31);
    }

    #[test]
    fn formats_parse_from_query_values() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!(ExportFormat::default(), ExportFormat::Xlsx);
        assert_eq!(ExportFormat::Pdf.to_string(), "pdf");
    }

    #[test]
    fn attachment_sets_disposition() {
        let resp = attachment(ExportFormat::Csv, "employees", b"a,b\n".to_vec());
        let disposition = resp.headers().get(header::CONTENT_DISPOSITION).unwrap();
        assert_eq!(disposition, "attachment; filename=\"employees.csv\"");
    }
}
