use genpdf::{Alignment, Document, Element, SimplePageDecorator, elements, style};

use crate::config::Config;
use crate::error::AppError;
use crate::model::payroll::PayrollRecord;
use crate::utils::export::Table;

/// Where to find fonts and what to print in document headers.
#[derive(Debug, Clone)]
pub struct PdfSettings {
    pub font_dir: String,
    pub font_name: String,
    pub company_name: String,
}

impl From<&Config> for PdfSettings {
    fn from(config: &Config) -> Self {
        Self {
            font_dir: config.pdf_font_dir.clone(),
            font_name: config.pdf_font_name.clone(),
            company_name: config.company_name.clone(),
        }
    }
}

fn new_document(settings: &PdfSettings, title: &str) -> Result<Document, AppError> {
    let fonts = genpdf::fonts::from_files(&settings.font_dir, &settings.font_name, None).map_err(|e| {
        tracing::error!(error = %e, dir = %settings.font_dir, font = %settings.font_name, "Failed to load PDF fonts");
        AppError::internal(e)
    })?;

    let mut doc = Document::new(fonts);
    doc.set_title(title);
    let mut decorator = SimplePageDecorator::new();
    decorator.set_margins(10);
    doc.set_page_decorator(decorator);

    doc.push(
        elements::Paragraph::new(settings.company_name.clone())
            .styled(style::Style::new().bold().with_font_size(16)),
    );
    doc.push(
        elements::Paragraph::new(title.to_string()).styled(style::Style::new().bold().with_font_size(12)),
    );
    doc.push(elements::Break::new(1.5));
    Ok(doc)
}

fn finish(doc: Document) -> Result<Vec<u8>, AppError> {
    let mut buffer = Vec::new();
    doc.render(&mut buffer).map_err(AppError::internal)?;
    Ok(buffer)
}

pub fn render_table(table: &Table, settings: &PdfSettings) -> Result<Vec<u8>, AppError> {
    let mut doc = new_document(settings, &table.title)?;

    let mut layout = elements::TableLayout::new(vec![1; table.headers.len().max(1)]);
    layout.set_cell_decorator(elements::FrameCellDecorator::new(true, true, false));

    let header_style = style::Style::new().bold().with_font_size(8);
    let mut header = layout.row();
    for h in &table.headers {
        header.push_element(elements::Paragraph::new(*h).styled(header_style));
    }
    header.push().map_err(AppError::internal)?;

    let cell_style = style::Style::new().with_font_size(8);
    for row in &table.rows {
        let mut line = layout.row();
        for cell in row {
            line.push_element(elements::Paragraph::new(cell.text()).styled(cell_style));
        }
        line.push().map_err(AppError::internal)?;
    }

    doc.push(layout);
    finish(doc)
}

/// Label/amount pairs printed on a payslip, in order.
pub fn payslip_lines(record: &PayrollRecord) -> (Vec<(String, String)>, Vec<(String, String)>) {
    let earnings = record.earnings();
    let money = |v: rust_decimal::Decimal| format!("{:.2}", v);

    let earning_lines = vec![
        ("Daily rate".to_string(), money(earnings.daily_rate)),
        ("Days worked".to_string(), earnings.days_worked.normalize().to_string()),
        (
            "Basic pay".to_string(),
            money(earnings.daily_rate * earnings.days_worked),
        ),
        ("Allowance".to_string(), money(earnings.allowance)),
        ("Overtime".to_string(), money(earnings.overtime)),
        ("Holiday pay".to_string(), money(earnings.holiday_pay)),
        ("Adjustments".to_string(), money(earnings.adjustments)),
    ];

    let deduction_lines = record
        .deductions()
        .entries()
        .into_iter()
        .map(|(name, value)| (deduction_label(name).to_string(), money(value)))
        .collect();

    (earning_lines, deduction_lines)
}

fn deduction_label(field: &str) -> &'static str {
    match field {
        "sss" => "SSS",
        "philhealth" => "PhilHealth",
        "pagibig" => "Pag-IBIG",
        "withholding_tax" => "Withholding tax",
        "sss_loan" => "SSS loan",
        "pagibig_loan" => "Pag-IBIG loan",
        "cash_advance" => "Cash advance",
        "tardiness" => "Tardiness / undertime",
        _ => "Other deductions",
    }
}

pub fn render_payslip(record: &PayrollRecord, settings: &PdfSettings) -> Result<Vec<u8>, AppError> {
    let title = format!(
        "Payslip {} to {}",
        record.period_start.format("%Y-%m-%d"),
        record.period_end.format("%Y-%m-%d")
    );
    let mut doc = new_document(settings, &title)?;

    doc.push(elements::Paragraph::new(format!(
        "Employee: {} ({})",
        record.employee_name, record.employee_code
    )));
    doc.push(elements::Paragraph::new(format!("Pay schedule: {}", record.pay_schedule)));
    if let Some(approved_at) = record.approved_at {
        doc.push(elements::Paragraph::new(format!(
            "Approved: {}",
            approved_at.format("%Y-%m-%d %H:%M UTC")
        )));
    }
    doc.push(elements::Break::new(1));

    let (earning_lines, deduction_lines) = payslip_lines(record);
    let bold = style::Style::new().bold();

    for (heading, lines, total_label, total) in [
        ("EARNINGS", earning_lines, "Gross pay", record.gross_pay),
        ("DEDUCTIONS", deduction_lines, "Total deductions", record.total_deductions),
    ] {
        doc.push(elements::Paragraph::new(heading).styled(bold));
        let mut table = elements::TableLayout::new(vec![3, 2]);
        table.set_cell_decorator(elements::FrameCellDecorator::new(false, true, false));
        for (label, amount) in lines {
            table
                .row()
                .element(elements::Paragraph::new(label))
                .element(elements::Paragraph::new(amount).aligned(Alignment::Right))
                .push()
                .map_err(AppError::internal)?;
        }
        table
            .row()
            .element(elements::Paragraph::new(total_label).styled(bold))
            .element(
                elements::Paragraph::new(format!("{:.2}", total))
                    .aligned(Alignment::Right)
                    .styled(bold),
            )
            .push()
            .map_err(AppError::internal)?;
        doc.push(table);
        doc.push(elements::Break::new(1));
    }

    let mut net = elements::Paragraph::new(format!("NET PAY: {:.2}", record.net_pay));
    net.set_alignment(Alignment::Right);
    doc.push(net.styled(style::Style::new().bold().with_font_size(14)));

    finish(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payslip_lists_every_deduction() {
        let record = PayrollRecord::sample();
        let (earnings, deductions) = payslip_lines(&record);

        assert_eq!(deductions.len(), 9);
        assert_eq!(deductions[0], ("SSS".to_string(), "500.00".to_string()));
        assert_eq!(deductions[8].0, "Other deductions");

        assert!(earnings.contains(&("Basic pay".to_string(), "10000.00".to_string())));
        assert!(earnings.contains(&("Days worked".to_string(), "10".to_string())));
    }

    #[test]
    fn missing_fonts_surface_as_internal_error() {
        let settings = PdfSettings {
            font_dir: "/nonexistent/fonts".into(),
            font_name: "Nope".into(),
            company_name: "Acme".into(),
        };
        let table = Table {
            title: "Employees".into(),
            headers: vec!["Code"],
            rows: vec![],
        };
        assert!(matches!(render_table(&table, &settings), Err(AppError::Internal(_))));
    }
}
