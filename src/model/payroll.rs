use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::error::{AppError, invalid};

/// Cadence an employee is paid on. `salary_rate` on the employee is the pay
/// for one full period of this cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaySchedule {
    Weekly,
    SemiMonthly,
}

impl PaySchedule {
    /// Working days in one period; the per-day divisor for the daily rate.
    pub fn divisor(self) -> Decimal {
        match self {
            PaySchedule::Weekly => Decimal::from(6),
            PaySchedule::SemiMonthly => Decimal::from(13),
        }
    }

    pub fn daily_rate(self, salary_rate: Decimal) -> Decimal {
        round_money(salary_rate / self.divisor())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PayrollStatus {
    Pending,
    Approved,
}

/// Largest value a `DECIMAL(12,2)` money column holds.
pub const MAX_MONEY: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// Largest value the `DECIMAL(6,2)` days_worked column holds.
pub const MAX_DAYS: Decimal = Decimal::from_parts(999_999, 0, 0, false, 2);

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Earnings {
    pub daily_rate: Decimal,
    pub days_worked: Decimal,
    pub allowance: Decimal,
    pub overtime: Decimal,
    pub holiday_pay: Decimal,
    /// May be negative to claw back an earlier overpayment.
    pub adjustments: Decimal,
}

impl Earnings {
    /// Inputs at the scale they are stored with.
    pub fn rounded(&self) -> Self {
        Earnings {
            daily_rate: round_money(self.daily_rate),
            days_worked: round_money(self.days_worked),
            allowance: round_money(self.allowance),
            overtime: round_money(self.overtime),
            holiday_pay: round_money(self.holiday_pay),
            adjustments: round_money(self.adjustments),
        }
    }

    fn entries(&self) -> [(&'static str, Decimal); 6] {
        [
            ("daily_rate", self.daily_rate),
            ("days_worked", self.days_worked),
            ("allowance", self.allowance),
            ("overtime", self.overtime),
            ("holiday_pay", self.holiday_pay),
            ("adjustments", self.adjustments),
        ]
    }

    /// `None` when the sum overflows `Decimal`.
    pub fn checked_gross(&self) -> Option<Decimal> {
        let gross = self
            .daily_rate
            .checked_mul(self.days_worked)?
            .checked_add(self.allowance)?
            .checked_add(self.overtime)?
            .checked_add(self.holiday_pay)?
            .checked_add(self.adjustments)?;
        Some(round_money(gross))
    }

    pub fn gross(&self) -> Decimal {
        round_money(
            self.daily_rate * self.days_worked
                + self.allowance
                + self.overtime
                + self.holiday_pay
                + self.adjustments,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Deductions {
    pub sss: Decimal,
    pub philhealth: Decimal,
    pub pagibig: Decimal,
    pub withholding_tax: Decimal,
    pub sss_loan: Decimal,
    pub pagibig_loan: Decimal,
    pub cash_advance: Decimal,
    pub tardiness: Decimal,
    pub other_deductions: Decimal,
}

impl Deductions {
    /// Named fields in payslip order.
    pub fn entries(&self) -> [(&'static str, Decimal); 9] {
        [
            ("sss", self.sss),
            ("philhealth", self.philhealth),
            ("pagibig", self.pagibig),
            ("withholding_tax", self.withholding_tax),
            ("sss_loan", self.sss_loan),
            ("pagibig_loan", self.pagibig_loan),
            ("cash_advance", self.cash_advance),
            ("tardiness", self.tardiness),
            ("other_deductions", self.other_deductions),
        ]
    }

    pub fn rounded(&self) -> Self {
        Deductions {
            sss: round_money(self.sss),
            philhealth: round_money(self.philhealth),
            pagibig: round_money(self.pagibig),
            withholding_tax: round_money(self.withholding_tax),
            sss_loan: round_money(self.sss_loan),
            pagibig_loan: round_money(self.pagibig_loan),
            cash_advance: round_money(self.cash_advance),
            tardiness: round_money(self.tardiness),
            other_deductions: round_money(self.other_deductions),
        }
    }

    pub fn total(&self) -> Decimal {
        round_money(self.entries().iter().map(|(_, v)| *v).sum())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct PayTotals {
    #[schema(value_type = f64, example = 12500.0)]
    pub gross_pay: Decimal,
    #[schema(value_type = f64, example = 1450.0)]
    pub total_deductions: Decimal,
    #[schema(value_type = f64, example = 11050.0)]
    pub net_pay: Decimal,
}

pub fn compute_totals(earnings: &Earnings, deductions: &Deductions) -> PayTotals {
    let gross_pay = earnings.gross();
    let total_deductions = deductions.total();
    PayTotals {
        gross_pay,
        total_deductions,
        net_pay: gross_pay - total_deductions,
    }
}

/// Field-level checks shared by create, update and regenerate.
pub fn validate_inputs(
    period_start: NaiveDate,
    period_end: NaiveDate,
    earnings: &Earnings,
    deductions: &Deductions,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if period_end < period_start {
        errors.add(
            "period_end",
            invalid("range", "period_end must not precede period_start"),
        );
    } else {
        let period_days = Decimal::from((period_end - period_start).num_days() + 1);
        if earnings.days_worked > period_days {
            errors.add(
                "days_worked",
                invalid(
                    "range",
                    format!("days_worked cannot exceed the {period_days} days in the period"),
                ),
            );
        }
    }

    let mut in_range = true;
    for (field, value) in earnings.entries().into_iter().chain(deductions.entries()) {
        if field != "adjustments" && value.is_sign_negative() && !value.is_zero() {
            errors.add(field, invalid("non_negative", format!("{field} must not be negative")));
        }
        let max = if field == "days_worked" { MAX_DAYS } else { MAX_MONEY };
        if value.abs() > max {
            in_range = false;
            errors.add(field, invalid("range", format!("{field} must not exceed {max}")));
        }
    }

    // Totals are stored in the same columns as their inputs.
    if in_range {
        match earnings.checked_gross() {
            Some(gross) if gross.abs() <= MAX_MONEY => {
                let total_deductions = deductions.total();
                if total_deductions > MAX_MONEY {
                    errors.add(
                        "total_deductions",
                        invalid("range", format!("total_deductions must not exceed {MAX_MONEY}")),
                    );
                } else if (gross - total_deductions).abs() > MAX_MONEY {
                    errors.add(
                        "net_pay",
                        invalid("range", format!("net_pay must not exceed {MAX_MONEY}")),
                    );
                }
            }
            _ => errors.add(
                "gross_pay",
                invalid("range", format!("gross_pay must not exceed {MAX_MONEY}")),
            ),
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct PayrollRecord {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1001)]
    pub employee_id: u64,
    #[schema(example = "EMP-001")]
    pub employee_code: String,
    #[schema(example = "John Doe")]
    pub employee_name: String,
    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub period_start: NaiveDate,
    #[schema(example = "2026-01-15", value_type = String, format = "date")]
    pub period_end: NaiveDate,
    #[schema(example = "semi_monthly")]
    pub pay_schedule: String,

    #[schema(value_type = f64)]
    pub daily_rate: Decimal,
    #[schema(value_type = f64)]
    pub days_worked: Decimal,
    #[schema(value_type = f64)]
    pub allowance: Decimal,
    #[schema(value_type = f64)]
    pub overtime: Decimal,
    #[schema(value_type = f64)]
    pub holiday_pay: Decimal,
    #[schema(value_type = f64)]
    pub adjustments: Decimal,

    #[schema(value_type = f64)]
    pub sss: Decimal,
    #[schema(value_type = f64)]
    pub philhealth: Decimal,
    #[schema(value_type = f64)]
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

    #[schema(value_type = f64)]
    pub gross_pay: Decimal,
    #[schema(value_type = f64)]
    pub total_deductions: Decimal,
    #[schema(value_type = f64)]
    pub net_pay: Decimal,

    #[schema(example = "pending")]
    pub status: String,
    pub approved_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub approved_at: Option<DateTime<Utc>>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl PayrollRecord {
    pub fn earnings(&self) -> Earnings {
        Earnings {
            daily_rate: self.daily_rate,
            days_worked: self.days_worked,
            allowance: self.allowance,
            overtime: self.overtime,
            holiday_pay: self.holiday_pay,
            adjustments: self.adjustments,
        }
    }

    pub fn deductions(&self) -> Deductions {
        Deductions {
            sss: self.sss,
            philhealth: self.philhealth,
            pagibig: self.pagibig,
            withholding_tax: self.withholding_tax,
            sss_loan: self.sss_loan,
            pagibig_loan: self.pagibig_loan,
            cash_advance: self.cash_advance,
            tardiness: self.tardiness,
            other_deductions: self.other_deductions,
        }
    }

    pub fn status(&self) -> Result<PayrollStatus, AppError> {
        self.status
            .parse()
            .map_err(|_| AppError::internal(format!("unknown payroll status {:?}", self.status)))
    }

    /// Approved records are read-only.
    pub fn ensure_pending(&self) -> Result<(), AppError> {
        match self.status()? {
            PayrollStatus::Pending => Ok(()),
            PayrollStatus::Approved => Err(AppError::Conflict(
                "Payroll record is approved and read-only".to_string(),
            )),
        }
    }
}

#[cfg(test)]
impl PayrollRecord {
    /// Pending semi-monthly record: 10 days at 1000.00, SSS 500.00.
    pub fn sample() -> Self {
        let now = Utc::now();
        let mut record = PayrollRecord {
            id: 12,
            employee_id: 1001,
            employee_code: "EMP-001".into(),
            employee_name: "John Doe".into(),
            period_start: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            pay_schedule: PaySchedule::SemiMonthly.to_string(),
            daily_rate: Decimal::new(100000, 2),
            days_worked: Decimal::from(10),
            allowance: Decimal::ZERO,
            overtime: Decimal::ZERO,
            holiday_pay: Decimal::ZERO,
            adjustments: Decimal::ZERO,
            sss: Decimal::new(50000, 2),
            philhealth: Decimal::ZERO,
            pagibig: Decimal::ZERO,
            withholding_tax: Decimal::ZERO,
            sss_loan: Decimal::ZERO,
            pagibig_loan: Decimal::ZERO,
            cash_advance: Decimal::ZERO,
            tardiness: Decimal::ZERO,
            other_deductions: Decimal::ZERO,
            gross_pay: Decimal::ZERO,
            total_deductions: Decimal::ZERO,
            net_pay: Decimal::ZERO,
            status: PayrollStatus::Pending.to_string(),
            approved_by: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        };
        let totals = compute_totals(&record.earnings(), &record.deductions());
        record.gross_pay = totals.gross_pay;
        record.total_deductions = totals.total_deductions;
        record.net_pay = totals.net_pay;
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn sample_earnings() -> Earnings {
        Earnings {
            daily_rate: d("1000.00"),
            days_worked: d("10"),
            allowance: d("500.00"),
            overtime: d("250.50"),
            holiday_pay: d("1000.00"),
            adjustments: d("-100.00"),
        }
    }

    #[test]
    fn gross_deductions_and_net_pay() {
        let deductions = Deductions {
            sss: d("581.30"),
            philhealth: d("250.00"),
            pagibig: d("100.00"),
            withholding_tax: d("300.00"),
            cash_advance: d("1000.00"),
            ..Deductions::default()
        };

        let totals = compute_totals(&sample_earnings(), &deductions);
        assert_eq!(totals.gross_pay, d("11650.50"));
        assert_eq!(totals.total_deductions, d("2231.30"));
        assert_eq!(totals.net_pay, d("9419.20"));
    }

    #[test]
    fn all_nine_deductions_are_summed() {
        let deductions = Deductions {
            sss: d("1"),
            philhealth: d("2"),
            pagibig: d("3"),
            withholding_tax: d("4"),
            sss_loan: d("5"),
            pagibig_loan: d("6"),
            cash_advance: d("7"),
            tardiness: d("8"),
            other_deductions: d("9"),
        };
        assert_eq!(deductions.total(), d("45"));
    }

    #[test]
    fn net_pay_can_go_negative() {
        let earnings = Earnings {
            daily_rate: d("500"),
            days_worked: d("1"),
            ..Earnings::default()
        };
        let deductions = Deductions {
            cash_advance: d("800"),
            ..Deductions::default()
        };
        assert_eq!(compute_totals(&earnings, &deductions).net_pay, d("-300.00"));
    }

    #[test]
    fn daily_rate_uses_pay_schedule_divisor() {
        assert_eq!(PaySchedule::Weekly.daily_rate(d("3000")), d("500.00"));
        assert_eq!(PaySchedule::SemiMonthly.daily_rate(d("13000")), d("1000.00"));
        // 10000 / 13 = 769.2307...
        assert_eq!(PaySchedule::SemiMonthly.daily_rate(d("10000")), d("769.23"));
    }

    #[test]
    fn half_days_and_midpoint_rounding() {
        let earnings = Earnings {
            daily_rate: d("769.23"),
            days_worked: d("0.5"),
            ..Earnings::default()
        };
        // 384.615 rounds away from zero
        assert_eq!(earnings.gross(), d("384.62"));
    }

    #[test]
    fn enums_round_trip_through_strings() {
        assert_eq!(PaySchedule::SemiMonthly.to_string(), "semi_monthly");
        assert_eq!("weekly".parse::<PaySchedule>().unwrap(), PaySchedule::Weekly);
        assert_eq!("approved".parse::<PayrollStatus>().unwrap(), PayrollStatus::Approved);
        assert!("monthly".parse::<PaySchedule>().is_err());
    }

    #[test]
    fn inverted_period_is_rejected() {
        let errors = validate_inputs(
            date("2026-01-15"),
            date("2026-01-01"),
            &sample_earnings(),
            &Deductions::default(),
        )
        .unwrap_err();
        assert!(errors.field_errors().contains_key("period_end"));
    }

    #[test]
    fn days_worked_cannot_exceed_period() {
        let earnings = Earnings {
            days_worked: d("8"),
            ..sample_earnings()
        };
        let errors = validate_inputs(
            date("2026-01-01"),
            date("2026-01-07"),
            &earnings,
            &Deductions::default(),
        )
        .unwrap_err();
        assert!(errors.field_errors().contains_key("days_worked"));
    }

    #[test]
    fn negative_money_is_rejected_except_adjustments() {
        let earnings = Earnings {
            allowance: d("-1"),
            ..sample_earnings()
        };
        let deductions = Deductions {
            tardiness: d("-5"),
            ..Deductions::default()
        };
        let errors = validate_inputs(date("2026-01-01"), date("2026-01-15"), &earnings, &deductions)
            .unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("allowance"));
        assert!(fields.contains_key("tardiness"));
        assert!(!fields.contains_key("adjustments"));
    }

    #[test]
    fn approved_records_are_read_only() {
        let mut record = PayrollRecord::sample();
        assert!(record.ensure_pending().is_ok());
        assert_eq!(record.net_pay, d("9500.00"));

        record.status = PayrollStatus::Approved.to_string();
        assert!(matches!(record.ensure_pending(), Err(AppError::Conflict(_))));

        record.status = "archived".into();
        assert!(matches!(record.status(), Err(AppError::Internal(_))));
    }

    #[test]
    fn column_bounds_match_schema() {
        assert_eq!(MAX_MONEY, d("9999999999.99"));
        assert_eq!(MAX_DAYS, d("9999.99"));
    }

    #[test]
    fn oversized_inputs_are_field_errors_not_panics() {
        let earnings = Earnings {
            daily_rate: d("70000000000000000000000000000"),
            days_worked: d("2"),
            ..Earnings::default()
        };
        let deductions = Deductions {
            sss: d("10000000000"),
            ..Deductions::default()
        };
        let errors = validate_inputs(date("2026-01-01"), date("2026-01-15"), &earnings, &deductions)
            .unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("daily_rate"));
        assert!(fields.contains_key("sss"));
        assert!(!fields.contains_key("gross_pay"));
        assert!(earnings.checked_gross().is_none());
    }

    #[test]
    fn gross_above_column_maximum_is_rejected() {
        // Each input fits its column, the product does not.
        let earnings = Earnings {
            daily_rate: d("9000000000.00"),
            days_worked: d("2"),
            ..Earnings::default()
        };
        let errors = validate_inputs(
            date("2026-01-01"),
            date("2026-01-15"),
            &earnings,
            &Deductions::default(),
        )
        .unwrap_err();
        assert!(errors.field_errors().contains_key("gross_pay"));
    }

    #[test]
    fn total_deductions_above_column_maximum_is_rejected() {
        let deductions = Deductions {
            sss: d("9000000000"),
            cash_advance: d("9000000000"),
            ..Deductions::default()
        };
        let errors = validate_inputs(
            date("2026-01-01"),
            date("2026-01-15"),
            &Earnings::default(),
            &deductions,
        )
        .unwrap_err();
        assert!(errors.field_errors().contains_key("total_deductions"));
    }

    #[test]
    fn totals_follow_inputs_at_stored_scale() {
        let earnings = Earnings {
            daily_rate: d("1000.005"),
            days_worked: d("10.333"),
            ..Earnings::default()
        }
        .rounded();
        assert_eq!(earnings.daily_rate, d("1000.01"));
        assert_eq!(earnings.days_worked, d("10.33"));
        assert_eq!(earnings.gross(), d("10330.10"));

        let deductions = Deductions {
            tardiness: d("12.345"),
            ..Deductions::default()
        }
        .rounded();
        assert_eq!(deductions.total(), d("12.35"));
    }

    #[test]
    fn valid_inputs_pass() {
        assert!(
            validate_inputs(
                date("2026-01-01"),
                date("2026-01-15"),
                &sample_earnings(),
                &Deductions::default()
            )
            .is_ok()
        );
    }
}
