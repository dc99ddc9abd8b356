use std::collections::HashSet;

use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::error::invalid;
use crate::model::payroll::round_money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScheduleType {
    /// Same clock-in/clock-out every working day.
    Fixed,
    /// Only a number of hours is required per working day.
    Flexible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WorkDay {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScheduleDay {
    #[schema(example = "monday")]
    pub day: WorkDay,

    #[schema(example = "08:00:00", value_type = Option<String>, format = "time")]
    #[serde(default)]
    pub start_time: Option<NaiveTime>,

    #[schema(example = "17:00:00", value_type = Option<String>, format = "time")]
    #[serde(default)]
    pub end_time: Option<NaiveTime>,

    #[schema(example = 60)]
    #[serde(default)]
    pub break_minutes: Option<u32>,

    /// Flexible schedules only.
    #[schema(example = 8.0, value_type = Option<f64>)]
    #[serde(default)]
    pub required_hours: Option<Decimal>,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct Schedule {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "Office 8-5")]
    pub name: String,
    #[schema(example = "fixed")]
    pub schedule_type: String,
    #[schema(value_type = Vec<ScheduleDay>)]
    pub days: Json<Vec<ScheduleDay>>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

pub fn validate_days(schedule_type: ScheduleType, days: &[ScheduleDay]) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if days.is_empty() {
        errors.add("days", invalid("required", "at least one working day is required"));
        return Err(errors);
    }

    let mut seen = HashSet::new();
    for day in days {
        if !seen.insert(day.day) {
            errors.add("days", invalid("duplicate", format!("{} is listed more than once", day.day)));
        }

        match schedule_type {
            ScheduleType::Fixed => match (day.start_time, day.end_time) {
                (Some(start), Some(end)) if start < end => {
                    let shift = (end - start).num_minutes();
                    if i64::from(day.break_minutes.unwrap_or(0)) >= shift {
                        errors.add(
                            "days",
                            invalid("break", format!("{}: break must be shorter than the shift", day.day)),
                        );
                    }
                }
                (Some(_), Some(_)) => errors.add(
                    "days",
                    invalid("range", format!("{}: start_time must be before end_time", day.day)),
                ),
                _ => errors.add(
                    "days",
                    invalid("required", format!("{}: start_time and end_time are required", day.day)),
                ),
            },
            ScheduleType::Flexible => match day.required_hours {
                Some(hours) if hours > Decimal::ZERO && hours <= Decimal::from(24) => {}
                Some(_) => errors.add(
                    "days",
                    invalid("range", format!("{}: required_hours must be within (0, 24]", day.day)),
                ),
                None => errors.add(
                    "days",
                    invalid("required", format!("{}: required_hours is required", day.day)),
                ),
            },
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Scheduled working hours per week. Assumes `days` already passed
/// [`validate_days`]; days missing their fields count as zero.
pub fn weekly_hours(schedule_type: ScheduleType, days: &[ScheduleDay]) -> Decimal {
    let total: Decimal = days
        .iter()
        .map(|day| match schedule_type {
            ScheduleType::Fixed => match (day.start_time, day.end_time) {
                (Some(start), Some(end)) => {
                    let minutes = (end - start).num_minutes() - i64::from(day.break_minutes.unwrap_or(0));
                    Decimal::from(minutes.max(0)) / Decimal::from(60)
                }
                _ => Decimal::ZERO,
            },
            ScheduleType::Flexible => day.required_hours.unwrap_or_default(),
        })
        .sum();
    round_money(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn fixed(day: WorkDay, start: &str, end: &str, break_minutes: u32) -> ScheduleDay {
        ScheduleDay {
            day,
            start_time: Some(t(start)),
            end_time: Some(t(end)),
            break_minutes: Some(break_minutes),
            required_hours: None,
        }
    }

    fn flexible(day: WorkDay, hours: i64) -> ScheduleDay {
        ScheduleDay {
            day,
            start_time: None,
            end_time: None,
            break_minutes: None,
            required_hours: Some(Decimal::from(hours)),
        }
    }

    #[test]
    fn fixed_week_hours_subtract_breaks() {
        let days: Vec<_> = [WorkDay::Monday, WorkDay::Tuesday, WorkDay::Wednesday, WorkDay::Thursday, WorkDay::Friday]
            .into_iter()
            .map(|d| fixed(d, "08:00", "17:00", 60))
            .collect();
        assert!(validate_days(ScheduleType::Fixed, &days).is_ok());
        assert_eq!(weekly_hours(ScheduleType::Fixed, &days), Decimal::from(40));
    }

    #[test]
    fn flexible_week_sums_required_hours() {
        let days = vec![flexible(WorkDay::Monday, 8), flexible(WorkDay::Saturday, 4)];
        assert!(validate_days(ScheduleType::Flexible, &days).is_ok());
        assert_eq!(weekly_hours(ScheduleType::Flexible, &days), Decimal::from(12));
    }

    #[test]
    fn empty_schedule_is_rejected() {
        let errors = validate_days(ScheduleType::Fixed, &[]).unwrap_err();
        assert!(errors.field_errors().contains_key("days"));
    }

    #[test]
    fn duplicate_weekday_is_rejected() {
        let days = vec![fixed(WorkDay::Monday, "08:00", "17:00", 0), fixed(WorkDay::Monday, "09:00", "18:00", 0)];
        let errors = validate_days(ScheduleType::Fixed, &days).unwrap_err();
        let messages = crate::error::field_messages(&errors);
        assert!(messages["days"].iter().any(|m| m.contains("more than once")));
    }

    #[test]
    fn inverted_shift_and_oversized_break_are_rejected() {
        let inverted = vec![fixed(WorkDay::Monday, "17:00", "08:00", 0)];
        assert!(validate_days(ScheduleType::Fixed, &inverted).is_err());

        let long_break = vec![fixed(WorkDay::Tuesday, "08:00", "09:00", 60)];
        assert!(validate_days(ScheduleType::Fixed, &long_break).is_err());
    }

    #[test]
    fn fixed_day_without_times_is_rejected() {
        let days = vec![flexible(WorkDay::Monday, 8)];
        assert!(validate_days(ScheduleType::Fixed, &days).is_err());
    }

    #[test]
    fn flexible_hours_must_be_in_range() {
        assert!(validate_days(ScheduleType::Flexible, &[flexible(WorkDay::Monday, 0)]).is_err());
        assert!(validate_days(ScheduleType::Flexible, &[flexible(WorkDay::Monday, 25)]).is_err());
        assert!(validate_days(ScheduleType::Flexible, &[flexible(WorkDay::Monday, 24)]).is_ok());
    }

    #[test]
    fn days_deserialize_from_json() {
        let days: Vec<ScheduleDay> = serde_json::from_str(
            r#"[{"day":"friday","start_time":"08:30:00","end_time":"17:30:00","break_minutes":30}]"#,
        )
        .unwrap();
        assert_eq!(days[0].day, WorkDay::Friday);
        assert_eq!(weekly_hours(ScheduleType::Fixed, &days), Decimal::new(850, 2));
    }
}
