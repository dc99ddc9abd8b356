use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

/// Reference tables employees point at. Each is a plain id + name list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Lookup {
    Department,
    Site,
    Position,
}

impl Lookup {
    pub fn table(self) -> &'static str {
        match self {
            Lookup::Department => "departments",
            Lookup::Site => "sites",
            Lookup::Position => "positions",
        }
    }

    /// Column on `employees` referencing this table.
    pub fn employee_column(self) -> &'static str {
        match self {
            Lookup::Department => "department_id",
            Lookup::Site => "site_id",
            Lookup::Position => "position_id",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct LookupItem {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "Finance")]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_names_map_to_tables() {
        let lookup: Lookup = "position".parse().unwrap();
        assert_eq!(lookup.table(), "positions");
        assert_eq!(lookup.employee_column(), "position_id");
        assert!("job_title".parse::<Lookup>().is_err());
    }
}
