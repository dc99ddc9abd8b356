use strum_macros::Display;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Admin = 1,
    Hr = 2,
    Employee = 3,
    System = 4,
    ApiUser = 5,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Hr),
            3 => Some(Role::Employee),
            4 => Some(Role::System),
            5 => Some(Role::ApiUser),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Roles allowed to prepare payroll and maintain employee records.
    pub fn is_hr_staff(self) -> bool {
        matches!(self, Role::Admin | Role::Hr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        for id in 1..=5u8 {
            assert_eq!(Role::from_id(id).map(Role::id), Some(id));
        }
        assert_eq!(Role::from_id(0), None);
        assert_eq!(Role::from_id(6), None);
    }

    #[test]
    fn only_admin_and_hr_are_staff() {
        assert!(Role::Admin.is_hr_staff());
        assert!(Role::Hr.is_hr_staff());
        assert!(!Role::Employee.is_hr_staff());
        assert!(!Role::ApiUser.is_hr_staff());
        assert_eq!(Role::ApiUser.to_string(), "api_user");
    }
}
