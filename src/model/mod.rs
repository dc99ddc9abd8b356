pub mod employee;
pub mod leave_request;
pub mod lookup;
pub mod notification;
pub mod payroll;
pub mod role;
pub mod schedule;
