use crate::api::employee::{
    CreateEmployee, EmployeeListResponse, EmployeeQuery, ImportSummary, UpdateEmployee,
};
use crate::api::leave_request::{CreateLeave, LeaveFilter, LeaveListResponse};
use crate::api::lookup::CreateLookup;
use crate::api::notification::{NotificationListResponse, NotificationQuery, UnreadCount};
use crate::api::payroll::{
    CreatePayroll, DeductionInput, GeneratePayroll, GenerateSummary, PaginatedPayrollResponse,
    PayrollQuery, UpdatePayroll,
};
use crate::api::schedule::{SchedulePayload, ScheduleResponse};
use crate::error::RowError;
use crate::model::employee::{Employee, EmploymentStatus};
use crate::model::leave_request::{LeaveRequest, LeaveStatus, LeaveType};
use crate::model::lookup::{Lookup, LookupItem};
use crate::model::notification::Notification;
use crate::model::payroll::{PaySchedule, PayTotals, PayrollRecord, PayrollStatus};
use crate::model::schedule::{Schedule, ScheduleDay, ScheduleType, WorkDay};
use crate::utils::export::{ExportFormat, ExportQuery};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Payroll & HR API",
        version = "1.0.0",
        description = r#"
## Payroll & HR Administration

Back office API for employee records, work schedules and payroll.

### 🔹 Key Features
- **Employees**
  - Create, update, soft delete, list and view employee profiles
  - Bulk import from CSV or XLSX, export to CSV, XLSX or PDF
- **Payroll**
  - Manual records or batch generation for a pay period
  - Recompute on edit, approve, and download a PDF payslip
- **Schedules**
  - Fixed (clock times) and flexible (required hours) weekly schedules
- **Leave**
  - Request leave, approve or reject
- **Notifications**
  - Per-user inbox for imports, approvals and leave decisions

### 🔐 Security
Every endpoint below is protected using **JWT Bearer authentication**.
Writes are restricted to the **Admin** and **HR** roles; payroll approval is Admin only.

### 📦 Response Format
- JSON-based RESTful responses
- Money is returned as a number rounded to two decimals
- Validation failures return `422` with per-field messages
"#,
    ),
    paths(
        crate::api::employee::create_employee,
        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,
        crate::api::employee::import_employees,
        crate::api::employee::export_employees,

        crate::api::payroll::create_payroll,
        crate::api::payroll::generate_payroll,
        crate::api::payroll::update_payroll,
        crate::api::payroll::regenerate_payroll,
        crate::api::payroll::approve_payroll,
        crate::api::payroll::download_payslip,
        crate::api::payroll::get_payroll,
        crate::api::payroll::list_payrolls,
        crate::api::payroll::export_payrolls,

        crate::api::schedule::create_schedule,
        crate::api::schedule::list_schedules,
        crate::api::schedule::get_schedule,
        crate::api::schedule::update_schedule,
        crate::api::schedule::delete_schedule,

        crate::api::notification::list_notifications,
        crate::api::notification::get_unread_count,
        crate::api::notification::mark_read,
        crate::api::notification::mark_all_read,

        crate::api::leave_request::leave_list,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::create_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,

        crate::api::lookup::list_lookup,
        crate::api::lookup::create_lookup
    ),
    components(
        schemas(
            CreateEmployee,
            UpdateEmployee,
            EmployeeQuery,
            Employee,
            EmploymentStatus,
            EmployeeListResponse,
            ImportSummary,
            RowError,
            CreatePayroll,
            DeductionInput,
            UpdatePayroll,
            GeneratePayroll,
            GenerateSummary,
            PayrollQuery,
            PayrollRecord,
            PayTotals,
            PaySchedule,
            PayrollStatus,
            PaginatedPayrollResponse,
            SchedulePayload,
            ScheduleResponse,
            Schedule,
            ScheduleDay,
            ScheduleType,
            WorkDay,
            NotificationQuery,
            NotificationListResponse,
            Notification,
            UnreadCount,
            CreateLeave,
            LeaveFilter,
            LeaveListResponse,
            LeaveRequest,
            LeaveType,
            LeaveStatus,
            Lookup,
            LookupItem,
            CreateLookup,
            ExportFormat,
            ExportQuery
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Employee", description = "Employee records, import and export"),
        (name = "Payroll", description = "Payroll computation and approval"),
        (name = "Schedule", description = "Work schedule management"),
        (name = "Notification", description = "User notifications"),
        (name = "Leave", description = "Leave management APIs"),
        (name = "Lookup", description = "Departments, sites and positions"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_registers_routes_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/payroll/{id}/approve"));
        assert!(doc.paths.paths.contains_key("/api/v1/employees/import"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.schemas.contains_key("PayrollRecord"));
    }
}
