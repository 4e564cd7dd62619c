// src/model.rs
//
// Domain entities for the payroll core. Everything the engine reads from the
// wider fleet platform (drivers, vehicles, attendance, routes, org structure)
// is modelled here as plain data; only PayrollPeriod and PayrollEntry are
// owned and mutated by this crate.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type OrgId = String;
pub type DriverId = String;
pub type ProviderId = String;
pub type VehicleId = String;
pub type DepartmentId = String;
pub type ShiftId = String;
pub type RouteId = String;
pub type EmployeeId = String;
pub type LocationId = String;

// --- Closed enums (stringly-typed in the upstream schema) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodStatus {
    Pending,
    Processed,
    Cancelled,
    Paid,
}

impl PeriodStatus {
    pub const ALLOWED: [&'static str; 4] = ["PENDING", "PROCESSED", "CANCELLED", "PAID"];
}

impl fmt::Display for PeriodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeriodStatus::Pending => "PENDING",
            PeriodStatus::Processed => "PROCESSED",
            PeriodStatus::Cancelled => "CANCELLED",
            PeriodStatus::Paid => "PAID",
        };
        f.write_str(s)
    }
}

impl FromStr for PeriodStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PeriodStatus::Pending),
            "PROCESSED" => Ok(PeriodStatus::Processed),
            "CANCELLED" => Ok(PeriodStatus::Cancelled),
            "PAID" => Ok(PeriodStatus::Paid),
            other => Err(format!(
                "invalid status '{}', expected one of {:?}",
                other,
                PeriodStatus::ALLOWED
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayrollType {
    /// In-house driver paid through the salary/hourly rules.
    Salary,
    /// Service provider paid through the filtered-generation fee formula.
    ServiceFee,
    /// Service provider paid through the plain-generation formula.
    ServiceProvider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    BankTransfer,
    Cash,
    Cheque,
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::BankTransfer
    }
}

/// Whether a vehicle is operated in-house (driver payroll) or outsourced to a
/// service provider (fee payroll).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleOwnership {
    InHouse,
    Outsourced,
}

// --- Owned entities ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayrollPeriod {
    pub id: String,
    pub organization_id: OrgId,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Sum of this period's entries' net pay. Recomputed after every
    /// generation or entry edit, never edited directly.
    pub total_amount: Decimal,
    pub status: PeriodStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayrollEntry {
    pub id: String,
    pub payroll_period_id: String,
    pub organization_id: OrgId,
    /// Exactly one of driver_id / service_provider_id is set.
    pub driver_id: Option<DriverId>,
    pub service_provider_id: Option<ProviderId>,
    pub vehicle_id: Option<VehicleId>,
    pub payroll_type: PayrollType,
    /// Base pay before bonuses and deductions.
    pub amount: Decimal,
    pub bonuses: Decimal,
    pub deductions: Decimal,
    /// Always amount + bonuses - deductions.
    pub net_pay: Decimal,
    pub days_worked: u32,
    pub hours_worked: Option<Decimal>,
    pub trips_completed: u32,
    pub kms_covered: Decimal,
    pub payment_method: PaymentMethod,
    pub status: String,
}

impl PayrollEntry {
    /// Re-derives net_pay from the current amount/bonuses/deductions triple.
    pub fn recompute_net_pay(&mut self) {
        self.net_pay = self.amount + self.bonuses - self.deductions;
    }
}

// --- Read-only reference entities supplied by the wider platform ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: DriverId,
    pub organization_id: OrgId,
    pub name: String,
    /// Flat monthly salary. Mutually exclusive with hourly_rate; one of the
    /// two must be present for an entry to be generated.
    pub base_salary: Option<Decimal>,
    pub hourly_rate: Option<Decimal>,
    /// Overtime multiplier, defaults to 1.5 when absent.
    pub overtime_rate: Option<Decimal>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProvider {
    pub id: ProviderId,
    pub organization_id: OrgId,
    pub name: String,
    pub monthly_rate: Option<Decimal>,
    pub per_km_rate: Option<Decimal>,
    pub per_trip_rate: Option<Decimal>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: VehicleId,
    pub organization_id: OrgId,
    pub plate_number: String,
    /// Free-form category string ("truck", "van", ...). The vehicle-category
    /// KPI groups on this, there is no separate category entity.
    pub vehicle_type: String,
    pub ownership: VehicleOwnership,
    pub service_provider_id: Option<ProviderId>,
    /// Fallback rate for providers with no configured rates.
    pub daily_rate: Option<Decimal>,
    pub location_id: Option<LocationId>,
}

/// One raw attendance/usage row, the unit the aggregator consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub organization_id: OrgId,
    pub date: NaiveDate,
    pub driver_id: Option<DriverId>,
    pub vehicle_id: VehicleId,
    pub shift_id: Option<ShiftId>,
    pub hours_worked: Option<Decimal>,
    pub trips_completed: Option<u32>,
    pub kms_covered: Option<Decimal>,
    /// Monetary amounts arrive as raw strings from the ingestion pipeline and
    /// are parsed defensively (bad values count as zero).
    pub fuel_cost: Option<String>,
    pub toll_cost: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteCompletion {
    pub id: String,
    pub organization_id: OrgId,
    pub route_id: RouteId,
    pub date: NaiveDate,
    pub distance_km: Option<Decimal>,
    pub stops_completed: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: RouteId,
    pub organization_id: OrgId,
    pub name: String,
    pub vehicle_id: Option<VehicleId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStop {
    pub id: String,
    pub organization_id: OrgId,
    pub route_id: RouteId,
    pub employee_id: Option<EmployeeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: EmployeeId,
    pub organization_id: OrgId,
    pub name: String,
    pub department_id: Option<DepartmentId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: DepartmentId,
    pub organization_id: OrgId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shift {
    pub id: ShiftId,
    pub organization_id: OrgId,
    pub name: String,
}
