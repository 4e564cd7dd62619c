// src/store.rs
//
// In-memory data store standing in for the platform database. Explicitly
// constructed and passed around as a handle (no module-level singleton).
//
// All tables sit behind one Mutex so compound mutations (entry generation
// plus period-total update, create-with-entries, cascade delete) commit
// atomically: a reader never observes a period with entries but a stale
// total, or entries without their period. Every accessor takes the tenant's
// organization id and filters on it; cross-tenant reads are impossible
// through this API.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::model::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitError {
    PeriodNotFound,
    PeriodNotPending,
}

#[derive(Debug, Default)]
struct StoreInner {
    periods: HashMap<String, PayrollPeriod>,
    entries: HashMap<String, PayrollEntry>,
    drivers: HashMap<String, Driver>,
    providers: HashMap<String, ServiceProvider>,
    vehicles: HashMap<String, Vehicle>,
    attendance: Vec<AttendanceRecord>,
    routes: HashMap<String, Route>,
    route_stops: Vec<RouteStop>,
    completions: Vec<RouteCompletion>,
    employees: HashMap<String, Employee>,
    departments: HashMap<String, Department>,
    shifts: HashMap<String, Shift>,
}

/// Seed fixture shape, loaded from JSON at startup in place of the
/// out-of-scope ingestion subsystems.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeedData {
    pub drivers: Vec<Driver>,
    pub service_providers: Vec<ServiceProvider>,
    pub vehicles: Vec<Vehicle>,
    pub attendance_records: Vec<AttendanceRecord>,
    pub routes: Vec<Route>,
    pub route_stops: Vec<RouteStop>,
    pub route_completions: Vec<RouteCompletion>,
    pub employees: Vec<Employee>,
    pub departments: Vec<Department>,
    pub shifts: Vec<Shift>,
}

pub struct FleetStore {
    inner: Mutex<StoreInner>,
}

impl FleetStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
        }
    }

    pub fn load_seed(&self, seed: SeedData) {
        let mut inner = self.inner.lock().unwrap();
        let counts = (
            seed.drivers.len(),
            seed.service_providers.len(),
            seed.vehicles.len(),
            seed.attendance_records.len(),
        );
        for d in seed.drivers {
            inner.drivers.insert(d.id.clone(), d);
        }
        for p in seed.service_providers {
            inner.providers.insert(p.id.clone(), p);
        }
        for v in seed.vehicles {
            inner.vehicles.insert(v.id.clone(), v);
        }
        inner.attendance.extend(seed.attendance_records);
        for r in seed.routes {
            inner.routes.insert(r.id.clone(), r);
        }
        inner.route_stops.extend(seed.route_stops);
        inner.completions.extend(seed.route_completions);
        for e in seed.employees {
            inner.employees.insert(e.id.clone(), e);
        }
        for d in seed.departments {
            inner.departments.insert(d.id.clone(), d);
        }
        for s in seed.shifts {
            inner.shifts.insert(s.id.clone(), s);
        }
        info!(
            "Seed loaded: {} drivers, {} providers, {} vehicles, {} attendance rows",
            counts.0, counts.1, counts.2, counts.3
        );
    }

    // --- Reference data (read-only to the payroll core) ---

    pub fn insert_driver(&self, driver: Driver) {
        self.inner
            .lock()
            .unwrap()
            .drivers
            .insert(driver.id.clone(), driver);
    }

    pub fn insert_provider(&self, provider: ServiceProvider) {
        self.inner
            .lock()
            .unwrap()
            .providers
            .insert(provider.id.clone(), provider);
    }

    pub fn insert_vehicle(&self, vehicle: Vehicle) {
        self.inner
            .lock()
            .unwrap()
            .vehicles
            .insert(vehicle.id.clone(), vehicle);
    }

    pub fn insert_attendance(&self, record: AttendanceRecord) {
        self.inner.lock().unwrap().attendance.push(record);
    }

    pub fn insert_route(&self, route: Route) {
        self.inner
            .lock()
            .unwrap()
            .routes
            .insert(route.id.clone(), route);
    }

    pub fn insert_route_stop(&self, stop: RouteStop) {
        self.inner.lock().unwrap().route_stops.push(stop);
    }

    pub fn insert_completion(&self, completion: RouteCompletion) {
        self.inner.lock().unwrap().completions.push(completion);
    }

    pub fn insert_employee(&self, employee: Employee) {
        self.inner
            .lock()
            .unwrap()
            .employees
            .insert(employee.id.clone(), employee);
    }

    pub fn insert_department(&self, department: Department) {
        self.inner
            .lock()
            .unwrap()
            .departments
            .insert(department.id.clone(), department);
    }

    pub fn insert_shift(&self, shift: Shift) {
        self.inner
            .lock()
            .unwrap()
            .shifts
            .insert(shift.id.clone(), shift);
    }

    pub fn vehicles_for_org(&self, org: &str) -> BTreeMap<VehicleId, Vehicle> {
        self.inner
            .lock()
            .unwrap()
            .vehicles
            .values()
            .filter(|v| v.organization_id == org)
            .map(|v| (v.id.clone(), v.clone()))
            .collect()
    }

    pub fn drivers_for_org(&self, org: &str) -> BTreeMap<DriverId, Driver> {
        self.inner
            .lock()
            .unwrap()
            .drivers
            .values()
            .filter(|d| d.organization_id == org)
            .map(|d| (d.id.clone(), d.clone()))
            .collect()
    }

    pub fn providers_for_org(&self, org: &str) -> BTreeMap<ProviderId, ServiceProvider> {
        self.inner
            .lock()
            .unwrap()
            .providers
            .values()
            .filter(|p| p.organization_id == org)
            .map(|p| (p.id.clone(), p.clone()))
            .collect()
    }

    /// Vehicle count of a provider's fleet as it stands right now.
    pub fn provider_fleet_count(&self, org: &str, provider_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .vehicles
            .values()
            .filter(|v| {
                v.organization_id == org
                    && v.service_provider_id.as_deref() == Some(provider_id)
            })
            .count()
    }

    pub fn attendance_in_range(
        &self,
        org: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<AttendanceRecord> {
        self.inner
            .lock()
            .unwrap()
            .attendance
            .iter()
            .filter(|a| a.organization_id == org && a.date >= start && a.date <= end)
            .cloned()
            .collect()
    }

    pub fn completions_in_range(
        &self,
        org: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<RouteCompletion> {
        self.inner
            .lock()
            .unwrap()
            .completions
            .iter()
            .filter(|c| c.organization_id == org && c.date >= start && c.date <= end)
            .cloned()
            .collect()
    }

    pub fn routes_for_org(&self, org: &str) -> BTreeMap<RouteId, Route> {
        self.inner
            .lock()
            .unwrap()
            .routes
            .values()
            .filter(|r| r.organization_id == org)
            .map(|r| (r.id.clone(), r.clone()))
            .collect()
    }

    pub fn route_stops_for_org(&self, org: &str) -> Vec<RouteStop> {
        self.inner
            .lock()
            .unwrap()
            .route_stops
            .iter()
            .filter(|s| s.organization_id == org)
            .cloned()
            .collect()
    }

    pub fn employees_for_org(&self, org: &str) -> Vec<Employee> {
        self.inner
            .lock()
            .unwrap()
            .employees
            .values()
            .filter(|e| e.organization_id == org)
            .cloned()
            .collect()
    }

    pub fn departments_for_org(&self, org: &str) -> Vec<Department> {
        let mut departments: Vec<Department> = self
            .inner
            .lock()
            .unwrap()
            .departments
            .values()
            .filter(|d| d.organization_id == org)
            .cloned()
            .collect();
        departments.sort_by(|a, b| a.id.cmp(&b.id));
        departments
    }

    pub fn shifts_for_org(&self, org: &str) -> Vec<Shift> {
        let mut shifts: Vec<Shift> = self
            .inner
            .lock()
            .unwrap()
            .shifts
            .values()
            .filter(|s| s.organization_id == org)
            .cloned()
            .collect();
        shifts.sort_by(|a, b| a.id.cmp(&b.id));
        shifts
    }

    // --- Payroll periods and entries ---

    /// Periods of one organization, optionally filtered by status, newest
    /// start date first.
    pub fn list_periods(&self, org: &str, status: Option<PeriodStatus>) -> Vec<PayrollPeriod> {
        let inner = self.inner.lock().unwrap();
        let mut periods: Vec<PayrollPeriod> = inner
            .periods
            .values()
            .filter(|p| p.organization_id == org && status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        periods.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(a.id.cmp(&b.id)));
        periods
    }

    /// Cross-tenant listing for the superadmin surface.
    pub fn list_periods_all(
        &self,
        org: Option<&str>,
        status: Option<PeriodStatus>,
    ) -> Vec<PayrollPeriod> {
        let inner = self.inner.lock().unwrap();
        let mut periods: Vec<PayrollPeriod> = inner
            .periods
            .values()
            .filter(|p| {
                org.map_or(true, |o| p.organization_id == o)
                    && status.map_or(true, |s| p.status == s)
            })
            .cloned()
            .collect();
        periods.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(a.id.cmp(&b.id)));
        periods
    }

    pub fn get_period(&self, org: &str, id: &str) -> Option<PayrollPeriod> {
        self.inner
            .lock()
            .unwrap()
            .periods
            .get(id)
            .filter(|p| p.organization_id == org)
            .cloned()
    }

    /// First period of the organization whose [start, end] interval overlaps
    /// the given one (inclusive boundaries count as overlap).
    pub fn find_overlapping_period(
        &self,
        org: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<PayrollPeriod> {
        let inner = self.inner.lock().unwrap();
        inner
            .periods
            .values()
            .filter(|p| p.organization_id == org)
            .find(|p| intervals_overlap(p.start_date, p.end_date, start, end))
            .cloned()
    }

    /// Inserts a new period unless an overlapping one exists; the check and
    /// the insert happen under one lock so concurrent creates cannot both
    /// pass validation.
    pub fn insert_period(&self, period: PayrollPeriod) -> Result<PayrollPeriod, PayrollPeriod> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner
            .periods
            .values()
            .filter(|p| p.organization_id == period.organization_id)
            .find(|p| {
                intervals_overlap(p.start_date, p.end_date, period.start_date, period.end_date)
            })
        {
            return Err(existing.clone());
        }
        inner.periods.insert(period.id.clone(), period.clone());
        debug!("Inserted payroll period {}", period.id);
        Ok(period)
    }

    /// Inserts a period together with its generated entries in one commit
    /// (the filtered-generation path). Fails with the conflicting period on
    /// overlap, leaving nothing behind.
    pub fn insert_period_with_entries(
        &self,
        period: PayrollPeriod,
        entries: Vec<PayrollEntry>,
    ) -> Result<PayrollPeriod, PayrollPeriod> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner
            .periods
            .values()
            .filter(|p| p.organization_id == period.organization_id)
            .find(|p| {
                intervals_overlap(p.start_date, p.end_date, period.start_date, period.end_date)
            })
        {
            return Err(existing.clone());
        }
        inner.periods.insert(period.id.clone(), period.clone());
        for entry in entries {
            inner.entries.insert(entry.id.clone(), entry);
        }
        debug!("Inserted payroll period {} with entries", period.id);
        Ok(period)
    }

    pub fn entries_for_period(&self, org: &str, period_id: &str) -> Vec<PayrollEntry> {
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<PayrollEntry> = inner
            .entries
            .values()
            .filter(|e| e.organization_id == org && e.payroll_period_id == period_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    /// Commits generated entries plus the recomputed period total in one
    /// transaction. Re-validates the PENDING state under the lock so a racing
    /// second generation is rejected rather than double-creating entries.
    /// Marks the period PROCESSED on success.
    pub fn commit_generated_entries(
        &self,
        org: &str,
        period_id: &str,
        entries: Vec<PayrollEntry>,
        total: Decimal,
    ) -> Result<(PayrollPeriod, Vec<PayrollEntry>), CommitError> {
        let mut inner = self.inner.lock().unwrap();
        let period = inner
            .periods
            .get_mut(period_id)
            .filter(|p| p.organization_id == org)
            .ok_or(CommitError::PeriodNotFound)?;
        if period.status != PeriodStatus::Pending {
            return Err(CommitError::PeriodNotPending);
        }
        period.total_amount = total;
        period.status = PeriodStatus::Processed;
        let period = period.clone();
        for entry in &entries {
            inner.entries.insert(entry.id.clone(), entry.clone());
        }
        debug!(
            "Committed {} entries for period {} (total {})",
            entries.len(),
            period_id,
            total
        );
        Ok((period, entries))
    }

    pub fn set_period_status(
        &self,
        org: &str,
        period_id: &str,
        status: PeriodStatus,
    ) -> Option<PayrollPeriod> {
        let mut inner = self.inner.lock().unwrap();
        let period = inner
            .periods
            .get_mut(period_id)
            .filter(|p| p.organization_id == org)?;
        period.status = status;
        Some(period.clone())
    }

    /// Applies an already-patched entry and re-derives the owning period's
    /// total from all of its current entries, atomically. The full re-sum
    /// (rather than an incremental delta) keeps the total correct under
    /// concurrent entry edits.
    pub fn update_entry(
        &self,
        org: &str,
        period_id: &str,
        entry: PayrollEntry,
    ) -> Option<(PayrollEntry, PayrollPeriod)> {
        let mut inner = self.inner.lock().unwrap();
        if !inner
            .entries
            .get(&entry.id)
            .map_or(false, |e| {
                e.organization_id == org && e.payroll_period_id == period_id
            })
        {
            return None;
        }
        inner.entries.insert(entry.id.clone(), entry.clone());
        let total: Decimal = inner
            .entries
            .values()
            .filter(|e| e.organization_id == org && e.payroll_period_id == period_id)
            .map(|e| e.net_pay)
            .sum();
        let period = inner
            .periods
            .get_mut(period_id)
            .filter(|p| p.organization_id == org)?;
        period.total_amount = total;
        Some((entry, period.clone()))
    }

    pub fn get_entry(&self, org: &str, period_id: &str, entry_id: &str) -> Option<PayrollEntry> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .get(entry_id)
            .filter(|e| e.organization_id == org && e.payroll_period_id == period_id)
            .cloned()
    }

    /// Deletes a period and all of its entries in one commit. The PAID guard
    /// lives in the service layer; this is the raw cascade.
    pub fn delete_period_cascade(&self, org: &str, period_id: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let existed = inner
            .periods
            .get(period_id)
            .map_or(false, |p| p.organization_id == org);
        if !existed {
            return false;
        }
        inner.periods.remove(period_id);
        inner
            .entries
            .retain(|_, e| !(e.organization_id == org && e.payroll_period_id == period_id));
        debug!("Deleted payroll period {} and its entries", period_id);
        true
    }

    /// Entries across all periods of one organization in a date-bounded set
    /// of periods; used by the KPI engine.
    pub fn entries_for_periods(&self, org: &str, period_ids: &[String]) -> Vec<PayrollEntry> {
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<PayrollEntry> = inner
            .entries
            .values()
            .filter(|e| {
                e.organization_id == org && period_ids.iter().any(|id| *id == e.payroll_period_id)
            })
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    /// Cross-tenant entry listing for superadmin stats.
    pub fn entries_all(&self, org: Option<&str>) -> Vec<PayrollEntry> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .values()
            .filter(|e| org.map_or(true, |o| e.organization_id == o))
            .cloned()
            .collect()
    }
}

/// Inclusive interval overlap: boundary contact counts as conflict.
pub fn intervals_overlap(
    a_start: NaiveDate,
    a_end: NaiveDate,
    b_start: NaiveDate,
    b_end: NaiveDate,
) -> bool {
    a_start <= b_end && b_start <= a_end
}
