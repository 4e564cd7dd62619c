// src/periods.rs
//
// Payroll period lifecycle: creation with overlap validation, entry
// generation (plain and filtered pipelines), status transitions, entry
// patching with total recomputation, and the deletion guard. All business
// checks run before any mutation; the store commits each mutation
// atomically.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregation::{summarize_attendance, AttendanceSummary};
use crate::compensation::{
    calculate_driver_pay, FilteredServiceProviderPolicy, PlainServiceProviderPolicy,
};
use crate::model::*;
use crate::store::{CommitError, FleetStore};

#[derive(Error, Debug)]
pub enum PayrollError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    EmptyResult(String),
    #[error("{message}")]
    Conflict {
        message: String,
        existing_period: PayrollPeriod,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

// --- Request / response DTOs ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePeriodRequest {
    pub name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationFilters {
    pub vehicle_type: Option<String>,
    pub shift_ids: Option<Vec<ShiftId>>,
    pub department_ids: Option<Vec<DepartmentId>>,
    pub location_ids: Option<Vec<LocationId>>,
    pub vehicle_ids: Option<Vec<VehicleId>>,
}

impl GenerationFilters {
    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(t) = &self.vehicle_type {
            parts.push(format!("vehicleType={}", t));
        }
        if let Some(s) = &self.shift_ids {
            parts.push(format!("shiftIds={:?}", s));
        }
        if let Some(d) = &self.department_ids {
            parts.push(format!("departmentIds={:?}", d));
        }
        if let Some(l) = &self.location_ids {
            parts.push(format!("locationIds={:?}", l));
        }
        if let Some(v) = &self.vehicle_ids {
            parts.push(format!("vehicleIds={:?}", v));
        }
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(", ")
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateFilteredRequest {
    pub name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub filters: GenerationFilters,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPatch {
    pub amount: Option<Decimal>,
    pub bonuses: Option<Decimal>,
    pub deductions: Option<Decimal>,
    pub status: Option<String>,
}

impl EntryPatch {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.bonuses.is_none()
            && self.deductions.is_none()
            && self.status.is_none()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodPage {
    pub periods: Vec<PayrollPeriod>,
    pub pagination: Pagination,
}

/// Entry enriched with the projections the UI joins in.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDetail {
    #[serde(flatten)]
    pub entry: PayrollEntry,
    pub driver: Option<Driver>,
    pub service_provider: Option<ServiceProvider>,
    pub vehicle: Option<Vehicle>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodDetail {
    #[serde(flatten)]
    pub period: PayrollPeriod,
    pub entries: Vec<EntryDetail>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedResponse {
    pub message: String,
    pub entries: Vec<PayrollEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredGeneratedResponse {
    pub message: String,
    pub period: PayrollPeriod,
    pub entries_count: usize,
    pub total_amount: Decimal,
    pub filters: GenerationFilters,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperadminStats {
    pub total_periods: usize,
    pub total_amount: Decimal,
    pub pending_periods: usize,
    pub processed_periods: usize,
    pub paid_periods: usize,
    pub total_entries: usize,
    pub driver_entries: usize,
    pub service_provider_entries: usize,
}

const DEFAULT_PAGE_LIMIT: usize = 10;
const MAX_PAGE_LIMIT: usize = 100;

fn paginate<T: Clone>(items: &[T], page: usize, limit: usize) -> (Vec<T>, Pagination) {
    let page = page.max(1);
    let limit = limit.clamp(1, MAX_PAGE_LIMIT);
    let total = items.len();
    let total_pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
    let start = (page - 1) * limit;
    let slice = if start >= total {
        Vec::new()
    } else {
        items[start..(start + limit).min(total)].to_vec()
    };
    (
        slice,
        Pagination {
            page,
            limit,
            total,
            total_pages,
        },
    )
}

fn parse_status(raw: &str) -> Result<PeriodStatus, PayrollError> {
    raw.parse::<PeriodStatus>().map_err(PayrollError::Validation)
}

pub struct PayrollService {
    store: Arc<FleetStore>,
}

impl PayrollService {
    pub fn new(store: Arc<FleetStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<FleetStore> {
        &self.store
    }

    // --- Listing and detail ---

    pub fn list_periods(
        &self,
        org: &str,
        status: Option<&str>,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> Result<PeriodPage, PayrollError> {
        let status = status.map(parse_status).transpose()?;
        let periods = self.store.list_periods(org, status);
        let (periods, pagination) = paginate(
            &periods,
            page.unwrap_or(1),
            limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        );
        Ok(PeriodPage {
            periods,
            pagination,
        })
    }

    pub fn get_period_detail(&self, org: &str, id: &str) -> Result<PeriodDetail, PayrollError> {
        let period = self
            .store
            .get_period(org, id)
            .ok_or_else(|| PayrollError::NotFound(format!("Payroll period {} not found", id)))?;
        let entries = self.store.entries_for_period(org, id);
        let drivers = self.store.drivers_for_org(org);
        let providers = self.store.providers_for_org(org);
        let vehicles = self.store.vehicles_for_org(org);
        let entries = entries
            .into_iter()
            .map(|entry| {
                let driver = entry.driver_id.as_ref().and_then(|d| drivers.get(d)).cloned();
                let service_provider = entry
                    .service_provider_id
                    .as_ref()
                    .and_then(|p| providers.get(p))
                    .cloned();
                let vehicle = entry
                    .vehicle_id
                    .as_ref()
                    .and_then(|v| vehicles.get(v))
                    .cloned();
                EntryDetail {
                    entry,
                    driver,
                    service_provider,
                    vehicle,
                }
            })
            .collect();
        Ok(PeriodDetail { period, entries })
    }

    // --- Creation ---

    pub fn create_period(
        &self,
        org: &str,
        req: CreatePeriodRequest,
    ) -> Result<PayrollPeriod, PayrollError> {
        let name = req
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| PayrollError::Validation("Field 'name' is required".into()))?;
        let start_date = req
            .start_date
            .ok_or_else(|| PayrollError::Validation("Field 'startDate' is required".into()))?;
        let end_date = req
            .end_date
            .ok_or_else(|| PayrollError::Validation("Field 'endDate' is required".into()))?;
        if start_date >= end_date {
            return Err(PayrollError::Validation(
                "startDate must be earlier than endDate".into(),
            ));
        }

        let period = PayrollPeriod {
            id: Uuid::new_v4().to_string(),
            organization_id: org.to_string(),
            name,
            start_date,
            end_date,
            total_amount: Decimal::ZERO,
            status: PeriodStatus::Pending,
        };
        match self.store.insert_period(period) {
            Ok(created) => {
                info!(
                    "Created payroll period {} [{} .. {}] for org {}",
                    created.id, created.start_date, created.end_date, org
                );
                Ok(created)
            }
            Err(existing) => Err(PayrollError::Conflict {
                message: format!(
                    "Period dates overlap existing period '{}' [{} .. {}]",
                    existing.name, existing.start_date, existing.end_date
                ),
                existing_period: existing,
            }),
        }
    }

    // --- Plain generation (Variant A provider policy) ---

    pub fn generate_entries(
        &self,
        org: &str,
        period_id: &str,
    ) -> Result<GeneratedResponse, PayrollError> {
        let period = self.store.get_period(org, period_id).ok_or_else(|| {
            PayrollError::NotFound(format!("Payroll period {} not found", period_id))
        })?;
        if period.status != PeriodStatus::Pending {
            return Err(PayrollError::InvalidState(format!(
                "Entries can only be generated for PENDING periods (current status: {})",
                period.status
            )));
        }

        let records = self
            .store
            .attendance_in_range(org, period.start_date, period.end_date);
        if records.is_empty() {
            return Err(PayrollError::EmptyResult(format!(
                "No attendance records found between {} and {}",
                period.start_date, period.end_date
            )));
        }

        let vehicles = self.store.vehicles_for_org(org);
        let summary = summarize_attendance(&records, &vehicles);
        let entries = self.build_entries(org, &period, &summary, GenerationMode::Plain);
        let total: Decimal = entries.iter().map(|e| e.net_pay).sum();

        let (period, entries) = self
            .store
            .commit_generated_entries(org, period_id, entries, total)
            .map_err(|e| match e {
                CommitError::PeriodNotFound => {
                    PayrollError::NotFound(format!("Payroll period {} not found", period_id))
                }
                CommitError::PeriodNotPending => PayrollError::InvalidState(
                    "Entries can only be generated for PENDING periods".into(),
                ),
            })?;
        info!(
            "Generated {} entries for period {} (total {})",
            entries.len(),
            period.id,
            period.total_amount
        );
        Ok(GeneratedResponse {
            message: format!("Generated {} payroll entries", entries.len()),
            entries,
        })
    }

    // --- Filtered generation (Variant B provider policy) ---

    pub fn generate_filtered(
        &self,
        org: &str,
        req: GenerateFilteredRequest,
    ) -> Result<FilteredGeneratedResponse, PayrollError> {
        let start_date = req
            .start_date
            .ok_or_else(|| PayrollError::Validation("Field 'startDate' is required".into()))?;
        let end_date = req
            .end_date
            .ok_or_else(|| PayrollError::Validation("Field 'endDate' is required".into()))?;
        if start_date >= end_date {
            return Err(PayrollError::Validation(
                "startDate must be earlier than endDate".into(),
            ));
        }
        if let Some(existing) = self.store.find_overlapping_period(org, start_date, end_date) {
            return Err(PayrollError::Conflict {
                message: format!(
                    "Period dates overlap existing period '{}' [{} .. {}]",
                    existing.name, existing.start_date, existing.end_date
                ),
                existing_period: existing,
            });
        }

        let filters = req.filters;
        let vehicles = self.store.vehicles_for_org(org);
        let allowed_vehicles = self.resolve_vehicle_filter(org, &filters, &vehicles);
        let shift_filter: Option<HashSet<&str>> = filters
            .shift_ids
            .as_ref()
            .map(|ids| ids.iter().map(String::as_str).collect());

        let records: Vec<AttendanceRecord> = self
            .store
            .attendance_in_range(org, start_date, end_date)
            .into_iter()
            .filter(|r| {
                allowed_vehicles
                    .as_ref()
                    .map_or(true, |set| set.contains(&r.vehicle_id))
            })
            .filter(|r| {
                shift_filter.as_ref().map_or(true, |set| {
                    r.shift_id.as_deref().map_or(false, |s| set.contains(s))
                })
            })
            .collect();
        if records.is_empty() {
            return Err(PayrollError::EmptyResult(format!(
                "No attendance records matched between {} and {} with filters: {}",
                start_date,
                end_date,
                filters.describe()
            )));
        }

        let summary = summarize_attendance(&records, &vehicles);
        let name = req
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Payroll {} - {}", start_date, end_date));
        let period = PayrollPeriod {
            id: Uuid::new_v4().to_string(),
            organization_id: org.to_string(),
            name,
            start_date,
            end_date,
            total_amount: Decimal::ZERO,
            status: PeriodStatus::Processed,
        };
        let entries = self.build_entries(org, &period, &summary, GenerationMode::Filtered);
        let total: Decimal = entries.iter().map(|e| e.net_pay).sum();
        let entries_count = entries.len();

        let mut period = period;
        period.total_amount = total;
        let period = self
            .store
            .insert_period_with_entries(period, entries)
            .map_err(|existing| PayrollError::Conflict {
                message: format!(
                    "Period dates overlap existing period '{}' [{} .. {}]",
                    existing.name, existing.start_date, existing.end_date
                ),
                existing_period: existing,
            })?;
        info!(
            "Filtered generation created period {} with {} entries (total {})",
            period.id, entries_count, total
        );
        Ok(FilteredGeneratedResponse {
            message: format!(
                "Created period with {} payroll entries from filtered attendance",
                entries_count
            ),
            period,
            entries_count,
            total_amount: total,
            filters,
        })
    }

    /// Resolves the effective vehicle-id restriction for filtered
    /// generation. Department filters are chased through
    /// department -> employee -> stop -> route -> vehicle and the resulting
    /// ids extend the explicit vehicleIds set; type and location filters then
    /// narrow the candidates. Returns None when no restriction applies.
    fn resolve_vehicle_filter(
        &self,
        org: &str,
        filters: &GenerationFilters,
        vehicles: &std::collections::BTreeMap<VehicleId, Vehicle>,
    ) -> Option<HashSet<VehicleId>> {
        let mut id_filter: Option<HashSet<VehicleId>> = filters
            .vehicle_ids
            .as_ref()
            .map(|ids| ids.iter().cloned().collect());

        if let Some(department_ids) = &filters.department_ids {
            let department_ids: HashSet<&str> =
                department_ids.iter().map(String::as_str).collect();
            let employee_ids: HashSet<EmployeeId> = self
                .store
                .employees_for_org(org)
                .into_iter()
                .filter(|e| {
                    e.department_id
                        .as_deref()
                        .map_or(false, |d| department_ids.contains(d))
                })
                .map(|e| e.id)
                .collect();
            let route_ids: HashSet<RouteId> = self
                .store
                .route_stops_for_org(org)
                .into_iter()
                .filter(|s| {
                    s.employee_id
                        .as_ref()
                        .map_or(false, |e| employee_ids.contains(e))
                })
                .map(|s| s.route_id)
                .collect();
            let chained: HashSet<VehicleId> = self
                .store
                .routes_for_org(org)
                .into_values()
                .filter(|r| route_ids.contains(&r.id))
                .filter_map(|r| r.vehicle_id)
                .collect();
            id_filter = Some(match id_filter {
                Some(mut set) => {
                    set.extend(chained);
                    set
                }
                None => chained,
            });
        }

        let needs_attr_filter = filters.vehicle_type.is_some() || filters.location_ids.is_some();
        if !needs_attr_filter {
            return id_filter;
        }

        let location_ids: Option<HashSet<&str>> = filters
            .location_ids
            .as_ref()
            .map(|ids| ids.iter().map(String::as_str).collect());
        let allowed: HashSet<VehicleId> = vehicles
            .values()
            .filter(|v| id_filter.as_ref().map_or(true, |set| set.contains(&v.id)))
            .filter(|v| {
                filters
                    .vehicle_type
                    .as_deref()
                    .map_or(true, |t| v.vehicle_type.eq_ignore_ascii_case(t))
            })
            .filter(|v| {
                location_ids.as_ref().map_or(true, |set| {
                    v.location_id.as_deref().map_or(false, |l| set.contains(l))
                })
            })
            .map(|v| v.id.clone())
            .collect();
        Some(allowed)
    }

    fn build_entries(
        &self,
        org: &str,
        period: &PayrollPeriod,
        summary: &AttendanceSummary,
        mode: GenerationMode,
    ) -> Vec<PayrollEntry> {
        let drivers = self.store.drivers_for_org(org);
        let providers = self.store.providers_for_org(org);
        let vehicles = self.store.vehicles_for_org(org);
        let mut entries = Vec::new();

        for (driver_id, activity) in &summary.drivers {
            let Some(driver) = drivers.get(driver_id) else {
                warn!("Attendance references unknown driver {}, skipping", driver_id);
                continue;
            };
            let Some(pay) = calculate_driver_pay(driver, activity) else {
                warn!(
                    "Driver {} has neither baseSalary nor hourlyRate, skipping",
                    driver_id
                );
                continue;
            };
            let mut entry = PayrollEntry {
                id: Uuid::new_v4().to_string(),
                payroll_period_id: period.id.clone(),
                organization_id: org.to_string(),
                driver_id: Some(driver_id.clone()),
                service_provider_id: None,
                vehicle_id: activity.vehicle_id.clone(),
                payroll_type: PayrollType::Salary,
                amount: pay.base_pay + pay.overtime_pay,
                bonuses: pay.bonuses,
                deductions: pay.deductions,
                net_pay: Decimal::ZERO,
                days_worked: activity.days_worked,
                hours_worked: Some(activity.hours_worked),
                trips_completed: activity.trips_completed,
                kms_covered: activity.kms_covered,
                payment_method: driver.payment_method,
                status: "PENDING".to_string(),
            };
            entry.recompute_net_pay();
            entries.push(entry);
        }

        for (provider_id, activity) in &summary.providers {
            let Some(provider) = providers.get(provider_id) else {
                warn!(
                    "Attendance references unknown service provider {}, skipping",
                    provider_id
                );
                continue;
            };
            let (pay, payroll_type) = match mode {
                GenerationMode::Plain => {
                    let fallback_daily_rate = activity
                        .vehicle_id
                        .as_ref()
                        .and_then(|v| vehicles.get(v))
                        .and_then(|v| v.daily_rate);
                    let fleet_count = self.store.provider_fleet_count(org, provider_id);
                    (
                        PlainServiceProviderPolicy::calculate(
                            provider,
                            activity,
                            fallback_daily_rate,
                            fleet_count,
                        ),
                        PayrollType::ServiceProvider,
                    )
                }
                GenerationMode::Filtered => (
                    FilteredServiceProviderPolicy::calculate(provider, activity),
                    PayrollType::ServiceFee,
                ),
            };
            let mut entry = PayrollEntry {
                id: Uuid::new_v4().to_string(),
                payroll_period_id: period.id.clone(),
                organization_id: org.to_string(),
                driver_id: None,
                service_provider_id: Some(provider_id.clone()),
                vehicle_id: activity.vehicle_id.clone(),
                payroll_type,
                amount: pay.amount,
                bonuses: pay.bonuses,
                deductions: pay.deductions,
                net_pay: Decimal::ZERO,
                days_worked: activity.days_worked,
                hours_worked: None,
                trips_completed: activity.trips_completed,
                kms_covered: activity.kms_covered,
                payment_method: provider.payment_method,
                status: "PENDING".to_string(),
            };
            entry.recompute_net_pay();
            entries.push(entry);
        }

        entries
    }

    // --- Status, entry patch, delete ---

    pub fn patch_status(
        &self,
        org: &str,
        period_id: &str,
        status_raw: &str,
    ) -> Result<PeriodDetail, PayrollError> {
        let status = parse_status(status_raw)?;
        self.store
            .set_period_status(org, period_id, status)
            .ok_or_else(|| {
                PayrollError::NotFound(format!("Payroll period {} not found", period_id))
            })?;
        info!("Period {} status set to {}", period_id, status);
        self.get_period_detail(org, period_id)
    }

    pub fn patch_entry(
        &self,
        org: &str,
        period_id: &str,
        entry_id: &str,
        patch: EntryPatch,
    ) -> Result<PayrollEntry, PayrollError> {
        if self.store.get_period(org, period_id).is_none() {
            return Err(PayrollError::NotFound(format!(
                "Payroll period {} not found",
                period_id
            )));
        }
        let mut entry = self
            .store
            .get_entry(org, period_id, entry_id)
            .ok_or_else(|| {
                PayrollError::NotFound(format!("Payroll entry {} not found", entry_id))
            })?;

        if let Some(amount) = patch.amount {
            entry.amount = amount;
        }
        if let Some(bonuses) = patch.bonuses {
            entry.bonuses = bonuses;
        }
        if let Some(deductions) = patch.deductions {
            entry.deductions = deductions;
        }
        if let Some(status) = patch.status {
            entry.status = status;
        }
        entry.recompute_net_pay();

        let (entry, period) = self
            .store
            .update_entry(org, period_id, entry)
            .ok_or_else(|| {
                PayrollError::NotFound(format!("Payroll entry {} not found", entry_id))
            })?;
        info!(
            "Patched entry {}; period {} total now {}",
            entry.id, period.id, period.total_amount
        );
        Ok(entry)
    }

    pub fn delete_period(&self, org: &str, period_id: &str) -> Result<(), PayrollError> {
        let period = self.store.get_period(org, period_id).ok_or_else(|| {
            PayrollError::NotFound(format!("Payroll period {} not found", period_id))
        })?;
        if period.status == PeriodStatus::Paid {
            return Err(PayrollError::InvalidState(
                "PAID periods cannot be deleted".into(),
            ));
        }
        self.store.delete_period_cascade(org, period_id);
        info!("Deleted payroll period {}", period_id);
        Ok(())
    }

    // --- Superadmin surface ---

    pub fn superadmin_list(
        &self,
        org: Option<&str>,
        status: Option<&str>,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> Result<PeriodPage, PayrollError> {
        let status = status.map(parse_status).transpose()?;
        let periods = self.store.list_periods_all(org, status);
        let (periods, pagination) = paginate(
            &periods,
            page.unwrap_or(1),
            limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        );
        Ok(PeriodPage {
            periods,
            pagination,
        })
    }

    pub fn superadmin_stats(
        &self,
        org: Option<&str>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<SuperadminStats, PayrollError> {
        let periods: Vec<PayrollPeriod> = self
            .store
            .list_periods_all(org, None)
            .into_iter()
            .filter(|p| from.map_or(true, |f| p.end_date >= f))
            .filter(|p| to.map_or(true, |t| p.start_date <= t))
            .collect();
        let period_ids: HashSet<&str> = periods.iter().map(|p| p.id.as_str()).collect();
        let entries: Vec<PayrollEntry> = self
            .store
            .entries_all(org)
            .into_iter()
            .filter(|e| period_ids.contains(e.payroll_period_id.as_str()))
            .collect();

        let count_status =
            |s: PeriodStatus| periods.iter().filter(|p| p.status == s).count();
        let driver_entries = entries.iter().filter(|e| e.driver_id.is_some()).count();
        Ok(SuperadminStats {
            total_periods: periods.len(),
            total_amount: periods.iter().map(|p| p.total_amount).sum(),
            pending_periods: count_status(PeriodStatus::Pending),
            processed_periods: count_status(PeriodStatus::Processed),
            paid_periods: count_status(PeriodStatus::Paid),
            total_entries: entries.len(),
            driver_entries,
            service_provider_entries: entries.len() - driver_entries,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenerationMode {
    Plain,
    Filtered,
}
