// src/kpi.rs
//
// Read-only KPI rollups over persisted payroll periods/entries plus
// route-completion and attendance history. Six independent rollups, a
// combined dashboard with top/worst pointers, bucketed trends, and a
// current-vs-previous window comparison.
//
// The source schema carries no foreign key from payroll entries to
// departments, shifts, or routes, so cost attribution across those buckets
// is an approximation. The distribution policy is isolated behind
// CostAttributionStrategy; RoundRobinAttribution reproduces the upstream
// `index % bucket_count` behavior and must not be silently "improved".

use chrono::{Datelike, Days, NaiveDate, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::model::*;
use crate::money::{percentage, ratio, round_cents};
use crate::periods::PayrollError;
use crate::store::{intervals_overlap, FleetStore};

/// Picks the bucket a cost item lands in when no real attribution exists.
pub trait CostAttributionStrategy: Send + Sync {
    fn bucket_for(&self, item_index: usize, bucket_count: usize) -> usize;
}

/// Upstream-faithful approximation: `index % bucket_count`.
pub struct RoundRobinAttribution;

impl CostAttributionStrategy for RoundRobinAttribution {
    fn bucket_for(&self, item_index: usize, bucket_count: usize) -> usize {
        debug_assert!(bucket_count > 0);
        item_index % bucket_count
    }
}

// --- Rollup rows (ephemeral, never persisted) ---

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentKpi {
    pub department_id: DepartmentId,
    pub department_name: String,
    pub total_cost: Decimal,
    pub employee_count: usize,
    pub cost_per_employee: Decimal,
    pub utilization_rate: Decimal,
    pub peak_demand: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftKpi {
    pub shift_id: ShiftId,
    pub shift_name: String,
    pub total_cost: Decimal,
    pub employee_count: usize,
    pub avg_hours_worked: Decimal,
    pub cost_per_hour: Decimal,
    pub overtime_percentage: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateTimeKpi {
    pub date: NaiveDate,
    pub daily_cost: Decimal,
    pub avg_daily_cost: Decimal,
    /// Deviation of this day's cost from the window average.
    pub daily_cost_trend: Decimal,
    pub seasonal_pattern: &'static str,
    /// 25% of the day's cost on Saturdays/Sundays, zero otherwise.
    pub weekend_premium: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteKpi {
    pub route_id: RouteId,
    pub route_name: String,
    pub total_cost: Decimal,
    pub total_distance: Decimal,
    pub total_stops: u32,
    pub completions: usize,
    pub cost_per_km: Decimal,
    pub cost_per_stop: Decimal,
    /// Kilometres per completed run; higher is more efficient.
    pub distance_efficiency: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleCategoryKpi {
    pub category: String,
    pub total_cost: Decimal,
    pub vehicle_count: usize,
    pub total_kms: Decimal,
    pub fuel_cost: Decimal,
    pub fuel_cost_per_km: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationKpi {
    pub location: String,
    pub total_cost: Decimal,
    pub attendance_days: usize,
    pub vehicle_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiDashboard {
    pub departments: Vec<DepartmentKpi>,
    pub shifts: Vec<ShiftKpi>,
    pub date_time: Vec<DateTimeKpi>,
    pub routes: Vec<RouteKpi>,
    pub vehicle_categories: Vec<VehicleCategoryKpi>,
    pub locations: Vec<LocationKpi>,
    pub total_cost: Decimal,
    pub total_employees: usize,
    pub total_vehicles: usize,
    pub top_cost_department: Option<String>,
    pub top_overtime_shift: Option<String>,
    pub most_efficient_route: Option<String>,
    pub least_fuel_efficient_category: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub bucket: String,
    pub cost: Decimal,
    pub completions: usize,
    pub attendance_days: usize,
    /// Cost delta against the previous bucket.
    pub change: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendGranularity {
    Daily,
    Weekly,
    Monthly,
}

impl TrendGranularity {
    pub fn parse(raw: &str) -> Result<Self, PayrollError> {
        match raw {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(PayrollError::Validation(format!(
                "invalid granularity '{}', expected daily, weekly or monthly",
                other
            ))),
        }
    }

    fn bucket_key(&self, date: NaiveDate) -> String {
        match self {
            Self::Daily => date.format("%Y-%m-%d").to_string(),
            Self::Weekly => {
                let week = date.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Self::Monthly => date.format("%Y-%m").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonMetric {
    pub current: Decimal,
    pub previous: Decimal,
    pub change: Decimal,
    pub change_percentage: Decimal,
    pub trend: &'static str,
}

impl ComparisonMetric {
    fn from_pair(current: Decimal, previous: Decimal) -> Self {
        let change = current - previous;
        let trend = if change > Decimal::ZERO {
            "up"
        } else if change < Decimal::ZERO {
            "down"
        } else {
            "stable"
        };
        Self {
            current,
            previous,
            change,
            change_percentage: round_cents(percentage(change, previous)),
            trend,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodComparison {
    pub total_cost: ComparisonMetric,
    pub cost_per_employee: ComparisonMetric,
    pub total_employees: ComparisonMetric,
    pub avg_utilization_rate: ComparisonMetric,
}

fn season_for_month(month: u32) -> &'static str {
    match month {
        3..=5 => "spring",
        6..=8 => "summer",
        9..=11 => "fall",
        _ => "winter",
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

const WEEKEND_PREMIUM_RATE: Decimal = dec!(0.25);
const DAILY_OVERTIME_THRESHOLD_HOURS: Decimal = dec!(8);

/// Snapshot of everything one KPI run reads, fetched once per request.
struct KpiInputs {
    entries: Vec<PayrollEntry>,
    periods: Vec<PayrollPeriod>,
    attendance: Vec<AttendanceRecord>,
    completions: Vec<RouteCompletion>,
}

pub struct KpiService {
    store: Arc<FleetStore>,
    attribution: Box<dyn CostAttributionStrategy>,
}

impl KpiService {
    pub fn new(store: Arc<FleetStore>) -> Self {
        Self {
            store,
            attribution: Box::new(RoundRobinAttribution),
        }
    }

    pub fn with_attribution(
        store: Arc<FleetStore>,
        attribution: Box<dyn CostAttributionStrategy>,
    ) -> Self {
        Self { store, attribution }
    }

    fn validate_window(from: NaiveDate, to: NaiveDate) -> Result<(), PayrollError> {
        if from > to {
            return Err(PayrollError::Validation(
                "startDate must not be later than endDate".into(),
            ));
        }
        Ok(())
    }

    fn inputs(&self, org: &str, from: NaiveDate, to: NaiveDate) -> KpiInputs {
        let periods: Vec<PayrollPeriod> = self
            .store
            .list_periods(org, None)
            .into_iter()
            .filter(|p| intervals_overlap(p.start_date, p.end_date, from, to))
            .collect();
        let period_ids: Vec<String> = periods.iter().map(|p| p.id.clone()).collect();
        let entries = self.store.entries_for_periods(org, &period_ids);
        let attendance = self.store.attendance_in_range(org, from, to);
        let completions = self.store.completions_in_range(org, from, to);
        KpiInputs {
            entries,
            periods,
            attendance,
            completions,
        }
    }

    // --- Department rollup ---

    pub fn department_kpis(
        &self,
        org: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DepartmentKpi>, PayrollError> {
        Self::validate_window(from, to)?;
        let inputs = self.inputs(org, from, to);
        Ok(self.department_rollup(org, from, to, &inputs))
    }

    fn department_rollup(
        &self,
        org: &str,
        from: NaiveDate,
        to: NaiveDate,
        inputs: &KpiInputs,
    ) -> Vec<DepartmentKpi> {
        let departments = self.store.departments_for_org(org);
        if departments.is_empty() {
            return Vec::new();
        }
        let bucket_count = departments.len();
        let window_days = (to - from).num_days() as i64 + 1;

        let mut cost = vec![Decimal::ZERO; bucket_count];
        for (i, entry) in inputs.entries.iter().enumerate() {
            cost[self.attribution.bucket_for(i, bucket_count)] += entry.net_pay;
        }

        // Activity attribution: record counts per department per day.
        let mut records_per_day: Vec<BTreeMap<NaiveDate, usize>> =
            vec![BTreeMap::new(); bucket_count];
        for (i, record) in inputs.attendance.iter().enumerate() {
            let bucket = self.attribution.bucket_for(i, bucket_count);
            *records_per_day[bucket].entry(record.date).or_insert(0) += 1;
        }

        let employees = self.store.employees_for_org(org);
        departments
            .into_iter()
            .enumerate()
            .map(|(i, department)| {
                let employee_count = employees
                    .iter()
                    .filter(|e| e.department_id.as_deref() == Some(department.id.as_str()))
                    .count();
                let active_days = records_per_day[i].len();
                let peak_demand = records_per_day[i].values().copied().max().unwrap_or(0);
                let capacity = Decimal::from(employee_count as u64)
                    * Decimal::from(window_days.max(0) as u64);
                DepartmentKpi {
                    department_id: department.id,
                    department_name: department.name,
                    total_cost: round_cents(cost[i]),
                    employee_count,
                    cost_per_employee: round_cents(ratio(
                        cost[i],
                        Decimal::from(employee_count as u64),
                    )),
                    utilization_rate: round_cents(percentage(
                        Decimal::from(active_days as u64),
                        capacity,
                    )),
                    peak_demand,
                }
            })
            .collect()
    }

    // --- Shift rollup ---

    pub fn shift_kpis(
        &self,
        org: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ShiftKpi>, PayrollError> {
        Self::validate_window(from, to)?;
        let inputs = self.inputs(org, from, to);
        Ok(self.shift_rollup(org, &inputs))
    }

    fn shift_rollup(&self, org: &str, inputs: &KpiInputs) -> Vec<ShiftKpi> {
        let shifts = self.store.shifts_for_org(org);
        if shifts.is_empty() {
            return Vec::new();
        }
        let bucket_count = shifts.len();

        #[derive(Default)]
        struct ShiftAcc {
            cost: Decimal,
            hours: Decimal,
            overtime_hours: Decimal,
            entry_count: usize,
            entities: HashSet<String>,
        }
        let mut acc: Vec<ShiftAcc> = (0..bucket_count).map(|_| ShiftAcc::default()).collect();

        for (i, entry) in inputs.entries.iter().enumerate() {
            let bucket = &mut acc[self.attribution.bucket_for(i, bucket_count)];
            let hours = entry.hours_worked.unwrap_or(Decimal::ZERO);
            let expected = DAILY_OVERTIME_THRESHOLD_HOURS * Decimal::from(entry.days_worked);
            let overtime = (hours - expected).max(Decimal::ZERO);
            bucket.cost += entry.net_pay;
            bucket.hours += hours;
            bucket.overtime_hours += overtime;
            bucket.entry_count += 1;
            if let Some(id) = entry.driver_id.as_ref().or(entry.service_provider_id.as_ref()) {
                bucket.entities.insert(id.clone());
            }
        }

        shifts
            .into_iter()
            .zip(acc)
            .map(|(shift, a)| ShiftKpi {
                shift_id: shift.id,
                shift_name: shift.name,
                total_cost: round_cents(a.cost),
                employee_count: a.entities.len(),
                avg_hours_worked: round_cents(ratio(
                    a.hours,
                    Decimal::from(a.entry_count as u64),
                )),
                cost_per_hour: round_cents(ratio(a.cost, a.hours)),
                overtime_percentage: round_cents(percentage(a.overtime_hours, a.hours)),
            })
            .collect()
    }

    // --- Date/time rollup ---

    pub fn datetime_kpis(
        &self,
        org: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DateTimeKpi>, PayrollError> {
        Self::validate_window(from, to)?;
        let inputs = self.inputs(org, from, to);
        Ok(Self::datetime_rollup(from, to, &inputs))
    }

    /// Spreads each period's total evenly over its days and reports the
    /// in-window share per day. Payroll entries carry no date of their own,
    /// so the even spread is the only attribution the data supports.
    fn daily_cost_shares(
        from: NaiveDate,
        to: NaiveDate,
        periods: &[PayrollPeriod],
    ) -> BTreeMap<NaiveDate, Decimal> {
        let mut per_day: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
        let mut day = from;
        while day <= to {
            per_day.insert(day, Decimal::ZERO);
            day = match day.checked_add_days(Days::new(1)) {
                Some(d) => d,
                None => break,
            };
        }
        for period in periods {
            let period_days = (period.end_date - period.start_date).num_days() + 1;
            if period_days <= 0 {
                continue;
            }
            let share = period.total_amount / Decimal::from(period_days as u64);
            let overlap_start = period.start_date.max(from);
            let overlap_end = period.end_date.min(to);
            let mut day = overlap_start;
            while day <= overlap_end {
                *per_day.entry(day).or_insert(Decimal::ZERO) += share;
                day = match day.checked_add_days(Days::new(1)) {
                    Some(d) => d,
                    None => break,
                };
            }
        }
        per_day
    }

    fn datetime_rollup(from: NaiveDate, to: NaiveDate, inputs: &KpiInputs) -> Vec<DateTimeKpi> {
        let per_day = Self::daily_cost_shares(from, to, &inputs.periods);
        let day_count = per_day.len();
        if day_count == 0 {
            return Vec::new();
        }
        let total: Decimal = per_day.values().copied().sum();
        let avg = total / Decimal::from(day_count as u64);

        per_day
            .into_iter()
            .map(|(date, daily_cost)| {
                let weekend_premium = if is_weekend(date) {
                    round_cents(daily_cost * WEEKEND_PREMIUM_RATE)
                } else {
                    Decimal::ZERO
                };
                DateTimeKpi {
                    date,
                    daily_cost: round_cents(daily_cost),
                    avg_daily_cost: round_cents(avg),
                    daily_cost_trend: round_cents(daily_cost - avg),
                    seasonal_pattern: season_for_month(date.month()),
                    weekend_premium,
                }
            })
            .collect()
    }

    // --- Route rollup ---

    pub fn route_kpis(
        &self,
        org: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RouteKpi>, PayrollError> {
        Self::validate_window(from, to)?;
        let inputs = self.inputs(org, from, to);
        Ok(self.route_rollup(org, &inputs))
    }

    fn route_rollup(&self, org: &str, inputs: &KpiInputs) -> Vec<RouteKpi> {
        let routes = self.store.routes_for_org(org);

        // Only routes with at least one in-window completion participate.
        #[derive(Default)]
        struct RouteAcc {
            distance: Decimal,
            stops: u32,
            completions: usize,
        }
        let mut acc: BTreeMap<RouteId, RouteAcc> = BTreeMap::new();
        for completion in &inputs.completions {
            let a = acc.entry(completion.route_id.clone()).or_default();
            a.distance += completion.distance_km.unwrap_or(Decimal::ZERO);
            a.stops += completion.stops_completed.unwrap_or(0);
            a.completions += 1;
        }
        if acc.is_empty() {
            return Vec::new();
        }

        let route_ids: Vec<RouteId> = acc.keys().cloned().collect();
        let bucket_count = route_ids.len();
        let mut cost = vec![Decimal::ZERO; bucket_count];
        for (i, entry) in inputs.entries.iter().enumerate() {
            cost[self.attribution.bucket_for(i, bucket_count)] += entry.net_pay;
        }

        route_ids
            .into_iter()
            .enumerate()
            .map(|(i, route_id)| {
                let a = &acc[&route_id];
                let name = routes
                    .get(&route_id)
                    .map(|r| r.name.clone())
                    .unwrap_or_else(|| route_id.clone());
                RouteKpi {
                    route_name: name,
                    total_cost: round_cents(cost[i]),
                    total_distance: a.distance,
                    total_stops: a.stops,
                    completions: a.completions,
                    cost_per_km: round_cents(ratio(cost[i], a.distance)),
                    cost_per_stop: round_cents(ratio(
                        cost[i],
                        Decimal::from(a.stops),
                    )),
                    distance_efficiency: round_cents(ratio(
                        a.distance,
                        Decimal::from(a.completions as u64),
                    )),
                    route_id,
                }
            })
            .collect()
    }

    // --- Vehicle category rollup ---

    pub fn vehicle_category_kpis(
        &self,
        org: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<VehicleCategoryKpi>, PayrollError> {
        Self::validate_window(from, to)?;
        let inputs = self.inputs(org, from, to);
        Ok(self.vehicle_category_rollup(org, &inputs))
    }

    fn vehicle_category_rollup(&self, org: &str, inputs: &KpiInputs) -> Vec<VehicleCategoryKpi> {
        let vehicles = self.store.vehicles_for_org(org);
        let category_of = |vehicle_id: &str| -> String {
            vehicles
                .get(vehicle_id)
                .map(|v| v.vehicle_type.clone())
                .unwrap_or_else(|| "unknown".to_string())
        };

        #[derive(Default)]
        struct CategoryAcc {
            cost: Decimal,
            vehicle_ids: HashSet<VehicleId>,
            kms: Decimal,
            fuel: Decimal,
        }
        let mut acc: BTreeMap<String, CategoryAcc> = BTreeMap::new();
        for entry in &inputs.entries {
            let Some(vehicle_id) = &entry.vehicle_id else {
                continue;
            };
            let a = acc.entry(category_of(vehicle_id)).or_default();
            a.cost += entry.net_pay;
            a.vehicle_ids.insert(vehicle_id.clone());
        }
        for record in &inputs.attendance {
            let a = acc.entry(category_of(&record.vehicle_id)).or_default();
            a.kms += record.kms_covered.unwrap_or(Decimal::ZERO);
            a.fuel += crate::money::parse_money(record.fuel_cost.as_deref());
            a.vehicle_ids.insert(record.vehicle_id.clone());
        }

        acc.into_iter()
            .map(|(category, a)| VehicleCategoryKpi {
                category,
                total_cost: round_cents(a.cost),
                vehicle_count: a.vehicle_ids.len(),
                total_kms: a.kms,
                fuel_cost: round_cents(a.fuel),
                fuel_cost_per_km: round_cents(ratio(a.fuel, a.kms)),
            })
            .collect()
    }

    // --- Location rollup ---

    /// Degenerates to a single 'default' bucket: the source data carries no
    /// per-location attribution. Known limitation, kept explicit.
    pub fn location_kpis(
        &self,
        org: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<LocationKpi>, PayrollError> {
        Self::validate_window(from, to)?;
        let inputs = self.inputs(org, from, to);
        Ok(Self::location_rollup(&inputs))
    }

    fn location_rollup(inputs: &KpiInputs) -> Vec<LocationKpi> {
        let total_cost: Decimal = inputs.entries.iter().map(|e| e.net_pay).sum();
        let attendance_days: HashSet<NaiveDate> =
            inputs.attendance.iter().map(|a| a.date).collect();
        let vehicle_ids: HashSet<&str> = inputs
            .attendance
            .iter()
            .map(|a| a.vehicle_id.as_str())
            .collect();
        vec![LocationKpi {
            location: "default".to_string(),
            total_cost: round_cents(total_cost),
            attendance_days: attendance_days.len(),
            vehicle_count: vehicle_ids.len(),
        }]
    }

    // --- Dashboard ---

    pub fn dashboard(
        &self,
        org: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<KpiDashboard, PayrollError> {
        Self::validate_window(from, to)?;
        let inputs = self.inputs(org, from, to);

        let departments = self.department_rollup(org, from, to, &inputs);
        let shifts = self.shift_rollup(org, &inputs);
        let date_time = Self::datetime_rollup(from, to, &inputs);
        let routes = self.route_rollup(org, &inputs);
        let vehicle_categories = self.vehicle_category_rollup(org, &inputs);
        let locations = Self::location_rollup(&inputs);

        let total_cost: Decimal = inputs.entries.iter().map(|e| e.net_pay).sum();
        let total_employees = inputs
            .entries
            .iter()
            .filter_map(|e| e.driver_id.as_ref().or(e.service_provider_id.as_ref()))
            .collect::<HashSet<_>>()
            .len();
        let mut total_vehicles: usize = vehicle_categories
            .iter()
            .map(|c| c.vehicle_count)
            .sum();
        if total_vehicles == 0 {
            // Route-based estimate when no category data exists in-window.
            let route_ids: HashSet<&str> = inputs
                .completions
                .iter()
                .map(|c| c.route_id.as_str())
                .collect();
            total_vehicles = self
                .store
                .routes_for_org(org)
                .values()
                .filter(|r| route_ids.contains(r.id.as_str()))
                .filter(|r| r.vehicle_id.is_some())
                .count();
        }

        let top_cost_department = departments
            .iter()
            .max_by_key(|d| d.total_cost)
            .map(|d| d.department_name.clone());
        let top_overtime_shift = shifts
            .iter()
            .max_by_key(|s| s.overtime_percentage)
            .map(|s| s.shift_name.clone());
        let most_efficient_route = routes
            .iter()
            .max_by_key(|r| r.distance_efficiency)
            .map(|r| r.route_name.clone());
        let least_fuel_efficient_category = vehicle_categories
            .iter()
            .max_by_key(|c| c.fuel_cost_per_km)
            .map(|c| c.category.clone());

        Ok(KpiDashboard {
            departments,
            shifts,
            date_time,
            routes,
            vehicle_categories,
            locations,
            total_cost: round_cents(total_cost),
            total_employees,
            total_vehicles,
            top_cost_department,
            top_overtime_shift,
            most_efficient_route,
            least_fuel_efficient_category,
        })
    }

    // --- Trends ---

    pub fn trends(
        &self,
        org: &str,
        from: NaiveDate,
        to: NaiveDate,
        granularity: TrendGranularity,
    ) -> Result<Vec<TrendPoint>, PayrollError> {
        Self::validate_window(from, to)?;
        let inputs = self.inputs(org, from, to);
        let per_day = Self::daily_cost_shares(from, to, &inputs.periods);

        #[derive(Default)]
        struct BucketAcc {
            cost: Decimal,
            completions: usize,
            attendance_days: usize,
        }
        let mut buckets: BTreeMap<String, BucketAcc> = BTreeMap::new();
        for (date, cost) in per_day {
            buckets
                .entry(granularity.bucket_key(date))
                .or_default()
                .cost += cost;
        }
        for completion in &inputs.completions {
            buckets
                .entry(granularity.bucket_key(completion.date))
                .or_default()
                .completions += 1;
        }
        for record in &inputs.attendance {
            buckets
                .entry(granularity.bucket_key(record.date))
                .or_default()
                .attendance_days += 1;
        }

        let mut previous_cost: Option<Decimal> = None;
        let points = buckets
            .into_iter()
            .map(|(bucket, acc)| {
                let cost = round_cents(acc.cost);
                let change = previous_cost.map_or(Decimal::ZERO, |prev| cost - prev);
                previous_cost = Some(cost);
                TrendPoint {
                    bucket,
                    cost,
                    completions: acc.completions,
                    attendance_days: acc.attendance_days,
                    change,
                }
            })
            .collect();
        Ok(points)
    }

    // --- Period comparison ---

    /// Runs the dashboard for the given window and for the equal-length
    /// window immediately preceding it.
    pub fn period_comparison(
        &self,
        org: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<PeriodComparison, PayrollError> {
        Self::validate_window(from, to)?;
        let span_days = (to - from).num_days();
        let prev_to = from
            .checked_sub_days(Days::new(1))
            .ok_or_else(|| PayrollError::Validation("window start out of range".into()))?;
        let prev_from = prev_to
            .checked_sub_days(Days::new(span_days as u64))
            .ok_or_else(|| PayrollError::Validation("window start out of range".into()))?;

        let current = self.dashboard(org, from, to)?;
        let previous = self.dashboard(org, prev_from, prev_to)?;

        let avg_utilization = |d: &KpiDashboard| -> Decimal {
            if d.departments.is_empty() {
                Decimal::ZERO
            } else {
                let sum: Decimal = d.departments.iter().map(|x| x.utilization_rate).sum();
                sum / Decimal::from(d.departments.len() as u64)
            }
        };
        let cost_per_employee = |d: &KpiDashboard| -> Decimal {
            round_cents(ratio(
                d.total_cost,
                Decimal::from(d.total_employees as u64),
            ))
        };

        Ok(PeriodComparison {
            total_cost: ComparisonMetric::from_pair(current.total_cost, previous.total_cost),
            cost_per_employee: ComparisonMetric::from_pair(
                cost_per_employee(&current),
                cost_per_employee(&previous),
            ),
            total_employees: ComparisonMetric::from_pair(
                Decimal::from(current.total_employees as u64),
                Decimal::from(previous.total_employees as u64),
            ),
            avg_utilization_rate: ComparisonMetric::from_pair(
                round_cents(avg_utilization(&current)),
                round_cents(avg_utilization(&previous)),
            ),
        })
    }
}
