// src/aggregation.rs
//
// Attendance aggregation: partitions raw attendance rows by compensated
// entity and reduces each bucket into the summary the compensation
// calculator consumes. Pure functions over the input slice, no store access.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::model::{
    AttendanceRecord, DriverId, ProviderId, Vehicle, VehicleId, VehicleOwnership,
};
use crate::money::parse_money;

/// Threshold under which a worked day counts as a "late day" for the driver
/// deduction rule.
pub const FULL_DAY_HOURS: Decimal = Decimal::from_parts(8, 0, 0, false, 0);

/// Per-driver reduction of the attendance rows attributed to them.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverActivity {
    pub driver_id: DriverId,
    pub days_worked: u32,
    pub hours_worked: Decimal,
    pub trips_completed: u32,
    pub kms_covered: Decimal,
    /// Days where fewer than FULL_DAY_HOURS were worked.
    pub late_days: u32,
    /// Vehicle of the first record seen, carried onto the generated entry.
    pub vehicle_id: Option<VehicleId>,
}

/// Per-provider reduction over the rows of vehicles they operate.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderActivity {
    pub provider_id: ProviderId,
    pub days_worked: u32,
    pub trips_completed: u32,
    pub kms_covered: Decimal,
    pub fuel_cost: Decimal,
    pub toll_cost: Decimal,
    pub vehicle_ids: HashSet<VehicleId>,
    /// Vehicle of the first record seen, carried onto the generated entry.
    pub vehicle_id: Option<VehicleId>,
}

impl DriverActivity {
    fn new(driver_id: DriverId) -> Self {
        Self {
            driver_id,
            days_worked: 0,
            hours_worked: Decimal::ZERO,
            trips_completed: 0,
            kms_covered: Decimal::ZERO,
            late_days: 0,
            vehicle_id: None,
        }
    }

    fn absorb(&mut self, record: &AttendanceRecord) {
        let hours = record.hours_worked.unwrap_or(Decimal::ZERO);
        self.days_worked += 1;
        self.hours_worked += hours;
        self.trips_completed += record.trips_completed.unwrap_or(0);
        self.kms_covered += record.kms_covered.unwrap_or(Decimal::ZERO);
        if hours < FULL_DAY_HOURS {
            self.late_days += 1;
        }
        if self.vehicle_id.is_none() {
            self.vehicle_id = Some(record.vehicle_id.clone());
        }
    }
}

impl ProviderActivity {
    fn new(provider_id: ProviderId) -> Self {
        Self {
            provider_id,
            days_worked: 0,
            trips_completed: 0,
            kms_covered: Decimal::ZERO,
            fuel_cost: Decimal::ZERO,
            toll_cost: Decimal::ZERO,
            vehicle_ids: HashSet::new(),
            vehicle_id: None,
        }
    }

    fn absorb(&mut self, record: &AttendanceRecord) {
        self.days_worked += 1;
        self.trips_completed += record.trips_completed.unwrap_or(0);
        self.kms_covered += record.kms_covered.unwrap_or(Decimal::ZERO);
        self.fuel_cost += parse_money(record.fuel_cost.as_deref());
        self.toll_cost += parse_money(record.toll_cost.as_deref());
        self.vehicle_ids.insert(record.vehicle_id.clone());
        if self.vehicle_id.is_none() {
            self.vehicle_id = Some(record.vehicle_id.clone());
        }
    }
}

/// Result of partitioning a batch of attendance rows. BTreeMaps keep entry
/// generation order deterministic across runs.
#[derive(Debug, Default)]
pub struct AttendanceSummary {
    pub drivers: BTreeMap<DriverId, DriverActivity>,
    pub providers: BTreeMap<ProviderId, ProviderActivity>,
    /// Rows that belonged to neither bucket (in-house vehicle without a
    /// driver, outsourced vehicle without a provider, unknown vehicle).
    pub dropped: usize,
}

impl AttendanceSummary {
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty() && self.providers.is_empty()
    }
}

/// Partitions records into driver and provider buckets and reduces each.
///
/// A record lands in the driver bucket only when its vehicle is in-house and
/// it names a driver; in the provider bucket only when its vehicle is
/// outsourced and that vehicle names a provider. Anything else is ownerless
/// usage and is intentionally dropped (no entry is generated for it).
pub fn summarize_attendance(
    records: &[AttendanceRecord],
    vehicles: &BTreeMap<VehicleId, Vehicle>,
) -> AttendanceSummary {
    let mut summary = AttendanceSummary::default();

    for record in records {
        let Some(vehicle) = vehicles.get(&record.vehicle_id) else {
            summary.dropped += 1;
            continue;
        };
        match vehicle.ownership {
            VehicleOwnership::InHouse => match &record.driver_id {
                Some(driver_id) => {
                    summary
                        .drivers
                        .entry(driver_id.clone())
                        .or_insert_with(|| DriverActivity::new(driver_id.clone()))
                        .absorb(record);
                }
                None => summary.dropped += 1,
            },
            VehicleOwnership::Outsourced => match &vehicle.service_provider_id {
                Some(provider_id) => {
                    summary
                        .providers
                        .entry(provider_id.clone())
                        .or_insert_with(|| ProviderActivity::new(provider_id.clone()))
                        .absorb(record);
                }
                None => summary.dropped += 1,
            },
        }
    }

    debug!(
        "Aggregated {} attendance rows: {} drivers, {} providers, {} dropped",
        records.len(),
        summary.drivers.len(),
        summary.providers.len(),
        summary.dropped
    );
    summary
}
