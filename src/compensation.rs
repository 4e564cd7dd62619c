// src/compensation.rs
//
// Pure pay calculations, invoked once per aggregated activity bucket.
//
// Drivers are paid through a single rule set shared by both generation
// paths. Service providers have two deliberately distinct policies:
// `PlainServiceProviderPolicy` (plain generate, priority-ordered rates, tax
// and low-utilization penalty) and `FilteredServiceProviderPolicy` (filtered
// generate, all rates summed, fuel/toll as reimbursements, no deductions).
// The divergence is inherited behavior awaiting a domain-owner decision; do
// not unify the two without one.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::aggregation::{DriverActivity, ProviderActivity};
use crate::model::{Driver, ServiceProvider};
use crate::money::{percentage, ratio, round_cents};

/// Rule constants for the driver pay calculation.
pub mod driver_rules {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    /// Hours beyond this count as overtime for hourly drivers.
    pub const STANDARD_MONTHLY_HOURS: Decimal = dec!(160);
    pub const DEFAULT_OVERTIME_MULTIPLIER: Decimal = dec!(1.5);
    pub const TRIP_BONUS_THRESHOLD: u32 = 50;
    pub const TRIP_BONUS_PER_TRIP: Decimal = dec!(5);
    /// Denominator for the attendance-rate bonus: a nominal working month.
    pub const WORKING_DAYS_PER_MONTH: Decimal = dec!(22);
    pub const ATTENDANCE_BONUS_THRESHOLD_PCT: Decimal = dec!(95);
    pub const ATTENDANCE_BONUS: Decimal = dec!(100);
    pub const EFFICIENCY_KM_PER_HOUR_THRESHOLD: Decimal = dec!(10);
    pub const EFFICIENCY_BONUS: Decimal = dec!(50);
    pub const TAX_RATE: Decimal = dec!(0.10);
    pub const LATE_DAY_PENALTY: Decimal = dec!(20);
}

/// Rule constants for the plain (Variant A) provider policy.
pub mod provider_rules {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    pub const HIGH_VOLUME_TRIP_THRESHOLD: u32 = 200;
    pub const HIGH_VOLUME_BONUS: Decimal = dec!(500);
    pub const TAX_RATE: Decimal = dec!(0.02);
    /// avgTripsPerVehicle in (0, 20] triggers the low-utilization penalty.
    pub const LOW_UTILIZATION_TRIPS_PER_VEHICLE: Decimal = dec!(20);
    pub const LOW_UTILIZATION_PENALTY: Decimal = dec!(500);
}

/// Driver pay split. The generated entry stores
/// `amount = base_pay + overtime_pay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverPay {
    pub base_pay: Decimal,
    pub overtime_pay: Decimal,
    pub bonuses: Decimal,
    pub deductions: Decimal,
    pub net_pay: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPay {
    pub amount: Decimal,
    pub bonuses: Decimal,
    pub deductions: Decimal,
    pub net_pay: Decimal,
}

/// Calculates a driver's pay for one period from their aggregated activity.
///
/// Returns None when the driver has neither a base salary nor an hourly rate
/// configured; no entry can be generated for them.
pub fn calculate_driver_pay(driver: &Driver, activity: &DriverActivity) -> Option<DriverPay> {
    use driver_rules::*;

    let (base_pay, overtime_pay) = match (driver.base_salary, driver.hourly_rate) {
        // Flat salary regardless of days worked; no overtime on salary.
        (Some(salary), _) => (salary, Decimal::ZERO),
        (None, Some(hourly)) => {
            let regular_hours = activity.hours_worked.min(STANDARD_MONTHLY_HOURS);
            let base = hourly * regular_hours;
            let overtime = if activity.hours_worked > STANDARD_MONTHLY_HOURS {
                let extra = activity.hours_worked - STANDARD_MONTHLY_HOURS;
                let multiplier = driver.overtime_rate.unwrap_or(DEFAULT_OVERTIME_MULTIPLIER);
                hourly * extra * multiplier
            } else {
                Decimal::ZERO
            };
            (base, overtime)
        }
        (None, None) => return None,
    };

    let mut bonuses = Decimal::ZERO;
    if activity.trips_completed > TRIP_BONUS_THRESHOLD {
        let extra_trips = Decimal::from(activity.trips_completed - TRIP_BONUS_THRESHOLD);
        bonuses += extra_trips * TRIP_BONUS_PER_TRIP;
    }
    let attendance_rate = percentage(Decimal::from(activity.days_worked), WORKING_DAYS_PER_MONTH);
    if attendance_rate >= ATTENDANCE_BONUS_THRESHOLD_PCT {
        bonuses += ATTENDANCE_BONUS;
    }
    let avg_km_per_hour = ratio(activity.kms_covered, activity.hours_worked);
    if avg_km_per_hour > EFFICIENCY_KM_PER_HOUR_THRESHOLD {
        bonuses += EFFICIENCY_BONUS;
    }

    let gross = base_pay + overtime_pay + bonuses;
    let tax = gross * TAX_RATE;
    let late_penalty = Decimal::from(activity.late_days) * LATE_DAY_PENALTY;
    let deductions = tax + late_penalty;

    Some(DriverPay {
        base_pay: round_cents(base_pay),
        overtime_pay: round_cents(overtime_pay),
        bonuses: round_cents(bonuses),
        deductions: round_cents(deductions),
        net_pay: round_cents(gross - deductions),
    })
}

/// Variant A: plain-generation provider policy.
///
/// Rate priority picks the first non-zero of monthlyRate, perKmRate x km,
/// perTripRate x trips as the base amount; contributions from the remaining
/// configured rates land in bonuses instead. When no rate yields anything the
/// vehicle's daily rate x days worked is the fallback base. Fuel and toll are
/// pass-through expenses on the base amount.
///
/// The low-utilization penalty divides by the provider's vehicle count as it
/// stands at generation time, not the fleet size during the pay period. Known
/// semantic wrinkle, kept as observed.
pub struct PlainServiceProviderPolicy;

impl PlainServiceProviderPolicy {
    pub fn calculate(
        provider: &ServiceProvider,
        activity: &ProviderActivity,
        fallback_daily_rate: Option<Decimal>,
        fleet_vehicle_count: usize,
    ) -> ProviderPay {
        use provider_rules::*;

        let trips = Decimal::from(activity.trips_completed);
        let contributions = [
            provider.monthly_rate.unwrap_or(Decimal::ZERO),
            provider.per_km_rate.unwrap_or(Decimal::ZERO) * activity.kms_covered,
            provider.per_trip_rate.unwrap_or(Decimal::ZERO) * trips,
        ];

        let mut amount = Decimal::ZERO;
        let mut bonuses = Decimal::ZERO;
        for contribution in contributions {
            if contribution.is_zero() {
                continue;
            }
            if amount.is_zero() {
                amount = contribution;
            } else {
                bonuses += contribution;
            }
        }
        if amount.is_zero() {
            let daily = fallback_daily_rate.unwrap_or(Decimal::ZERO);
            amount = daily * Decimal::from(activity.days_worked);
        }

        // Fuel and toll are reimbursed as part of the base amount.
        amount += activity.fuel_cost + activity.toll_cost;

        if activity.trips_completed > HIGH_VOLUME_TRIP_THRESHOLD {
            bonuses += HIGH_VOLUME_BONUS;
        }

        let mut deductions = (amount + bonuses) * TAX_RATE;
        if fleet_vehicle_count > 0 {
            let avg_trips_per_vehicle = trips / Decimal::from(fleet_vehicle_count as u32);
            if avg_trips_per_vehicle > Decimal::ZERO
                && avg_trips_per_vehicle <= LOW_UTILIZATION_TRIPS_PER_VEHICLE
            {
                deductions += LOW_UTILIZATION_PENALTY;
            }
        }

        let amount = round_cents(amount);
        let bonuses = round_cents(bonuses);
        let deductions = round_cents(deductions);
        ProviderPay {
            amount,
            bonuses,
            deductions,
            net_pay: amount + bonuses - deductions,
        }
    }
}

/// Variant B: filtered-generation provider policy.
///
/// Every configured rate contributes to the base amount unconditionally
/// (monthly + perKm x km + perTrip x trips); fuel and toll are recorded as
/// reimbursements in the bonuses column; no tax, no penalties.
pub struct FilteredServiceProviderPolicy;

impl FilteredServiceProviderPolicy {
    pub fn calculate(provider: &ServiceProvider, activity: &ProviderActivity) -> ProviderPay {
        let trips = Decimal::from(activity.trips_completed);
        let amount = provider.monthly_rate.unwrap_or(Decimal::ZERO)
            + provider.per_km_rate.unwrap_or(Decimal::ZERO) * activity.kms_covered
            + provider.per_trip_rate.unwrap_or(Decimal::ZERO) * trips;
        let reimbursements = activity.fuel_cost + activity.toll_cost;

        let amount = round_cents(amount);
        let bonuses = round_cents(reimbursements);
        ProviderPay {
            amount,
            bonuses,
            deductions: Decimal::ZERO,
            net_pay: amount + bonuses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn driver(base_salary: Option<Decimal>, hourly_rate: Option<Decimal>) -> Driver {
        Driver {
            id: "d1".into(),
            organization_id: "org1".into(),
            name: "Test Driver".into(),
            base_salary,
            hourly_rate,
            overtime_rate: None,
            payment_method: Default::default(),
        }
    }

    fn provider(
        monthly: Option<Decimal>,
        per_km: Option<Decimal>,
        per_trip: Option<Decimal>,
    ) -> ServiceProvider {
        ServiceProvider {
            id: "sp1".into(),
            organization_id: "org1".into(),
            name: "Test Provider".into(),
            monthly_rate: monthly,
            per_km_rate: per_km,
            per_trip_rate: per_trip,
            payment_method: Default::default(),
        }
    }

    fn driver_activity(
        days: u32,
        hours: Decimal,
        trips: u32,
        kms: Decimal,
        late_days: u32,
    ) -> DriverActivity {
        DriverActivity {
            driver_id: "d1".into(),
            days_worked: days,
            hours_worked: hours,
            trips_completed: trips,
            kms_covered: kms,
            late_days,
            vehicle_id: Some("v1".into()),
        }
    }

    fn provider_activity(
        days: u32,
        trips: u32,
        kms: Decimal,
        fuel: Decimal,
        toll: Decimal,
    ) -> ProviderActivity {
        ProviderActivity {
            provider_id: "sp1".into(),
            days_worked: days,
            trips_completed: trips,
            kms_covered: kms,
            fuel_cost: fuel,
            toll_cost: toll,
            vehicle_ids: HashSet::from(["v9".to_string()]),
            vehicle_id: Some("v9".into()),
        }
    }

    #[test]
    fn salaried_driver_full_month_with_trip_and_attendance_bonus() {
        // baseSalary=3000, 22 days, 180h, 60 trips, 200km:
        // overtime 0 (no hourly rate), trip bonus (60-50)*5=50,
        // attendance 100% -> +100, 200/180 km/h < 10 -> no efficiency bonus,
        // tax 10% of 3150 = 315, no late days.
        let pay = calculate_driver_pay(
            &driver(Some(dec!(3000)), None),
            &driver_activity(22, dec!(180), 60, dec!(200), 0),
        )
        .unwrap();
        assert_eq!(pay.base_pay, dec!(3000));
        assert_eq!(pay.overtime_pay, dec!(0));
        assert_eq!(pay.bonuses, dec!(150));
        assert_eq!(pay.deductions, dec!(315.00));
        assert_eq!(pay.net_pay, dec!(2835.00));
    }

    #[test]
    fn hourly_driver_gets_overtime_beyond_160_hours() {
        // 20/h, 180h: base 20*160=3200, overtime 20*20*1.5=600.
        let pay = calculate_driver_pay(
            &driver(None, Some(dec!(20))),
            &driver_activity(20, dec!(180), 10, dec!(100), 0),
        )
        .unwrap();
        assert_eq!(pay.base_pay, dec!(3200));
        assert_eq!(pay.overtime_pay, dec!(600.0));
        assert_eq!(pay.bonuses, dec!(0));
        // tax 10% of 3800
        assert_eq!(pay.deductions, dec!(380.00));
        assert_eq!(pay.net_pay, dec!(3420.00));
    }

    #[test]
    fn hourly_driver_honors_custom_overtime_multiplier() {
        let mut d = driver(None, Some(dec!(10)));
        d.overtime_rate = Some(dec!(2));
        let pay =
            calculate_driver_pay(&d, &driver_activity(20, dec!(170), 0, dec!(0), 0)).unwrap();
        assert_eq!(pay.base_pay, dec!(1600));
        assert_eq!(pay.overtime_pay, dec!(200));
    }

    #[test]
    fn late_days_deduct_flat_penalty() {
        let pay = calculate_driver_pay(
            &driver(Some(dec!(1000)), None),
            &driver_activity(10, dec!(60), 0, dec!(0), 4),
        )
        .unwrap();
        // tax 100 + 4*20 late penalty
        assert_eq!(pay.deductions, dec!(180.00));
        assert_eq!(pay.net_pay, dec!(820.00));
    }

    #[test]
    fn efficiency_bonus_triggers_above_10_km_per_hour() {
        let pay = calculate_driver_pay(
            &driver(Some(dec!(1000)), None),
            &driver_activity(5, dec!(40), 0, dec!(500), 0),
        )
        .unwrap();
        // 500km / 40h = 12.5 km/h
        assert_eq!(pay.bonuses, dec!(50));
    }

    #[test]
    fn zero_hours_does_not_divide_by_zero() {
        let pay = calculate_driver_pay(
            &driver(Some(dec!(1000)), None),
            &driver_activity(1, dec!(0), 0, dec!(300), 1),
        )
        .unwrap();
        assert_eq!(pay.bonuses, dec!(0));
    }

    #[test]
    fn driver_without_pay_basis_yields_no_entry() {
        assert!(calculate_driver_pay(
            &driver(None, None),
            &driver_activity(22, dec!(176), 0, dec!(0), 0)
        )
        .is_none());
    }

    #[test]
    fn plain_policy_priority_and_secondary_rate_as_bonus() {
        // monthly=1000 chosen first; perKm 2*300=600 lands in bonuses;
        // 210 trips > 200 -> +500 bonus; fuel 80 + toll 20 join the amount.
        // One vehicle -> avg 210 trips/vehicle > 20, no penalty.
        let pay = PlainServiceProviderPolicy::calculate(
            &provider(Some(dec!(1000)), Some(dec!(2)), None),
            &provider_activity(20, 210, dec!(300), dec!(80), dec!(20)),
            None,
            1,
        );
        assert_eq!(pay.amount, dec!(1100));
        assert_eq!(pay.bonuses, dec!(1100));
        // 2% of 2200
        assert_eq!(pay.deductions, dec!(44.00));
        assert_eq!(pay.net_pay, dec!(2156.00));
    }

    #[test]
    fn plain_policy_falls_back_to_per_km_then_daily_rate() {
        let pay = PlainServiceProviderPolicy::calculate(
            &provider(None, Some(dec!(3)), None),
            &provider_activity(10, 30, dec!(100), dec!(0), dec!(0)),
            Some(dec!(50)),
            1,
        );
        // perKm 3*100=300 chosen; 30 trips / 1 vehicle = 30 > 20, no penalty
        assert_eq!(pay.amount, dec!(300));
        assert_eq!(pay.deductions, dec!(6.00));

        let pay = PlainServiceProviderPolicy::calculate(
            &provider(None, None, None),
            &provider_activity(10, 30, dec!(100), dec!(0), dec!(0)),
            Some(dec!(50)),
            1,
        );
        // no rates at all: dailyRate 50 * 10 days
        assert_eq!(pay.amount, dec!(500));
    }

    #[test]
    fn plain_policy_low_utilization_penalty_band() {
        // 15 trips over 1 vehicle -> in (0, 20], penalized.
        let penalized = PlainServiceProviderPolicy::calculate(
            &provider(Some(dec!(1000)), None, None),
            &provider_activity(10, 15, dec!(0), dec!(0), dec!(0)),
            None,
            1,
        );
        assert_eq!(penalized.deductions, dec!(520.00));

        // Zero trips -> lower bound exclusive, no penalty.
        let idle = PlainServiceProviderPolicy::calculate(
            &provider(Some(dec!(1000)), None, None),
            &provider_activity(10, 0, dec!(0), dec!(0), dec!(0)),
            None,
            1,
        );
        assert_eq!(idle.deductions, dec!(20.00));

        // Exactly 20 per vehicle -> upper bound inclusive, penalized.
        let boundary = PlainServiceProviderPolicy::calculate(
            &provider(Some(dec!(1000)), None, None),
            &provider_activity(10, 40, dec!(0), dec!(0), dec!(0)),
            None,
            2,
        );
        assert_eq!(boundary.deductions, dec!(520.00));
    }

    #[test]
    fn filtered_policy_sums_all_rates_and_skips_deductions() {
        // monthly 1000 + perKm 2*300 + perTrip 1*210 = 1810 base;
        // fuel+toll 100 as reimbursements; no tax, no penalty.
        let pay = FilteredServiceProviderPolicy::calculate(
            &provider(Some(dec!(1000)), Some(dec!(2)), Some(dec!(1))),
            &provider_activity(20, 210, dec!(300), dec!(80), dec!(20)),
        );
        assert_eq!(pay.amount, dec!(1810));
        assert_eq!(pay.bonuses, dec!(100));
        assert_eq!(pay.deductions, dec!(0));
        assert_eq!(pay.net_pay, dec!(1910));
    }

    #[test]
    fn policies_diverge_on_identical_input() {
        // Same provider and activity, different generation mode, different pay.
        let p = provider(Some(dec!(1000)), Some(dec!(2)), None);
        let activity = provider_activity(20, 100, dec!(300), dec!(0), dec!(0));
        let plain = PlainServiceProviderPolicy::calculate(&p, &activity, None, 1);
        let filtered = FilteredServiceProviderPolicy::calculate(&p, &activity);
        assert_eq!(plain.amount, dec!(1000));
        assert_eq!(filtered.amount, dec!(1600));
        assert_ne!(plain.net_pay, filtered.net_pay);
    }

    #[test]
    fn calculation_is_deterministic() {
        let d = driver(Some(dec!(3000)), None);
        let activity = driver_activity(22, dec!(180), 60, dec!(200), 0);
        let first = calculate_driver_pay(&d, &activity).unwrap();
        for _ in 0..10 {
            assert_eq!(calculate_driver_pay(&d, &activity).unwrap(), first);
        }
    }
}
