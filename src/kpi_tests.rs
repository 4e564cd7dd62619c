// src/kpi_tests.rs

#[cfg(test)]
mod tests {
    use crate::kpi::{CostAttributionStrategy, KpiService, TrendGranularity};
    use crate::model::*;
    use crate::periods::PayrollError;
    use crate::store::FleetStore;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    const ORG: &str = "org1";

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn service() -> (Arc<FleetStore>, KpiService) {
        let store = Arc::new(FleetStore::new());
        (store.clone(), KpiService::new(store))
    }

    fn period(id: &str, start: &str, end: &str, total: Decimal) -> PayrollPeriod {
        PayrollPeriod {
            id: id.to_string(),
            organization_id: ORG.to_string(),
            name: format!("Period {}", id),
            start_date: d(start),
            end_date: d(end),
            total_amount: total,
            status: PeriodStatus::Processed,
        }
    }

    fn entry(
        id: &str,
        period_id: &str,
        driver: Option<&str>,
        provider: Option<&str>,
        vehicle: Option<&str>,
        net_pay: Decimal,
        hours: Option<Decimal>,
        days: u32,
    ) -> PayrollEntry {
        PayrollEntry {
            id: id.to_string(),
            payroll_period_id: period_id.to_string(),
            organization_id: ORG.to_string(),
            driver_id: driver.map(String::from),
            service_provider_id: provider.map(String::from),
            vehicle_id: vehicle.map(String::from),
            payroll_type: if driver.is_some() {
                PayrollType::Salary
            } else {
                PayrollType::ServiceProvider
            },
            amount: net_pay,
            bonuses: Decimal::ZERO,
            deductions: Decimal::ZERO,
            net_pay,
            days_worked: days,
            hours_worked: hours,
            trips_completed: 0,
            kms_covered: Decimal::ZERO,
            payment_method: PaymentMethod::BankTransfer,
            status: "PENDING".to_string(),
        }
    }

    fn attendance(id: &str, date: &str, vehicle: &str) -> AttendanceRecord {
        AttendanceRecord {
            id: id.to_string(),
            organization_id: ORG.to_string(),
            date: d(date),
            driver_id: None,
            vehicle_id: vehicle.to_string(),
            shift_id: None,
            hours_worked: None,
            trips_completed: None,
            kms_covered: None,
            fuel_cost: None,
            toll_cost: None,
        }
    }

    fn department(id: &str, name: &str) -> Department {
        Department {
            id: id.to_string(),
            organization_id: ORG.to_string(),
            name: name.to_string(),
        }
    }

    fn employee(id: &str, dept: &str) -> Employee {
        Employee {
            id: id.to_string(),
            organization_id: ORG.to_string(),
            name: format!("Emp {}", id),
            department_id: Some(dept.to_string()),
        }
    }

    fn shift(id: &str, name: &str) -> Shift {
        Shift {
            id: id.to_string(),
            organization_id: ORG.to_string(),
            name: name.to_string(),
        }
    }

    fn vehicle(id: &str, vehicle_type: &str) -> Vehicle {
        Vehicle {
            id: id.to_string(),
            organization_id: ORG.to_string(),
            plate_number: format!("PL-{}", id),
            vehicle_type: vehicle_type.to_string(),
            ownership: VehicleOwnership::InHouse,
            service_provider_id: None,
            daily_rate: None,
            location_id: None,
        }
    }

    fn completion(id: &str, route: &str, date: &str, km: Decimal, stops: u32) -> RouteCompletion {
        RouteCompletion {
            id: id.to_string(),
            organization_id: ORG.to_string(),
            route_id: route.to_string(),
            date: d(date),
            distance_km: Some(km),
            stops_completed: Some(stops),
        }
    }

    /// Three sorted entries (1000, 500, 300) in one processed July period.
    fn seed_period_with_entries(store: &FleetStore) {
        store
            .insert_period_with_entries(
                period("p1", "2025-07-01", "2025-07-10", dec!(1800)),
                vec![
                    entry("e1", "p1", Some("d1"), None, Some("v1"), dec!(1000), Some(dec!(100)), 10),
                    entry("e2", "p1", None, Some("sp1"), Some("v2"), dec!(500), None, 5),
                    entry("e3", "p1", Some("d2"), None, Some("v1"), dec!(300), None, 10),
                ],
            )
            .unwrap();
    }

    #[test]
    fn dashboard_over_window_without_periods_is_all_zero() {
        let (_store, kpi) = service();
        let dash = kpi.dashboard(ORG, d("2025-07-01"), d("2025-07-10")).unwrap();

        assert_eq!(dash.total_cost, Decimal::ZERO);
        assert_eq!(dash.total_employees, 0);
        assert_eq!(dash.total_vehicles, 0);
        assert!(dash.departments.is_empty());
        assert!(dash.shifts.is_empty());
        assert!(dash.routes.is_empty());
        assert!(dash.vehicle_categories.is_empty());
        assert!(dash.top_cost_department.is_none());
        assert!(dash.most_efficient_route.is_none());

        // One row per window day, all zero cost.
        assert_eq!(dash.date_time.len(), 10);
        assert!(dash.date_time.iter().all(|r| r.daily_cost == Decimal::ZERO));

        // The location rollup always reports its single bucket.
        assert_eq!(dash.locations.len(), 1);
        assert_eq!(dash.locations[0].total_cost, Decimal::ZERO);
        assert_eq!(dash.locations[0].attendance_days, 0);
    }

    #[test]
    fn kpi_windows_reject_inverted_date_ranges() {
        let (_store, kpi) = service();
        assert!(matches!(
            kpi.dashboard(ORG, d("2025-07-10"), d("2025-07-01")),
            Err(PayrollError::Validation(_))
        ));
    }

    // --- Department rollup ---

    #[test]
    fn department_rollup_distributes_costs_and_activity_round_robin() {
        let (store, kpi) = service();
        store.insert_department(department("dep1", "Ops"));
        store.insert_department(department("dep2", "Line"));
        store.insert_employee(employee("emp1", "dep1"));
        store.insert_employee(employee("emp2", "dep1"));
        store.insert_employee(employee("emp3", "dep2"));
        seed_period_with_entries(&store);
        store.insert_attendance(attendance("a1", "2025-07-02", "v1"));
        store.insert_attendance(attendance("a2", "2025-07-02", "v1"));
        store.insert_attendance(attendance("a3", "2025-07-03", "v1"));

        let rows = kpi
            .department_kpis(ORG, d("2025-07-01"), d("2025-07-10"))
            .unwrap();
        assert_eq!(rows.len(), 2);

        // Entries e1/e3 land in the first bucket, e2 in the second.
        let ops = &rows[0];
        assert_eq!(ops.department_id, "dep1");
        assert_eq!(ops.total_cost, dec!(1300));
        assert_eq!(ops.employee_count, 2);
        assert_eq!(ops.cost_per_employee, dec!(650));
        // Attendance rows a1/a3 alternate into dep1: two active days over a
        // 2-employee, 10-day capacity.
        assert_eq!(ops.utilization_rate, dec!(10.00));
        assert_eq!(ops.peak_demand, 1);

        let line = &rows[1];
        assert_eq!(line.department_id, "dep2");
        assert_eq!(line.total_cost, dec!(500));
        assert_eq!(line.employee_count, 1);
    }

    #[test]
    fn attribution_strategy_is_pluggable() {
        struct FirstBucket;
        impl CostAttributionStrategy for FirstBucket {
            fn bucket_for(&self, _item_index: usize, _bucket_count: usize) -> usize {
                0
            }
        }

        let store = Arc::new(FleetStore::new());
        store.insert_department(department("dep1", "Ops"));
        store.insert_department(department("dep2", "Line"));
        seed_period_with_entries(&store);

        let kpi = KpiService::with_attribution(store, Box::new(FirstBucket));
        let rows = kpi
            .department_kpis(ORG, d("2025-07-01"), d("2025-07-10"))
            .unwrap();
        assert_eq!(rows[0].total_cost, dec!(1800));
        assert_eq!(rows[1].total_cost, Decimal::ZERO);
    }

    // --- Shift rollup ---

    #[test]
    fn shift_rollup_derives_overtime_from_hours_beyond_daily_threshold() {
        let (store, kpi) = service();
        store.insert_shift(shift("s1", "Day"));
        store.insert_shift(shift("s2", "Night"));
        store
            .insert_period_with_entries(
                period("p1", "2025-07-01", "2025-07-10", dec!(1000)),
                vec![
                    // 100h over 10 days against an 8h/day baseline: 20h overtime.
                    entry("e1", "p1", Some("d1"), None, None, dec!(800), Some(dec!(100)), 10),
                    entry("e2", "p1", None, Some("sp1"), None, dec!(200), None, 5),
                ],
            )
            .unwrap();

        let rows = kpi
            .shift_kpis(ORG, d("2025-07-01"), d("2025-07-10"))
            .unwrap();
        assert_eq!(rows.len(), 2);

        let day = &rows[0];
        assert_eq!(day.shift_id, "s1");
        assert_eq!(day.total_cost, dec!(800));
        assert_eq!(day.employee_count, 1);
        assert_eq!(day.avg_hours_worked, dec!(100));
        assert_eq!(day.cost_per_hour, dec!(8));
        assert_eq!(day.overtime_percentage, dec!(20.00));

        // Hourless provider entry: all hour-derived figures stay zero.
        let night = &rows[1];
        assert_eq!(night.total_cost, dec!(200));
        assert_eq!(night.avg_hours_worked, Decimal::ZERO);
        assert_eq!(night.cost_per_hour, Decimal::ZERO);
        assert_eq!(night.overtime_percentage, Decimal::ZERO);
    }

    // --- Date/time rollup ---

    #[test]
    fn datetime_rollup_spreads_period_totals_and_prices_weekends() {
        let (store, kpi) = service();
        store
            .insert_period(period("p1", "2025-07-01", "2025-07-10", dec!(1000)))
            .unwrap();

        let rows = kpi
            .datetime_kpis(ORG, d("2025-07-01"), d("2025-07-10"))
            .unwrap();
        assert_eq!(rows.len(), 10);
        for row in &rows {
            assert_eq!(row.daily_cost, dec!(100));
            assert_eq!(row.avg_daily_cost, dec!(100));
            assert_eq!(row.daily_cost_trend, Decimal::ZERO);
            assert_eq!(row.seasonal_pattern, "summer");
        }
        // 2025-07-04 is a Friday, the 5th and 6th the weekend.
        assert_eq!(rows[3].weekend_premium, Decimal::ZERO);
        assert_eq!(rows[4].weekend_premium, dec!(25.00));
        assert_eq!(rows[5].weekend_premium, dec!(25.00));
    }

    #[test]
    fn datetime_rollup_only_counts_the_in_window_share_of_a_period() {
        let (store, kpi) = service();
        // 10-day period, only the last 2 days fall inside the window.
        store
            .insert_period(period("p1", "2025-07-01", "2025-07-10", dec!(1000)))
            .unwrap();
        let rows = kpi
            .datetime_kpis(ORG, d("2025-07-09"), d("2025-07-12"))
            .unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].daily_cost, dec!(100));
        assert_eq!(rows[1].daily_cost, dec!(100));
        assert_eq!(rows[2].daily_cost, Decimal::ZERO);
        assert_eq!(rows[3].daily_cost, Decimal::ZERO);
    }

    // --- Route rollup ---

    #[test]
    fn route_rollup_covers_only_routes_with_in_window_completions() {
        let (store, kpi) = service();
        store.insert_route(Route {
            id: "r1".to_string(),
            organization_id: ORG.to_string(),
            name: "North Loop".to_string(),
            vehicle_id: Some("v1".to_string()),
        });
        store.insert_route(Route {
            id: "r2".to_string(),
            organization_id: ORG.to_string(),
            name: "South Loop".to_string(),
            vehicle_id: None,
        });
        store.insert_completion(completion("c1", "r1", "2025-07-02", dec!(30), 5));
        store.insert_completion(completion("c2", "r1", "2025-07-03", dec!(50), 5));
        store
            .insert_period_with_entries(
                period("p1", "2025-07-01", "2025-07-10", dec!(400)),
                vec![entry("e1", "p1", Some("d1"), None, None, dec!(400), None, 4)],
            )
            .unwrap();

        let rows = kpi
            .route_kpis(ORG, d("2025-07-01"), d("2025-07-10"))
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.route_id, "r1");
        assert_eq!(row.route_name, "North Loop");
        assert_eq!(row.total_cost, dec!(400));
        assert_eq!(row.total_distance, dec!(80));
        assert_eq!(row.total_stops, 10);
        assert_eq!(row.completions, 2);
        assert_eq!(row.cost_per_km, dec!(5));
        assert_eq!(row.cost_per_stop, dec!(40));
        assert_eq!(row.distance_efficiency, dec!(40));
    }

    // --- Vehicle category rollup ---

    #[test]
    fn vehicle_category_rollup_groups_by_type_with_unknown_fallback() {
        let (store, kpi) = service();
        store.insert_vehicle(vehicle("v1", "truck"));
        store.insert_vehicle(vehicle("v2", "van"));
        seed_period_with_entries(&store);
        let mut truck_row = attendance("a1", "2025-07-02", "v1");
        truck_row.kms_covered = Some(dec!(100));
        truck_row.fuel_cost = Some("50".to_string());
        store.insert_attendance(truck_row);
        let mut ghost_row = attendance("a2", "2025-07-03", "ghost");
        ghost_row.kms_covered = Some(dec!(10));
        ghost_row.fuel_cost = Some("5".to_string());
        store.insert_attendance(ghost_row);

        let rows = kpi
            .vehicle_category_kpis(ORG, d("2025-07-01"), d("2025-07-10"))
            .unwrap();
        let categories: Vec<&str> = rows.iter().map(|r| r.category.as_str()).collect();
        assert_eq!(categories, vec!["truck", "unknown", "van"]);

        let truck = &rows[0];
        // e1 + e3 both ran on v1.
        assert_eq!(truck.total_cost, dec!(1300));
        assert_eq!(truck.vehicle_count, 1);
        assert_eq!(truck.total_kms, dec!(100));
        assert_eq!(truck.fuel_cost, dec!(50));
        assert_eq!(truck.fuel_cost_per_km, dec!(0.50));

        let unknown = &rows[1];
        assert_eq!(unknown.total_cost, Decimal::ZERO);
        assert_eq!(unknown.total_kms, dec!(10));

        let van = &rows[2];
        assert_eq!(van.total_cost, dec!(500));
        assert_eq!(van.fuel_cost_per_km, Decimal::ZERO);
    }

    // --- Location rollup ---

    #[test]
    fn location_rollup_reports_the_single_default_bucket() {
        let (store, kpi) = service();
        seed_period_with_entries(&store);
        store.insert_attendance(attendance("a1", "2025-07-02", "v1"));
        store.insert_attendance(attendance("a2", "2025-07-02", "v1"));
        store.insert_attendance(attendance("a3", "2025-07-03", "ghost"));

        let rows = kpi
            .location_kpis(ORG, d("2025-07-01"), d("2025-07-10"))
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.location, "default");
        assert_eq!(row.total_cost, dec!(1800));
        assert_eq!(row.attendance_days, 2);
        assert_eq!(row.vehicle_count, 2);
    }

    // --- Dashboard ---

    #[test]
    fn dashboard_surfaces_top_and_worst_pointers() {
        let (store, kpi) = service();
        store.insert_department(department("dep1", "Ops"));
        store.insert_department(department("dep2", "Line"));
        store.insert_shift(shift("s1", "Day"));
        store.insert_shift(shift("s2", "Night"));
        store.insert_vehicle(vehicle("v1", "truck"));
        store.insert_vehicle(vehicle("v2", "van"));
        store.insert_route(Route {
            id: "r1".to_string(),
            organization_id: ORG.to_string(),
            name: "North Loop".to_string(),
            vehicle_id: Some("v1".to_string()),
        });
        store.insert_completion(completion("c1", "r1", "2025-07-02", dec!(80), 10));
        seed_period_with_entries(&store);
        let mut truck_row = attendance("a1", "2025-07-02", "v1");
        truck_row.kms_covered = Some(dec!(100));
        truck_row.fuel_cost = Some("50".to_string());
        store.insert_attendance(truck_row);
        let mut van_row = attendance("a2", "2025-07-03", "v2");
        van_row.kms_covered = Some(dec!(10));
        van_row.fuel_cost = Some("20".to_string());
        store.insert_attendance(van_row);

        let dash = kpi.dashboard(ORG, d("2025-07-01"), d("2025-07-10")).unwrap();
        assert_eq!(dash.total_cost, dec!(1800));
        // d1, d2 and sp1 each appear once across the entries.
        assert_eq!(dash.total_employees, 3);
        assert_eq!(dash.total_vehicles, 2);
        assert_eq!(dash.top_cost_department.as_deref(), Some("Ops"));
        // Only e1 carries hours, and it lands in the first shift bucket.
        assert_eq!(dash.top_overtime_shift.as_deref(), Some("Day"));
        assert_eq!(dash.most_efficient_route.as_deref(), Some("North Loop"));
        // Van burns 2.00/km against the truck's 0.50/km.
        assert_eq!(dash.least_fuel_efficient_category.as_deref(), Some("van"));
    }

    // --- Trends ---

    #[test]
    fn trends_bucket_daily_costs_completions_and_attendance() {
        let (store, kpi) = service();
        store
            .insert_period(period("p1", "2025-07-01", "2025-07-04", dec!(400)))
            .unwrap();
        store.insert_completion(completion("c1", "r1", "2025-07-02", dec!(10), 2));
        store.insert_attendance(attendance("a1", "2025-07-03", "v1"));

        let points = kpi
            .trends(ORG, d("2025-07-01"), d("2025-07-04"), TrendGranularity::Daily)
            .unwrap();
        assert_eq!(points.len(), 4);
        assert!(points.iter().all(|p| p.cost == dec!(100)));
        assert_eq!(points[0].change, Decimal::ZERO);
        assert!(points.iter().skip(1).all(|p| p.change == Decimal::ZERO));
        assert_eq!(points[1].completions, 1);
        assert_eq!(points[2].attendance_days, 1);

        // The same four days collapse into one ISO week at weekly granularity.
        let weekly = kpi
            .trends(ORG, d("2025-07-01"), d("2025-07-04"), TrendGranularity::Weekly)
            .unwrap();
        assert_eq!(weekly.len(), 1);
        assert_eq!(weekly[0].bucket, "2025-W27");
        assert_eq!(weekly[0].cost, dec!(400));
    }

    #[test]
    fn trends_report_cost_deltas_between_buckets() {
        let (store, kpi) = service();
        store
            .insert_period(period("p1", "2025-07-01", "2025-07-02", dec!(100)))
            .unwrap();
        store
            .insert_period(period("p2", "2025-07-03", "2025-07-04", dec!(400)))
            .unwrap();

        let points = kpi
            .trends(ORG, d("2025-07-01"), d("2025-07-04"), TrendGranularity::Daily)
            .unwrap();
        assert_eq!(points.len(), 4);
        assert_eq!(points[0].cost, dec!(50));
        assert_eq!(points[2].cost, dec!(200));
        assert_eq!(points[2].change, dec!(150));
        assert_eq!(points[3].change, Decimal::ZERO);
    }

    #[test]
    fn trend_granularity_parses_the_three_known_values() {
        assert_eq!(TrendGranularity::parse("daily").unwrap(), TrendGranularity::Daily);
        assert_eq!(TrendGranularity::parse("weekly").unwrap(), TrendGranularity::Weekly);
        assert_eq!(TrendGranularity::parse("monthly").unwrap(), TrendGranularity::Monthly);
        assert!(matches!(
            TrendGranularity::parse("hourly"),
            Err(PayrollError::Validation(_))
        ));
    }

    // --- Period comparison ---

    #[test]
    fn period_comparison_runs_against_the_preceding_equal_window() {
        let (store, kpi) = service();
        store
            .insert_period_with_entries(
                period("p1", "2025-07-01", "2025-07-10", dec!(1000)),
                vec![entry("e1", "p1", Some("d1"), None, None, dec!(1000), None, 10)],
            )
            .unwrap();

        let cmp = kpi
            .period_comparison(ORG, d("2025-07-01"), d("2025-07-10"))
            .unwrap();
        assert_eq!(cmp.total_cost.current, dec!(1000));
        assert_eq!(cmp.total_cost.previous, Decimal::ZERO);
        assert_eq!(cmp.total_cost.change, dec!(1000));
        // Empty previous window: the percentage guard keeps this at zero.
        assert_eq!(cmp.total_cost.change_percentage, Decimal::ZERO);
        assert_eq!(cmp.total_cost.trend, "up");

        assert_eq!(cmp.total_employees.current, dec!(1));
        assert_eq!(cmp.total_employees.trend, "up");
        assert_eq!(cmp.avg_utilization_rate.trend, "stable");
    }

    #[test]
    fn period_comparison_marks_declining_costs_as_down() {
        let (store, kpi) = service();
        store
            .insert_period_with_entries(
                period("p0", "2025-06-21", "2025-06-30", dec!(2000)),
                vec![entry("e0", "p0", Some("d1"), None, None, dec!(2000), None, 10)],
            )
            .unwrap();
        store
            .insert_period_with_entries(
                period("p1", "2025-07-01", "2025-07-10", dec!(1000)),
                vec![entry("e1", "p1", Some("d1"), None, None, dec!(1000), None, 10)],
            )
            .unwrap();

        let cmp = kpi
            .period_comparison(ORG, d("2025-07-01"), d("2025-07-10"))
            .unwrap();
        assert_eq!(cmp.total_cost.current, dec!(1000));
        assert_eq!(cmp.total_cost.previous, dec!(2000));
        assert_eq!(cmp.total_cost.change, dec!(-1000));
        assert_eq!(cmp.total_cost.change_percentage, dec!(-50.00));
        assert_eq!(cmp.total_cost.trend, "down");
        assert_eq!(cmp.total_employees.trend, "stable");
    }
}
