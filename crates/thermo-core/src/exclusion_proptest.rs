#[cfg(test)]
mod proptest_exclusion {
    use crate::control::OutputControl;
    use crate::demand::{Demand, DemandViolation};
    use crate::pin_sim::SimulatedRegistry;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn step() -> impl Strategy<Value = (i64, i64, u64)> {
        (
            prop_oneof![Just(-100i64), Just(0), Just(100), -100i64..=100],
            1i64..=120,
            0u64..=30_000,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        // Property: heat and cool are never both on after an evaluation,
        // neither in the state record nor on the lines.
        #[test]
        fn never_both_on(steps in prop::collection::vec(step(), 1..200)) {
            let registry = SimulatedRegistry::with_lines(["HEAT", "COOL"]);
            let mut control = OutputControl::new(Arc::new(registry.clone()));
            let mut now = Instant::now();
            control.update_outputs("HEAT", "COOL", now).unwrap();

            for (duty, cycle, advance_ms) in steps {
                control.set_demand(Demand::new(duty, cycle).validate().unwrap());
                now += Duration::from_millis(advance_ms);
                control.evaluate(now).unwrap();

                prop_assert!(!(control.heat_on() && control.cool_on()));
                prop_assert!(!(registry.is_high("HEAT") && registry.is_high("COOL")));
                if duty == 0 {
                    prop_assert!(!control.heat_on() && !control.cool_on());
                }
                if duty > 0 {
                    prop_assert!(!control.cool_on());
                }
                if duty < 0 {
                    prop_assert!(!control.heat_on());
                }
            }
        }

        // Property: saturated demand is on after the first evaluation and stays on.
        #[test]
        fn saturation_holds(
            duty in prop_oneof![Just(-100i64), Just(100)],
            cycle in 1i64..=3600,
            ticks in prop::collection::vec(0u64..=600_000, 1..50),
        ) {
            let registry = SimulatedRegistry::with_lines(["HEAT", "COOL"]);
            let mut control = OutputControl::new(Arc::new(registry.clone()));
            let mut now = Instant::now();
            control.update_outputs("HEAT", "COOL", now).unwrap();
            control.set_demand(Demand::new(duty, cycle).validate().unwrap());

            for advance_ms in ticks {
                now += Duration::from_millis(advance_ms);
                control.evaluate(now).unwrap();
                prop_assert_eq!(control.heat_on(), duty > 0);
                prop_assert_eq!(control.cool_on(), duty < 0);
            }
        }

        // Property: demands inside the range always validate, outside never do.
        #[test]
        fn demand_range_enforced(duty in -1_000i64..=1_000, cycle in -10i64..=10_000) {
            let result = Demand::new(duty, cycle).validate();
            if !(-100..=100).contains(&duty) {
                prop_assert_eq!(
                    result.unwrap_err(),
                    DemandViolation::DutyCycleOutOfRange { requested: duty }
                );
            } else if cycle <= 0 {
                prop_assert_eq!(
                    result.unwrap_err(),
                    DemandViolation::CycleTimeNotPositive { requested: cycle }
                );
            } else {
                let demand = result.unwrap();
                prop_assert_eq!(demand.on_phase() + demand.off_phase(), demand.cycle_time());
            }
        }
    }
}
