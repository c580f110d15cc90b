//! Integration tests for the daily distribution engine

use proptest::prelude::*;
use stipend_core::clock::SEC_PER_DAY;
use stipend_core::distribution::DistributionInputs;
use stipend_core::{DistributionState, HwmCap, ProtocolParams, StipendError, HISTORY_SIZE};

const DAY0: i64 = 1_700_006_400;

fn fixed_cap(max_increase: u64) -> ProtocolParams {
    ProtocolParams {
        hwm_cap: HwmCap::Fixed { max_increase },
        ..ProtocolParams::default()
    }
}

fn state_at(yesterday_supply: u64, high_water_mark: u64) -> DistributionState {
    let mut state = DistributionState::new(DAY0);
    state.yesterday_supply = yesterday_supply;
    state.high_water_mark = high_water_mark;
    state
}

fn run(
    state: &mut DistributionState,
    params: &ProtocolParams,
    day: i64,
    mint_supply: u64,
) -> stipend_core::Result<stipend_core::DistributionValues> {
    state.daily_distribution(
        params,
        DistributionInputs {
            now: DAY0 + day * SEC_PER_DAY + 17,
            mint_supply,
            future_ubi_bank: 0,
            interest_bank: 0,
        },
    )
}

#[test]
fn test_capped_increase_at_one_billion() {
    for params in [fixed_cap(17), ProtocolParams::default()] {
        let mut state = state_at(1_000_000_000, 6_750);
        let values = run(&mut state, &params, 1, 1_000_000_000 + 6_768).unwrap();
        assert_eq!(values.organic_minted, 6_768);
        assert_eq!(values.hwm_increase, 17);
        assert_eq!(values.supply_increase, 2_482_000);
        assert_eq!(state.high_water_mark, 6_767);
        assert_eq!(state.yesterday_supply, 1_000_000_000 + 6_768 + 2_482_000);
    }
}

#[test]
fn test_nothing_minted_still_advances_history() {
    let params = fixed_cap(17);
    let mut state = state_at(1_000_000_000, 6_750);
    state.oldest_history_index = 364;
    let values = run(&mut state, &params, 1, 1_000_000_000).unwrap();
    assert_eq!(values.hwm_increase, 0);
    assert_eq!(values.supply_increase, 0);
    assert_eq!(values.total_minted(), 0);
    assert_eq!(values.future_ubi_interest, 0);
    assert_eq!(values.multiplier, 1.0);
    assert_eq!(state.history[364], 1.0);
    assert_eq!(state.oldest_history_index, 0);
    assert_eq!(state.high_water_mark, 6_750);
}

#[test]
fn test_second_run_same_day_is_rejected() {
    let params = ProtocolParams::default();
    let mut state = state_at(1_000_000_000, 0);
    run(&mut state, &params, 1, 1_000_000_500).unwrap();
    let after_first = state.clone();
    let second = state.daily_distribution(
        &params,
        DistributionInputs {
            now: DAY0 + 2 * SEC_PER_DAY - 1,
            mint_supply: 1_000_900_000,
            future_ubi_bank: 77,
            interest_bank: 0,
        },
    );
    assert!(matches!(second, Err(StipendError::AlreadyDistributedToday)));
    assert_eq!(state, after_first);
    let supply = state.yesterday_supply;
    assert!(run(&mut state, &params, 2, supply).is_ok());
}

#[test]
fn test_history_ring_wraps_after_a_year() {
    let params = fixed_cap(1);
    let mut state = state_at(1_000_000_000, 0);
    let mut supply = state.yesterday_supply;
    for day in 1..=(HISTORY_SIZE as i64 + 3) {
        supply += 1_000;
        let values = run(&mut state, &params, day, supply).unwrap();
        supply += values.supply_increase;
    }
    assert_eq!(state.oldest_history_index, 3);
    assert!(state.history.iter().all(|m| *m > 1.0));
}

#[test]
fn test_values_serialize_for_reports() {
    let params = fixed_cap(17);
    let mut state = state_at(1_000_000_000, 6_750);
    let values = run(&mut state, &params, 1, 1_000_006_768).unwrap();
    let json = serde_json::to_value(values).unwrap();
    assert_eq!(json["hwm_increase"], 17);
    assert_eq!(json["supply_increase"], 2_482_000);
    let back: stipend_core::DistributionValues = serde_json::from_value(json).unwrap();
    assert_eq!(back, values);
}

/// Minted-per-day script for the hundred-day regression
fn scripted_minted(day: u64) -> u64 {
    (day * 37 % 23) * 10 + day * 5
}

#[derive(Debug, PartialEq, Eq)]
struct Snapshot {
    high_water_mark: u64,
    supply: u64,
    interest_bank: u64,
    verified_human_ubi_bank: u64,
    future_ubi_bank: u64,
}

#[test]
fn test_hundred_day_regression() {
    let params = ProtocolParams {
        hwm_cap: HwmCap::Fixed { max_increase: 25 },
        future_ubi_verified_humans: 10,
        ..ProtocolParams::default()
    };
    let mut state = state_at(1_000_000_000, 0);
    let mut supply = 1_000_000_000u64;
    let (mut interest_bank, mut verified_bank, mut future_bank) = (0u64, 0u64, 0u64);
    let mut snapshots = Vec::new();

    for day in 1..=100u64 {
        supply += scripted_minted(day);
        if day == 30 {
            state.verified_humans = 3;
        }
        if day == 60 {
            state.verified_humans = 7;
        }
        let values = state
            .daily_distribution(
                &params,
                DistributionInputs {
                    now: DAY0 + day as i64 * SEC_PER_DAY + 17,
                    mint_supply: supply,
                    future_ubi_bank: future_bank,
                    interest_bank,
                },
            )
            .unwrap();
        assert_eq!(values.total_minted(), values.supply_increase);

        supply += values.supply_increase;
        interest_bank = interest_bank + values.interest_share - values.future_ubi_interest;
        verified_bank += values.verified_human_ubi;
        future_bank += values.future_ubi + values.future_ubi_interest;

        if [1, 10, 25, 50, 75, 100].contains(&day) {
            snapshots.push((
                day,
                Snapshot {
                    high_water_mark: state.high_water_mark,
                    supply,
                    interest_bank,
                    verified_human_ubi_bank: verified_bank,
                    future_ubi_bank: future_bank,
                },
            ));
        }
    }

    let expected = [
        (1, 25, 1_003_650_145, 1_825_000, 0, 1_825_000),
        (10, 155, 1_022_631_305, 11_167_765, 0, 11_462_235),
        (25, 280, 1_040_884_345, 19_990_910, 0, 20_889_090),
        (50, 425, 1_062_061_915, 30_066_995, 4_043_074, 27_939_931),
        (75, 540, 1_078_862_480, 37_987_439, 9_635_334, 31_217_227),
        (100, 680, 1_099_316_270, 47_707_450, 18_051_803, 33_520_747),
    ];
    for ((day, snapshot), (expected_day, hwm, supply, interest, verified, future)) in snapshots.iter().zip(expected) {
        assert_eq!(*day, expected_day);
        assert_eq!(
            *snapshot,
            Snapshot {
                high_water_mark: hwm,
                supply,
                interest_bank: interest,
                verified_human_ubi_bank: verified,
                future_ubi_bank: future,
            },
            "day {}",
            day
        );
    }
    assert_eq!(state.ubi_per_human[state.newest_history_index()], 214_705);
    assert_eq!(state.yesterday_supply, supply);
}

proptest! {
    #[test]
    fn prop_shares_sum_to_supply_increase(
        yesterday in 0u64..1_000_000_000_000,
        minted in 0u64..10_000_000,
        hwm in 0u64..10_000_000,
        verified in 0u64..2_000_000_000,
        future_bank in 0u64..1_000_000_000_000,
        cap in 0u64..1_000,
    ) {
        let params = fixed_cap(cap);
        let mut state = state_at(yesterday, hwm);
        state.verified_humans = verified;
        state.history[HISTORY_SIZE - 1] = 1.000_25;
        let values = state.daily_distribution(&params, DistributionInputs {
            now: DAY0 + SEC_PER_DAY,
            mint_supply: yesterday + minted,
            future_ubi_bank: future_bank,
            interest_bank: 0,
        }).unwrap();
        prop_assert_eq!(
            values.interest_share + values.verified_human_ubi + values.future_ubi,
            values.hwm_increase * params.distribution_multiplier
        );
        prop_assert_eq!(values.supply_increase, values.total_minted());
        prop_assert!(values.verified_human_ubi <= values.supply_increase - values.interest_share);
    }

    #[test]
    fn prop_hwm_increase_respects_cap(
        script in prop::collection::vec(0u64..5_000, 1..40),
        cap in 0u64..200,
    ) {
        let params = fixed_cap(cap);
        let mut state = state_at(1_000_000_000, 0);
        let mut supply = state.yesterday_supply;
        for (day, minted) in script.into_iter().enumerate() {
            let before = state.high_water_mark;
            supply += minted;
            let values = run(&mut state, &params, day as i64 + 1, supply).unwrap();
            prop_assert!(values.hwm_increase <= cap);
            prop_assert!(state.high_water_mark >= before);
            prop_assert_eq!(state.high_water_mark, before + values.hwm_increase);
            supply += values.supply_increase;
        }
    }

    #[test]
    fn prop_same_day_rerun_changes_nothing(
        minted in 0u64..100_000,
        offset in 0i64..SEC_PER_DAY,
        later in 0i64..SEC_PER_DAY,
    ) {
        let params = ProtocolParams::default();
        let mut state = state_at(5_000_000, 0);
        let now = DAY0 + SEC_PER_DAY + offset;
        state.daily_distribution(&params, DistributionInputs {
            now,
            mint_supply: 5_000_000 + minted,
            future_ubi_bank: 0,
            interest_bank: 0,
        }).unwrap();
        let snapshot = state.clone();
        let supply = state.yesterday_supply + minted;
        let rerun = state.daily_distribution(&params, DistributionInputs {
            now: DAY0 + SEC_PER_DAY + later,
            mint_supply: supply,
            future_ubi_bank: 1_000,
            interest_bank: 0,
        });
        prop_assert!(matches!(rerun, Err(StipendError::AlreadyDistributedToday)));
        prop_assert_eq!(state, snapshot);
    }
}
