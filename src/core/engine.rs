use super::error::SimulationError;
use super::types::{
    BracketOutcome, IncomeBracket, PolicyInputs, PopulationModel, SimulationResult, UbiTarget,
};

const MONTHS_PER_YEAR: f64 = 12.0;

#[derive(Debug, Clone, Copy)]
struct TaxedBracket {
    bracket: IncomeBracket,
    population_count: u64,
    consumption: f64,
    basic_consumption: f64,
    luxury_consumption: f64,
    vat_tax: f64,
    luxury_tax: f64,
    income_tax: f64,
}

impl TaxedBracket {
    fn total_tax_per_person(self) -> f64 {
        self.vat_tax + self.luxury_tax + self.income_tax
    }

    fn total_tax_group(self) -> f64 {
        self.total_tax_per_person() * self.population_count as f64
    }
}

#[derive(Debug, Clone, Copy)]
struct RankedBracket {
    taxed: TaxedBracket,
    cumulative_population_share: f64,
}

impl RankedBracket {
    fn is_eligible(self, target: UbiTarget) -> bool {
        match target.cumulative_share_cutoff() {
            None => true,
            Some(cutoff) => self.cumulative_population_share <= cutoff,
        }
    }
}

/// Brackets in ascending average-income order, each carrying the population
/// share accumulated through and including itself. Only `rank_by_income`
/// builds one, so targeting and the inequality ratio can rely on the order.
#[derive(Debug)]
struct RankedRows {
    rows: Vec<RankedBracket>,
}

impl RankedRows {
    fn ubi_recipients(&self, target: UbiTarget) -> u64 {
        self.rows
            .iter()
            .filter(|row| row.is_eligible(target))
            .map(|row| row.taxed.population_count)
            .sum()
    }

    fn into_outcomes(self, target: UbiTarget, ubi_annual_per_person: f64) -> Vec<BracketOutcome> {
        self.rows
            .into_iter()
            .map(|row| {
                let taxed = row.taxed;
                let ubi_eligible = row.is_eligible(target);
                let ubi_per_person = if ubi_eligible {
                    ubi_annual_per_person
                } else {
                    0.0
                };
                BracketOutcome {
                    kind: taxed.bracket.kind,
                    population_count: taxed.population_count,
                    average_income: taxed.bracket.average_income,
                    mpc: taxed.bracket.mpc,
                    consumption: taxed.consumption,
                    basic_consumption: taxed.basic_consumption,
                    luxury_consumption: taxed.luxury_consumption,
                    vat_tax_per_person: taxed.vat_tax,
                    luxury_tax_per_person: taxed.luxury_tax,
                    income_tax_per_person: taxed.income_tax,
                    total_tax_per_person: taxed.total_tax_per_person(),
                    total_tax_group: taxed.total_tax_group(),
                    cumulative_population_share: row.cumulative_population_share,
                    ubi_eligible,
                    ubi_per_person,
                    disposable_income_per_person: taxed.bracket.average_income
                        - taxed.income_tax
                        - taxed.vat_tax
                        - taxed.luxury_tax
                        + ubi_per_person,
                }
            })
            .collect()
    }
}

/// Runs one policy scenario against the population model.
///
/// Stateless: the model is only read, and identical arguments always give
/// bit-identical results. Rejects negative or non-finite rates and UBI amounts
/// instead of clamping them.
pub fn run_simulation(
    inputs: &PolicyInputs,
    model: &PopulationModel,
) -> Result<SimulationResult, SimulationError> {
    validate_policy(inputs)?;

    let total_population = model.total_population();
    let taxed: Vec<TaxedBracket> = model
        .brackets()
        .iter()
        .map(|bracket| {
            let population_count = segment_population(total_population, bracket.population_share);
            tax_bracket(inputs, *bracket, population_count)
        })
        .collect();

    let total_tax_revenue: f64 = taxed.iter().map(|t| t.total_tax_group()).sum();

    let ranked = rank_by_income(taxed, total_population);
    let ubi_annual_per_person = inputs.ubi_monthly_amount * MONTHS_PER_YEAR;
    let ubi_recipients = ranked.ubi_recipients(inputs.ubi_target);
    let total_ubi_cost = ubi_recipients as f64 * ubi_annual_per_person;
    let budget_balance = total_tax_revenue - total_ubi_cost;

    let rows = ranked.into_outcomes(inputs.ubi_target, ubi_annual_per_person);
    let inequality_ratio = inequality_ratio(&rows);

    Ok(SimulationResult {
        rows,
        total_tax_revenue,
        total_ubi_cost,
        budget_balance,
        inequality_ratio,
        ubi_recipients,
        ubi_annual_per_person,
    })
}

fn validate_policy(inputs: &PolicyInputs) -> Result<(), SimulationError> {
    for (name, rate) in [
        ("vat_rate", inputs.vat_rate),
        ("luxury_tax_rate", inputs.luxury_tax_rate),
        ("income_tax_rate", inputs.income_tax_rate),
    ] {
        if !rate.is_finite() || rate < 0.0 {
            return Err(SimulationError::invalid(format!(
                "{name} must be a non-negative fraction, got {rate}"
            )));
        }
    }

    if !inputs.ubi_monthly_amount.is_finite() || inputs.ubi_monthly_amount < 0.0 {
        return Err(SimulationError::invalid(format!(
            "ubi_monthly_amount must be >= 0, got {}",
            inputs.ubi_monthly_amount
        )));
    }

    Ok(())
}

/// Truncates rather than rounds, so the bracket counts can sum to slightly
/// less than the total population.
fn segment_population(total_population: u64, population_share: f64) -> u64 {
    (total_population as f64 * population_share).floor() as u64
}

fn tax_bracket(
    inputs: &PolicyInputs,
    bracket: IncomeBracket,
    population_count: u64,
) -> TaxedBracket {
    let split = bracket.consumption_split();
    let consumption = bracket.average_income * bracket.mpc;
    let basic_consumption = consumption * split.basic;
    let luxury_consumption = consumption * split.luxury;

    TaxedBracket {
        bracket,
        population_count,
        consumption,
        basic_consumption,
        luxury_consumption,
        vat_tax: inputs.vat_rate * (basic_consumption + luxury_consumption),
        luxury_tax: inputs.luxury_tax_rate * luxury_consumption,
        income_tax: inputs.income_tax_rate * bracket.average_income,
    }
}

fn rank_by_income(mut taxed: Vec<TaxedBracket>, total_population: u64) -> RankedRows {
    // Vec::sort_by is stable, so equal incomes keep model order.
    taxed.sort_by(|a, b| a.bracket.average_income.total_cmp(&b.bracket.average_income));

    let mut cumulative_count = 0u64;
    let rows = taxed
        .into_iter()
        .map(|taxed| {
            cumulative_count += taxed.population_count;
            RankedBracket {
                taxed,
                cumulative_population_share: cumulative_count as f64 / total_population as f64,
            }
        })
        .collect();

    RankedRows { rows }
}

/// `rows` must be ascending by income, as `RankedRows::into_outcomes` yields them.
fn inequality_ratio(rows: &[BracketOutcome]) -> Option<f64> {
    let bottom = rows.first()?.disposable_income_per_person;
    let top = rows.last()?.disposable_income_per_person;
    if bottom > 0.0 { Some(top / bottom) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BracketKind, TOTAL_POPULATION};
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const REL_TOL: f64 = 1e-6;

    fn assert_rel(actual: f64, expected: f64) {
        let scale = expected.abs().max(1.0);
        assert!(
            (actual - expected).abs() <= REL_TOL * scale,
            "expected {expected}, got {actual}"
        );
    }

    fn reference_inputs() -> PolicyInputs {
        PolicyInputs::default()
    }

    fn zero_inputs() -> PolicyInputs {
        PolicyInputs {
            vat_rate: 0.0,
            luxury_tax_rate: 0.0,
            income_tax_rate: 0.0,
            ubi_monthly_amount: 0.0,
            ubi_target: UbiTarget::Everyone,
        }
    }

    fn run(inputs: &PolicyInputs) -> SimulationResult {
        run_simulation(inputs, &PopulationModel::reference()).expect("valid inputs")
    }

    #[test]
    fn reference_scenario_matches_hand_computed_values() {
        let result = run(&reference_inputs());

        assert_rel(result.total_tax_revenue, 1_346_940_000.0);
        assert_rel(result.total_ubi_cost, 960_000_000.0);
        assert_rel(result.budget_balance, 386_940_000.0);
        assert_eq!(result.ubi_recipients, TOTAL_POPULATION);
        assert_rel(result.ubi_annual_per_person, 9_600.0);

        let disposable: Vec<f64> = result
            .rows
            .iter()
            .map(|row| row.disposable_income_per_person)
            .collect();
        for (actual, expected) in disposable.iter().zip([24_662.0, 40_030.0, 71_000.0, 165_200.0]) {
            assert_rel(*actual, expected);
        }

        let ratio = result.inequality_ratio.expect("bottom disposable income is positive");
        assert_rel(ratio, 165_200.0 / 24_662.0);
    }

    #[test]
    fn reference_scenario_per_bracket_taxes() {
        let result = run(&reference_inputs());
        let low = &result.rows[0];

        assert_eq!(low.kind, BracketKind::Low);
        assert_eq!(low.population_count, 30_000);
        assert_rel(low.consumption, 19_000.0);
        assert_rel(low.basic_consumption, 18_620.0);
        assert_rel(low.luxury_consumption, 380.0);
        assert_rel(low.vat_tax_per_person, 1_900.0);
        assert_rel(low.luxury_tax_per_person, 38.0);
        assert_rel(low.income_tax_per_person, 3_000.0);
        assert_rel(low.total_tax_per_person, 4_938.0);
        assert_rel(low.total_tax_group, 148_140_000.0);

        let high = &result.rows[3];
        assert_eq!(high.kind, BracketKind::High);
        assert_rel(high.luxury_consumption, 24_000.0);
        assert_rel(high.total_tax_group, 444_000_000.0);
    }

    #[test]
    fn cumulative_shares_follow_income_order() {
        let result = run(&reference_inputs());
        let shares: Vec<f64> = result
            .rows
            .iter()
            .map(|row| row.cumulative_population_share)
            .collect();
        for (actual, expected) in shares.iter().zip([0.3, 0.7, 0.9, 1.0]) {
            assert_rel(*actual, expected);
        }
    }

    #[test]
    fn zero_policy_leaves_income_untouched() {
        let result = run(&zero_inputs());

        assert_eq!(result.total_tax_revenue, 0.0);
        assert_eq!(result.total_ubi_cost, 0.0);
        assert_eq!(result.budget_balance, 0.0);
        for row in &result.rows {
            assert_eq!(row.disposable_income_per_person, row.average_income);
        }
        assert_rel(result.inequality_ratio.expect("positive bottom income"), 10.0);
    }

    #[test]
    fn bottom_fifty_only_reaches_low_bracket() {
        let mut inputs = reference_inputs();
        inputs.ubi_target = UbiTarget::Bottom50;
        let result = run(&inputs);

        let eligible: Vec<bool> = result.rows.iter().map(|row| row.ubi_eligible).collect();
        assert_eq!(eligible, vec![true, false, false, false]);
        assert_eq!(result.ubi_recipients, 30_000);
        assert_rel(result.total_ubi_cost, 30_000.0 * 9_600.0);
        assert_eq!(result.rows[1].ubi_per_person, 0.0);
    }

    #[test]
    fn bottom_twenty_reaches_nobody_because_low_bracket_is_thirty_percent() {
        let mut inputs = reference_inputs();
        inputs.ubi_target = UbiTarget::Bottom20;
        let result = run(&inputs);

        assert!(result.rows.iter().all(|row| !row.ubi_eligible));
        assert_eq!(result.ubi_recipients, 0);
        assert_eq!(result.total_ubi_cost, 0.0);
        assert_eq!(result.budget_balance, result.total_tax_revenue);
    }

    #[test]
    fn full_income_tax_makes_inequality_unavailable() {
        let mut inputs = reference_inputs();
        inputs.income_tax_rate = 1.0;
        inputs.ubi_monthly_amount = 0.0;
        let result = run(&inputs);

        assert!(result.rows[0].disposable_income_per_person < 0.0);
        assert_eq!(result.inequality_ratio, None);
    }

    #[test]
    fn zero_bottom_disposable_income_is_unavailable_not_infinite() {
        let mut inputs = zero_inputs();
        inputs.income_tax_rate = 1.0;
        let result = run(&inputs);

        assert_eq!(result.rows[0].disposable_income_per_person, 0.0);
        assert_eq!(result.inequality_ratio, None);
    }

    #[test]
    fn rejects_negative_and_non_finite_inputs() {
        let model = PopulationModel::reference();

        let mut inputs = reference_inputs();
        inputs.vat_rate = -0.01;
        let err = run_simulation(&inputs, &model).expect_err("negative vat");
        assert!(err.to_string().contains("vat_rate"));

        let mut inputs = reference_inputs();
        inputs.luxury_tax_rate = f64::NAN;
        assert!(run_simulation(&inputs, &model).is_err());

        let mut inputs = reference_inputs();
        inputs.ubi_monthly_amount = -50.0;
        let err = run_simulation(&inputs, &model).expect_err("negative ubi");
        assert!(matches!(err, SimulationError::InvalidInput(_)));
    }

    #[test]
    fn accepts_rates_above_presentation_ranges() {
        let mut inputs = reference_inputs();
        inputs.vat_rate = 0.75;
        inputs.income_tax_rate = 0.9;
        assert!(run_simulation(&inputs, &PopulationModel::reference()).is_ok());
    }

    #[test]
    fn segmentation_truncates_instead_of_rounding() {
        let model = PopulationModel::reference_with_population(7).expect("valid model");
        let result = run_simulation(&reference_inputs(), &model).expect("valid inputs");

        let counts: Vec<u64> = result.rows.iter().map(|row| row.population_count).collect();
        assert_eq!(counts, vec![2, 2, 1, 0]);
        assert_eq!(result.ubi_recipients, 5);
    }

    #[test]
    fn even_split_loses_people_to_floor() {
        let brackets = BracketKind::ALL
            .iter()
            .enumerate()
            .map(|(i, kind)| IncomeBracket::new(*kind, 0.25, 10_000.0 * (i + 1) as f64, 0.9))
            .collect();
        let model = PopulationModel::new(10, brackets).expect("valid model");
        let result = run_simulation(&reference_inputs(), &model).expect("valid inputs");

        assert!(result.rows.iter().all(|row| row.population_count == 2));
        assert_eq!(result.ubi_recipients, 8);
        assert_rel(result.rows[3].cumulative_population_share, 0.8);
    }

    #[test]
    fn rows_are_sorted_by_income_with_stable_ties() {
        let model = PopulationModel::new(
            1_000,
            vec![
                IncomeBracket::new(BracketKind::High, 0.1, 150_000.0, 0.6),
                IncomeBracket::new(BracketKind::LowerMiddle, 0.4, 30_000.0, 0.85),
                IncomeBracket::new(BracketKind::Low, 0.3, 30_000.0, 0.95),
                IncomeBracket::new(BracketKind::UpperMiddle, 0.2, 60_000.0, 0.75),
            ],
        )
        .expect("valid model");
        let result = run_simulation(&reference_inputs(), &model).expect("valid inputs");

        let kinds: Vec<BracketKind> = result.rows.iter().map(|row| row.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BracketKind::LowerMiddle,
                BracketKind::Low,
                BracketKind::UpperMiddle,
                BracketKind::High
            ]
        );
    }

    #[test]
    fn does_not_mutate_the_model() {
        let model = PopulationModel::reference();
        let before = model.clone();
        let _ = run_simulation(&reference_inputs(), &model).expect("valid inputs");
        assert_eq!(model, before);
    }

    fn policy(vat_bp: u32, lux_bp: u32, inc_bp: u32, ubi: u32, target_idx: usize) -> PolicyInputs {
        PolicyInputs {
            vat_rate: vat_bp as f64 / 10_000.0,
            luxury_tax_rate: lux_bp as f64 / 10_000.0,
            income_tax_rate: inc_bp as f64 / 10_000.0,
            ubi_monthly_amount: ubi as f64,
            ubi_target: UbiTarget::ALL[target_idx],
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_repeated_runs_are_identical(
            vat_bp in 0u32..3000,
            lux_bp in 0u32..4000,
            inc_bp in 0u32..4000,
            ubi in 0u32..2000,
            target_idx in 0usize..3
        ) {
            let inputs = policy(vat_bp, lux_bp, inc_bp, ubi, target_idx);
            let first = run(&inputs);
            let second = run(&inputs);
            prop_assert_eq!(first.total_tax_revenue.to_bits(), second.total_tax_revenue.to_bits());
            prop_assert_eq!(first.budget_balance.to_bits(), second.budget_balance.to_bits());
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_budget_identity_is_exact(
            vat_bp in 0u32..3000,
            lux_bp in 0u32..4000,
            inc_bp in 0u32..4000,
            ubi in 0u32..2000,
            target_idx in 0usize..3
        ) {
            let result = run(&policy(vat_bp, lux_bp, inc_bp, ubi, target_idx));
            prop_assert_eq!(
                result.budget_balance,
                result.total_tax_revenue - result.total_ubi_cost
            );
        }

        #[test]
        fn prop_revenue_never_falls_when_a_rate_rises(
            vat_bp in 0u32..3000,
            lux_bp in 0u32..4000,
            inc_bp in 0u32..4000,
            bump_bp in 0u32..2000,
            which in 0usize..3
        ) {
            let base = policy(vat_bp, lux_bp, inc_bp, 800, 2);
            let mut raised = base.clone();
            let bump = bump_bp as f64 / 10_000.0;
            match which {
                0 => raised.vat_rate += bump,
                1 => raised.luxury_tax_rate += bump,
                _ => raised.income_tax_rate += bump,
            }
            prop_assert!(run(&raised).total_tax_revenue >= run(&base).total_tax_revenue);
        }

        #[test]
        fn prop_ubi_cost_never_falls_when_amount_rises(
            ubi in 0u32..2000,
            extra in 0u32..2000,
            target_idx in 0usize..3
        ) {
            let base = policy(1000, 1000, 1500, ubi, target_idx);
            let raised = policy(1000, 1000, 1500, ubi + extra, target_idx);
            prop_assert!(run(&raised).total_ubi_cost >= run(&base).total_ubi_cost);
        }

        #[test]
        fn prop_widening_target_only_adds_recipients(
            ubi in 0u32..2000,
            population in 1u64..500_000
        ) {
            let model =
                PopulationModel::reference_with_population(population).expect("valid model");
            let eligible_for = |target: UbiTarget| {
                let mut inputs = reference_inputs();
                inputs.ubi_monthly_amount = ubi as f64;
                inputs.ubi_target = target;
                run_simulation(&inputs, &model).expect("valid inputs")
            };

            let narrow = eligible_for(UbiTarget::Bottom20);
            let middle = eligible_for(UbiTarget::Bottom50);
            let everyone = eligible_for(UbiTarget::Everyone);

            prop_assert!(narrow.ubi_recipients <= middle.ubi_recipients);
            prop_assert!(middle.ubi_recipients <= everyone.ubi_recipients);
            for i in 0..everyone.rows.len() {
                prop_assert!(!narrow.rows[i].ubi_eligible || middle.rows[i].ubi_eligible);
                prop_assert!(!middle.rows[i].ubi_eligible || everyone.rows[i].ubi_eligible);
            }

            let total: u64 = everyone.rows.iter().map(|row| row.population_count).sum();
            prop_assert_eq!(everyone.ubi_recipients, total);
            prop_assert!(total <= population);
        }
    }
}
