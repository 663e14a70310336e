use std::str::FromStr;

use serde::Serialize;

use super::error::SimulationError;

pub const TOTAL_POPULATION: u64 = 100_000;

const SHARE_SUM_TOLERANCE: f64 = 1e-9;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum BracketKind {
    Low,
    #[serde(rename = "Lower-Middle")]
    LowerMiddle,
    #[serde(rename = "Upper-Middle")]
    UpperMiddle,
    High,
}

impl BracketKind {
    pub const ALL: [BracketKind; 4] = [
        BracketKind::Low,
        BracketKind::LowerMiddle,
        BracketKind::UpperMiddle,
        BracketKind::High,
    ];

    pub fn label(self) -> &'static str {
        match self {
            BracketKind::Low => "Low",
            BracketKind::LowerMiddle => "Lower-Middle",
            BracketKind::UpperMiddle => "Upper-Middle",
            BracketKind::High => "High",
        }
    }

    /// Fixed (basic, luxury) split of consumption. Poorer brackets spend almost
    /// everything on basics; the two shares always sum to 1.
    pub fn consumption_split(self) -> ConsumptionSplit {
        let (basic, luxury) = match self {
            BracketKind::Low => (0.98, 0.02),
            BracketKind::LowerMiddle => (0.95, 0.05),
            BracketKind::UpperMiddle => (0.90, 0.10),
            BracketKind::High => (0.80, 0.20),
        };
        ConsumptionSplit { basic, luxury }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionSplit {
    pub basic: f64,
    pub luxury: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeBracket {
    pub kind: BracketKind,
    pub population_share: f64,
    pub average_income: f64,
    pub mpc: f64,
}

impl IncomeBracket {
    pub fn new(kind: BracketKind, population_share: f64, average_income: f64, mpc: f64) -> Self {
        Self {
            kind,
            population_share,
            average_income,
            mpc,
        }
    }

    pub fn consumption_split(&self) -> ConsumptionSplit {
        self.kind.consumption_split()
    }
}

/// Immutable reference economy handed to the engine on every call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationModel {
    total_population: u64,
    brackets: Vec<IncomeBracket>,
}

impl PopulationModel {
    pub fn new(
        total_population: u64,
        brackets: Vec<IncomeBracket>,
    ) -> Result<Self, SimulationError> {
        if total_population == 0 {
            return Err(SimulationError::invalid("total population must be > 0"));
        }
        if brackets.is_empty() {
            return Err(SimulationError::invalid("population model needs at least one bracket"));
        }

        for bracket in &brackets {
            let name = bracket.kind.label();
            if !bracket.population_share.is_finite()
                || bracket.population_share <= 0.0
                || bracket.population_share > 1.0
            {
                return Err(SimulationError::invalid(format!(
                    "{name} population share must be in (0, 1]"
                )));
            }
            if !bracket.average_income.is_finite() || bracket.average_income <= 0.0 {
                return Err(SimulationError::invalid(format!(
                    "{name} average income must be > 0"
                )));
            }
            if !bracket.mpc.is_finite() || bracket.mpc <= 0.0 || bracket.mpc > 1.0 {
                return Err(SimulationError::invalid(format!("{name} mpc must be in (0, 1]")));
            }
        }

        let share_sum: f64 = brackets.iter().map(|b| b.population_share).sum();
        if (share_sum - 1.0).abs() > SHARE_SUM_TOLERANCE {
            return Err(SimulationError::invalid(format!(
                "population shares must sum to 1, got {share_sum}"
            )));
        }

        Ok(Self {
            total_population,
            brackets,
        })
    }

    pub fn reference() -> Self {
        Self {
            total_population: TOTAL_POPULATION,
            brackets: reference_brackets(),
        }
    }

    /// Reference brackets over a different head count.
    pub fn reference_with_population(total_population: u64) -> Result<Self, SimulationError> {
        Self::new(total_population, reference_brackets())
    }

    pub fn total_population(&self) -> u64 {
        self.total_population
    }

    pub fn brackets(&self) -> &[IncomeBracket] {
        &self.brackets
    }
}

fn reference_brackets() -> Vec<IncomeBracket> {
    vec![
        IncomeBracket::new(BracketKind::Low, 0.30, 20_000.0, 0.95),
        IncomeBracket::new(BracketKind::LowerMiddle, 0.40, 40_000.0, 0.85),
        IncomeBracket::new(BracketKind::UpperMiddle, 0.20, 80_000.0, 0.75),
        IncomeBracket::new(BracketKind::High, 0.10, 200_000.0, 0.60),
    ]
}

impl Default for PopulationModel {
    fn default() -> Self {
        Self::reference()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UbiTarget {
    Everyone,
    #[serde(rename = "bottom-50")]
    Bottom50,
    #[serde(rename = "bottom-20")]
    Bottom20,
}

impl UbiTarget {
    pub const ALL: [UbiTarget; 3] = [UbiTarget::Bottom20, UbiTarget::Bottom50, UbiTarget::Everyone];

    pub fn label(self) -> &'static str {
        match self {
            UbiTarget::Everyone => "Everyone",
            UbiTarget::Bottom50 => "Bottom 50% income",
            UbiTarget::Bottom20 => "Bottom 20% income",
        }
    }

    /// Upper bound on a bracket's cumulative population share for it to qualify.
    /// `None` means every bracket qualifies.
    pub fn cumulative_share_cutoff(self) -> Option<f64> {
        match self {
            UbiTarget::Everyone => None,
            UbiTarget::Bottom50 => Some(0.50),
            UbiTarget::Bottom20 => Some(0.20),
        }
    }
}

impl FromStr for UbiTarget {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Everyone" | "everyone" => Ok(UbiTarget::Everyone),
            "Bottom 50% income" | "bottom-50" | "bottom_50" | "bottom50" => Ok(UbiTarget::Bottom50),
            "Bottom 20% income" | "bottom-20" | "bottom_20" | "bottom20" => Ok(UbiTarget::Bottom20),
            other => Err(SimulationError::invalid(format!(
                "unknown UBI target '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyInputs {
    pub vat_rate: f64,
    pub luxury_tax_rate: f64,
    pub income_tax_rate: f64,
    pub ubi_monthly_amount: f64,
    pub ubi_target: UbiTarget,
}

impl Default for PolicyInputs {
    fn default() -> Self {
        Self {
            vat_rate: 0.10,
            luxury_tax_rate: 0.10,
            income_tax_rate: 0.15,
            ubi_monthly_amount: 800.0,
            ubi_target: UbiTarget::Everyone,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketOutcome {
    pub kind: BracketKind,
    pub population_count: u64,
    pub average_income: f64,
    pub mpc: f64,
    pub consumption: f64,
    pub basic_consumption: f64,
    pub luxury_consumption: f64,
    pub vat_tax_per_person: f64,
    pub luxury_tax_per_person: f64,
    pub income_tax_per_person: f64,
    pub total_tax_per_person: f64,
    pub total_tax_group: f64,
    pub cumulative_population_share: f64,
    pub ubi_eligible: bool,
    pub ubi_per_person: f64,
    pub disposable_income_per_person: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    /// Ascending by average income.
    pub rows: Vec<BracketOutcome>,
    pub total_tax_revenue: f64,
    pub total_ubi_cost: f64,
    pub budget_balance: f64,
    /// Top over bottom disposable income; `None` when the bottom bracket's
    /// disposable income is not strictly positive.
    pub inequality_ratio: Option<f64>,
    pub ubi_recipients: u64,
    pub ubi_annual_per_person: f64,
}
