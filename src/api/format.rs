use serde::Serialize;

use crate::core::{BracketKind, SimulationResult};

const UNAVAILABLE: &str = "n/a";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayMetric {
    pub label: &'static str,
    pub value: String,
    pub delta: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayRow {
    pub income_group: BracketKind,
    pub population: String,
    pub average_income: String,
    pub disposable_income: String,
    pub ubi_received: String,
    pub taxes_paid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayBlock {
    pub metrics: Vec<DisplayMetric>,
    pub rows: Vec<DisplayRow>,
}

pub fn build_display(result: &SimulationResult) -> DisplayBlock {
    let metrics = vec![
        DisplayMetric {
            label: "Total Tax Revenue (annual)",
            value: format_currency(result.total_tax_revenue),
            delta: None,
        },
        DisplayMetric {
            label: "Total UBI Cost (annual)",
            value: format_currency(result.total_ubi_cost),
            delta: None,
        },
        DisplayMetric {
            label: "Budget Surplus / Deficit",
            value: format_currency(result.budget_balance),
            delta: balance_delta(result.budget_balance, result.total_tax_revenue),
        },
        DisplayMetric {
            label: "Inequality (Top/Bottom disposable)",
            value: format_ratio(result.inequality_ratio),
            delta: None,
        },
    ];

    let rows = result
        .rows
        .iter()
        .map(|row| DisplayRow {
            income_group: row.kind,
            population: format_count(row.population_count),
            average_income: format_currency(row.average_income),
            disposable_income: format_currency(row.disposable_income_per_person),
            ubi_received: format_currency(row.ubi_per_person),
            taxes_paid: format_currency(row.total_tax_per_person),
        })
        .collect();

    DisplayBlock { metrics, rows }
}

/// Whole currency units with thousands separators, e.g. `$1,346,940` or `-$1,938`.
pub fn format_currency(value: f64) -> String {
    if !value.is_finite() {
        return UNAVAILABLE.to_string();
    }
    let digits = format!("{:.0}", value.abs());
    let grouped = group_thousands(&digits);
    if value < 0.0 && digits != "0" {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

pub fn format_count(count: u64) -> String {
    group_thousands(&count.to_string())
}

pub fn format_ratio(ratio: Option<f64>) -> String {
    match ratio {
        Some(r) if r.is_finite() => format!("{r:.2}"),
        _ => UNAVAILABLE.to_string(),
    }
}

/// Balance as a percentage of revenue; absent when there is no revenue.
pub fn balance_delta(budget_balance: f64, total_tax_revenue: f64) -> Option<String> {
    if total_tax_revenue > 0.0 {
        Some(format!("{:.1}%", budget_balance / total_tax_revenue * 100.0))
    } else {
        None
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
