//! Size-tier classification of businesses by declared ordinary revenue.
//!
//! Each economic branch has three ascending breakpoints expressed in multiples
//! of the UVT monetary unit. A revenue equal to a breakpoint belongs to the
//! smaller tier.

use std::{collections::BTreeMap, fmt};

use anyhow::Result;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::table::{Table, Value};

/// UVT for 2024.
pub const DEFAULT_UVT: u64 = 47_065;

/// Largest integer every `f64` represents exactly.
const MAX_EXACT_F64: u64 = 1 << 53;

/// Economic sector branch (`RAMA`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Branch {
    Servicio,
    Comercio,
    Industria,
}

impl Branch {
    /// Branch used for anything that is not exactly "Servicio" or "Comercio",
    /// including records whose sector lookup found nothing.
    pub const DEFAULT: Branch = Branch::Industria;

    /// Resolve a `RAMA` label. Matching is exact; unknown labels fall back to `DEFAULT`.
    pub fn from_label(label: Option<&str>) -> Branch {
        match label {
            Some("Servicio") => Branch::Servicio,
            Some("Comercio") => Branch::Comercio,
            _ => Branch::DEFAULT,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Branch::Servicio => "Servicio",
            Branch::Comercio => "Comercio",
            Branch::Industria => "Industria",
        }
    }

    /// Breakpoint multipliers of the UVT unit, ascending.
    pub fn multipliers(self) -> [u64; 3] {
        match self {
            Branch::Servicio => [32_988, 131_951, 483_034],
            Branch::Comercio => [44_769, 431_196, 2_160_692],
            Branch::Industria => [23_563, 204_995, 1_736_565],
        }
    }
}

/// Size tier, ordered from smallest to largest; `Unknown` sorts last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SizeTier {
    Micro,
    Small,
    Medium,
    Large,
    Unknown,
}

impl SizeTier {
    pub const ALL: [SizeTier; 5] = [
        SizeTier::Micro,
        SizeTier::Small,
        SizeTier::Medium,
        SizeTier::Large,
        SizeTier::Unknown,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SizeTier::Micro => "Microempresa",
            SizeTier::Small => "Pequeña empresa",
            SizeTier::Medium => "Mediana empresa",
            SizeTier::Large => "Gran empresa",
            SizeTier::Unknown => "Sin información",
        }
    }
}

impl fmt::Display for SizeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Monetary breakpoints per branch, precomputed for a given UVT.
///
/// Products are computed in `u64` and must stay below 2^53 so the `f64`
/// thresholds compared against revenue are exact.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    uvt: u64,
    servicio: [f64; 3],
    comercio: [f64; 3],
    industria: [f64; 3],
}

impl Thresholds {
    pub fn new(uvt: u64) -> Result<Self, PipelineError> {
        if uvt == 0 {
            return Err(PipelineError::InvalidThresholds("UVT must be positive".into()));
        }
        let scale = |branch: Branch| -> Result<[f64; 3], PipelineError> {
            let mut out = [0.0; 3];
            for (slot, m) in out.iter_mut().zip(branch.multipliers()) {
                let product = uvt
                    .checked_mul(m)
                    .filter(|p| *p <= MAX_EXACT_F64)
                    .ok_or_else(|| {
                        PipelineError::InvalidThresholds(format!(
                            "UVT {} × {} for {} is not exactly representable",
                            uvt,
                            m,
                            branch.label()
                        ))
                    })?;
                *slot = product as f64;
            }
            Ok(out)
        };
        Ok(Self {
            uvt,
            servicio: scale(Branch::Servicio)?,
            comercio: scale(Branch::Comercio)?,
            industria: scale(Branch::Industria)?,
        })
    }

    pub fn uvt(&self) -> u64 {
        self.uvt
    }

    /// Monetary breakpoints for `branch`, ascending.
    pub fn breakpoints(&self, branch: Branch) -> [f64; 3] {
        match branch {
            Branch::Servicio => self.servicio,
            Branch::Comercio => self.comercio,
            Branch::Industria => self.industria,
        }
    }

    /// Classify a revenue figure. Missing revenue is `Unknown` for every branch;
    /// a missing branch uses `Branch::DEFAULT`.
    pub fn classify(&self, branch: Option<Branch>, revenue: Option<f64>) -> SizeTier {
        let Some(revenue) = revenue else {
            return SizeTier::Unknown;
        };
        let [b1, b2, b3] = self.breakpoints(branch.unwrap_or(Branch::DEFAULT));
        if revenue <= b1 {
            SizeTier::Micro
        } else if revenue <= b2 {
            SizeTier::Small
        } else if revenue <= b3 {
            SizeTier::Medium
        } else {
            SizeTier::Large
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::new(DEFAULT_UVT).expect("default UVT thresholds fit in f64")
    }
}

/// Classify every row of `table` and append the result as `tier_column`.
///
/// `branch_column` may be absent (every row then uses the default branch);
/// `revenue_column` must already be coerced to numeric.
#[tracing::instrument(level = "info", skip(table, thresholds), fields(table = %table.name, rows = table.len()))]
pub fn classify_table(
    table: &mut Table,
    thresholds: &Thresholds,
    branch_column: &str,
    revenue_column: &str,
    tier_column: &str,
) -> Result<()> {
    let revenue_idx = table.require_column(revenue_column)?;
    let branch_idx = table.column_index(branch_column);
    if branch_idx.is_none() {
        info!(
            column = branch_column,
            default = Branch::DEFAULT.label(),
            "branch column absent, every row uses the default branch"
        );
    }

    let mut counts: BTreeMap<SizeTier, usize> = BTreeMap::new();
    let tiers: Vec<Value> = table
        .rows
        .iter()
        .map(|row| {
            let branch = branch_idx
                .and_then(|i| row[i].render())
                .map(|label| Branch::from_label(Some(label.as_ref())));
            let tier = thresholds.classify(branch, row[revenue_idx].as_number());
            *counts.entry(tier).or_default() += 1;
            Value::Text(tier.label().to_string())
        })
        .collect();

    for (tier, n) in &counts {
        debug!(tier = tier.label(), n, "classified");
    }
    table.push_column(tier_column, tiers);
    Ok(())
}
