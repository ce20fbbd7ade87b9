// src/pipeline.rs
//
// load → normalize → join sectors → classify → join municipalities → filter
// → project → export, one batch per run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::{info, warn};

use crate::{
    classify::{classify_table, SizeTier, Thresholds},
    config::{Config, TableSource},
    enrich::{left_join, project, retain_in, KeyKind},
    error::PipelineError,
    export::{write_delimited_table, write_parquet, write_spreadsheet},
    prompt::{Input, Notifier, PathSelector, OUTPUT_DIR_PROMPT},
    table::{load_delimited_table, Table},
};

/// Resolved locations for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inputs {
    pub registry: PathBuf,
    pub sectors: PathBuf,
    pub municipalities: PathBuf,
    pub output_dir: PathBuf,
}

/// The three source tables after loading and normalization.
#[derive(Debug, Clone)]
pub struct Sources {
    pub registry: Table,
    pub sectors: Table,
    pub municipalities: Table,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub registry_rows: usize,
    pub enriched_rows: usize,
    pub exported_rows: usize,
    pub columns: Vec<String>,
    /// Exported rows per tier, in tier order.
    pub tier_counts: Vec<(SizeTier, usize)>,
    pub outputs: Vec<PathBuf>,
    pub elapsed: Duration,
    pub finished_at: DateTime<Utc>,
}

pub struct Pipeline {
    config: Config,
    thresholds: Thresholds,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let thresholds = Thresholds::new(config.classification.uvt)?;
        Ok(Self { config, thresholds })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run end to end. Failures, including a dismissed prompt, are reported
    /// through `notifier` before being returned.
    pub fn run(
        &self,
        selector: &mut dyn PathSelector,
        notifier: &mut dyn Notifier,
    ) -> Result<RunReport> {
        match self.try_run(selector) {
            Ok(report) => {
                notifier.notify_completion(&format!(
                    "Export completed.\nFiles saved in:\n{}",
                    report
                        .outputs
                        .first()
                        .and_then(|p| p.parent())
                        .map(|p| p.display().to_string())
                        .unwrap_or_default()
                ));
                Ok(report)
            }
            Err(err) => {
                notifier.notify_error(&format!("{:#}", err));
                Err(err)
            }
        }
    }

    fn try_run(&self, selector: &mut dyn PathSelector) -> Result<RunReport> {
        let start = Instant::now();
        let inputs = self.resolve_inputs(selector)?;
        let sources = self.load(&inputs)?;
        let registry_rows = sources.registry.len();
        let (enriched_rows, table) = self.process(sources)?;
        let outputs = self.export(&table, &inputs.output_dir)?;

        let report = RunReport {
            registry_rows,
            enriched_rows,
            exported_rows: table.len(),
            tier_counts: self.tier_counts(&table),
            columns: table.columns,
            outputs,
            elapsed: start.elapsed(),
            finished_at: Utc::now(),
        };
        info!(
            registry_rows = report.registry_rows,
            exported_rows = report.exported_rows,
            elapsed = ?report.elapsed,
            finished_at = %report.finished_at,
            "run complete"
        );
        Ok(report)
    }

    /// Ask for every location up front; the first dismissed prompt aborts.
    pub fn resolve_inputs(&self, selector: &mut dyn PathSelector) -> Result<Inputs> {
        let mut pick = |input: Input| -> Result<PathBuf> {
            selector
                .select_input(input)?
                .ok_or_else(|| PipelineError::aborted(input.prompt()).into())
        };
        let registry = pick(Input::Registry)?;
        let sectors = pick(Input::Sectors)?;
        let municipalities = pick(Input::Municipalities)?;
        let output_dir = selector
            .select_output_dir(OUTPUT_DIR_PROMPT)?
            .ok_or_else(|| PipelineError::aborted(OUTPUT_DIR_PROMPT))?;

        Ok(Inputs {
            registry,
            sectors,
            municipalities,
            output_dir,
        })
    }

    /// Load the three tables and establish the numeric columns.
    #[tracing::instrument(level = "info", skip_all)]
    pub fn load(&self, inputs: &Inputs) -> Result<Sources> {
        let cols = &self.config.columns;
        let src = &self.config.inputs;

        let mut registry = load_table("registry", &src.registry, &inputs.registry)?;
        registry.coerce_numeric(&[cols.revenue.as_str(), cols.activity_code.as_str()]);

        let mut sectors = load_table("sectors", &src.sectors, &inputs.sectors)?;
        sectors.coerce_numeric(&[cols.sector_code.as_str()]);

        let municipalities =
            load_table("municipalities", &src.municipalities, &inputs.municipalities)?;

        Ok(Sources {
            registry,
            sectors,
            municipalities,
        })
    }

    /// Enrich, classify, filter and project. Returns the row count before the
    /// region filter together with the final table.
    #[tracing::instrument(level = "info", skip_all, fields(rows = sources.registry.len()))]
    pub fn process(&self, sources: Sources) -> Result<(usize, Table)> {
        let cols = &self.config.columns;
        let Sources {
            registry,
            sectors,
            municipalities,
        } = sources;

        let mut table = left_join(
            &registry,
            &sectors,
            &cols.activity_code,
            &cols.sector_code,
            KeyKind::Numeric,
        )?;
        drop(registry);

        classify_table(
            &mut table,
            &self.thresholds,
            &cols.branch,
            &cols.revenue,
            &cols.tier,
        )?;

        let table = left_join(
            &table,
            &municipalities,
            &cols.municipality,
            &cols.municipality_code,
            KeyKind::Text,
        )?;
        let enriched_rows = table.len();

        let table = retain_in(table, &cols.department, &self.config.region.allowed);
        if table.is_empty() {
            warn!("no rows left after the region filter");
        }

        let extra = [sectors.columns.clone(), municipalities.columns.clone()];
        let table = project(table, &cols.required, &extra);
        Ok((enriched_rows, table))
    }

    /// Write every configured output into `output_dir`. Returns the written paths.
    #[tracing::instrument(level = "info", skip(self, table), fields(dir = %output_dir.display()))]
    pub fn export(&self, table: &Table, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let exp = &self.config.export;
        let mut outputs = Vec::with_capacity(3);

        let csv_path = output_dir.join(&exp.csv_name);
        write_delimited_table(table, &csv_path, exp.delimiter_byte()?, exp.encoding)?;
        outputs.push(csv_path);

        let xlsx_path = output_dir.join(&exp.xlsx_name);
        write_spreadsheet(table, &xlsx_path)?;
        outputs.push(xlsx_path);

        if exp.parquet {
            let parquet_path = output_dir.join(&exp.parquet_name);
            write_parquet(table, &parquet_path)?;
            outputs.push(parquet_path);
        }

        for path in &outputs {
            let bytes = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            info!(path = %path.display(), bytes, "output written");
        }
        Ok(outputs)
    }

    fn tier_counts(&self, table: &Table) -> Vec<(SizeTier, usize)> {
        let Some(idx) = table.column_index(&self.config.columns.tier) else {
            return Vec::new();
        };
        SizeTier::ALL
            .iter()
            .map(|&tier| {
                let n = table
                    .rows
                    .iter()
                    .filter(|row| row[idx].as_text() == Some(tier.label()))
                    .count();
                (tier, n)
            })
            .collect()
    }
}

fn load_table(name: &str, source: &TableSource, path: &Path) -> Result<Table> {
    let raw = load_delimited_table(path, source.delimiter_byte()?, source.encoding)?;
    Table::from_raw(name, raw).with_context(|| format!("loading {} from {}", name, path.display()))
}
