use anyhow::Result;
use clap::Parser;
use rues_tamano::{
    prompt::{PresetSelector, TerminalNotifier, TerminalSelector},
    Config, Pipeline, PipelineError,
};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Classify registered businesses by size tier and export the Bogotá/Cundinamarca subset"
)]
struct Args {
    /// YAML config file; defaults are used for anything it leaves out.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Pipe-delimited RUES registry export (.txt).
    #[arg(long)]
    registry: Option<PathBuf>,
    /// CIIU_PIB sector reference (.csv).
    #[arg(long)]
    sectors: Option<PathBuf>,
    /// Municipios_Provincias reference (.csv).
    #[arg(long)]
    municipalities: Option<PathBuf>,
    /// Folder the outputs are written to.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Override the UVT monetary unit.
    #[arg(long)]
    uvt: Option<u64>,
    /// Also write a Parquet copy of the output.
    #[arg(long)]
    parquet: bool,
    /// Never prompt on the terminal; a missing path aborts the run.
    #[arg(long)]
    no_prompt: bool,
}

fn main() -> ExitCode {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();
    info!("startup");

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // the pipeline has already notified the user
            if err
                .downcast_ref::<PipelineError>()
                .is_some_and(PipelineError::is_abort)
            {
                info!("aborted by user");
            } else {
                error!("run failed: {:#}", err);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    // ─── 2) configuration: file, then CLI overrides ─────────────────
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(uvt) = args.uvt {
        config.classification.uvt = uvt;
    }
    if args.parquet {
        config.export.parquet = true;
    }
    let pipeline = Pipeline::new(config)?;
    let cfg = pipeline.config();

    // ─── 3) collaborators ────────────────────────────────────────────
    let mut selector = PresetSelector {
        registry: args.registry.or_else(|| cfg.inputs.registry.path.clone()),
        sectors: args.sectors.or_else(|| cfg.inputs.sectors.path.clone()),
        municipalities: args
            .municipalities
            .or_else(|| cfg.inputs.municipalities.path.clone()),
        output_dir: args.output_dir.or_else(|| cfg.inputs.output_dir.clone()),
        fallback: if args.no_prompt {
            None
        } else {
            Some(Box::new(TerminalSelector::stdio()))
        },
    };
    let mut notifier = TerminalNotifier;

    // ─── 4) run ──────────────────────────────────────────────────────
    let report = pipeline.run(&mut selector, &mut notifier)?;
    for (tier, n) in &report.tier_counts {
        info!(tier = %tier, rows = n, "exported");
    }
    info!(
        columns = report.columns.len(),
        rows = report.exported_rows,
        "all done"
    );
    Ok(())
}
