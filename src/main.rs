use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use facility_stars::config::AppConfig;
use facility_stars::dataset::{self, AdjustmentFactorImporter, FacilityTableImporter};
use facility_stars::error::AppError;
use facility_stars::rating::{
    self, calculate_adjusted_measures, CalibrationReport, CurrentPeriodOptions,
    CurrentPeriodReport, MomentSource, RatingMethodology, StarCutoffs, StarThresholds,
};
use facility_stars::telemetry;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "Facility Star Ratings",
    about = "Calibrate baseline star-rating parameters and score later evaluation periods",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score the baseline population and freeze winsorization parameters
    Calibrate(CalibrateArgs),
    /// Score a later period against previously frozen parameters
    Apply(ApplyArgs),
    /// Print the effective methodology as JSON
    Methodology(MethodologyArgs),
}

#[derive(Args, Debug)]
struct MethodologyOverride {
    /// Methodology JSON file (defaults to the standard ten-measure layout)
    #[arg(long)]
    methodology: Option<PathBuf>,
    /// Certification date after which low-volume measures are excluded (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    recency_cutoff: Option<NaiveDate>,
}

#[derive(Args, Debug)]
struct CalibrateArgs {
    /// Baseline facility CSV
    #[arg(long)]
    input: PathBuf,
    /// Where to write the frozen parameter set (JSON)
    #[arg(long)]
    parameters_out: PathBuf,
    /// Optional per-facility score CSV
    #[arg(long)]
    scores_out: Option<PathBuf>,
    #[command(flatten)]
    methodology: MethodologyOverride,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MomentsArg {
    Baseline,
    Current,
}

impl From<MomentsArg> for MomentSource {
    fn from(value: MomentsArg) -> Self {
        match value {
            MomentsArg::Baseline => MomentSource::Baseline,
            MomentsArg::Current => MomentSource::CurrentPeriod,
        }
    }
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Current-period facility CSV
    #[arg(long)]
    input: PathBuf,
    /// Frozen parameter set produced by `calibrate`
    #[arg(long)]
    parameters: PathBuf,
    /// Moments used for the first z-score of winsorized measures
    #[arg(long, value_enum, default_value = "baseline")]
    moments: MomentsArg,
    /// Score measures whose baseline winsorization did not converge
    #[arg(long)]
    allow_unconverged: bool,
    /// Optional per-facility score CSV
    #[arg(long)]
    scores_out: Option<PathBuf>,
    /// Optional long-format re-standardization CSV
    #[arg(long)]
    restandardized_out: Option<PathBuf>,
    /// Adjustment factor CSV (`provfs,factor_<measure>`)
    #[arg(long, requires = "adjusted_out")]
    factors: Option<PathBuf>,
    /// Where to write adjusted measures
    #[arg(long, requires = "factors")]
    adjusted_out: Option<PathBuf>,
    #[command(flatten)]
    methodology: MethodologyOverride,
}

#[derive(Args, Debug)]
struct MethodologyArgs {
    /// Write to a file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
    #[command(flatten)]
    methodology: MethodologyOverride,
}

fn main() {
    if let Err(err) = run_cli() {
        eprintln!("application error: {err}");
        std::process::exit(err.exit_code());
    }
}

fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    match cli.command {
        Command::Calibrate(args) => {
            let methodology = load_methodology(&config, &args.methodology)?;
            run_calibrate(args, &methodology)
        }
        Command::Apply(args) => {
            let methodology = load_methodology(&config, &args.methodology)?;
            run_apply(args, &methodology)
        }
        Command::Methodology(args) => {
            let methodology = load_methodology(&config, &args.methodology)?;
            match args.output {
                Some(path) => {
                    let mut writer = create(&path)?;
                    dataset::write_methodology(&mut writer, &methodology)?;
                    writer.flush()?;
                }
                None => dataset::write_methodology(std::io::stdout().lock(), &methodology)?,
            }
            Ok(())
        }
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// File methodology, then environment overrides, then command-line flags.
fn load_methodology(
    config: &AppConfig,
    overrides: &MethodologyOverride,
) -> Result<RatingMethodology, AppError> {
    let mut methodology = match &overrides.methodology {
        Some(path) => dataset::read_methodology(path)?,
        None => RatingMethodology::standard(),
    };
    config.rating.apply(&mut methodology);
    if let Some(cutoff) = overrides.recency_cutoff {
        methodology.availability.recency_cutoff = Some(cutoff);
    }
    methodology.validate()?;
    Ok(methodology)
}

fn create(path: &Path) -> Result<BufWriter<File>, AppError> {
    Ok(BufWriter::new(File::create(path)?))
}

fn run_calibrate(args: CalibrateArgs, methodology: &RatingMethodology) -> Result<(), AppError> {
    let table = FacilityTableImporter::from_path(&args.input, methodology)?;
    info!(facilities = table.len(), input = %args.input.display(), "baseline loaded");

    let report = rating::calibrate(&table, methodology)?;
    dataset::write_parameters(&args.parameters_out, &report.parameters)?;

    if let Some(path) = &args.scores_out {
        let mut writer = create(path)?;
        dataset::write_scored_facilities(
            &mut writer,
            &report.facilities,
            methodology,
            Some(&report.cutoffs),
        )?;
        writer.flush()?;
    }

    render_calibration(&report);
    Ok(())
}

fn run_apply(args: ApplyArgs, methodology: &RatingMethodology) -> Result<(), AppError> {
    let table = FacilityTableImporter::from_path(&args.input, methodology)?;
    let parameters = dataset::read_parameters(&args.parameters)?;
    info!(
        facilities = table.len(),
        frozen_measures = parameters.measures.len(),
        "current period loaded"
    );

    let options = CurrentPeriodOptions {
        moments: args.moments.into(),
        allow_unconverged: args.allow_unconverged,
    };
    let report = rating::score_current_period(&table, methodology, &parameters, options)?;

    if let Some(path) = &args.scores_out {
        let mut writer = create(path)?;
        dataset::write_scored_facilities(
            &mut writer,
            &report.facilities,
            methodology,
            report.cutoffs.as_ref(),
        )?;
        writer.flush()?;
    }

    if let Some(path) = &args.restandardized_out {
        let mut writer = create(path)?;
        dataset::write_restandardized(&mut writer, &report.restandardized)?;
        writer.flush()?;
    }

    if let (Some(factors_path), Some(adjusted_path)) = (&args.factors, &args.adjusted_out) {
        let factors =
            AdjustmentFactorImporter::from_path(factors_path, &methodology.adjusted_measures)?;
        let current = report.standardized_measures(&methodology.adjusted_measures);
        let adjusted =
            calculate_adjusted_measures(&factors, &current, &methodology.adjusted_measures);
        let mut writer = create(adjusted_path)?;
        dataset::write_adjusted(&mut writer, &adjusted)?;
        writer.flush()?;
        info!(rows = adjusted.len(), "adjusted measures written");
    }

    render_current_period(&report);
    Ok(())
}

fn render_calibration(report: &CalibrationReport) {
    println!("Baseline calibration");
    println!("Facilities scored: {}", report.facilities.len());

    println!("\nFrozen measures");
    for (measure, frozen) in &report.parameters.measures {
        let state = if frozen.converged {
            "converged"
        } else {
            "NOT converged"
        };
        println!(
            "- {}: {} after {} iterations, limits [{:.3}, {:.3}]",
            measure, state, frozen.iterations, frozen.lower_limit, frozen.upper_limit
        );
    }

    if report.failures.is_empty() {
        println!("\nMeasure failures: none");
    } else {
        println!("\nMeasure failures");
        for failure in &report.failures {
            println!("- {}: {}", failure.measure, failure.error);
        }
    }

    render_stars(Some(&report.thresholds), Some(&report.cutoffs));
}

fn render_current_period(report: &CurrentPeriodReport) {
    println!("Current period scoring");
    println!("Facilities scored: {}", report.facilities.len());

    if report.skipped.is_empty() {
        println!("\nSkipped rows: none");
    } else {
        println!("\nSkipped rows");
        for skipped in &report.skipped {
            let provfs = skipped
                .provfs
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "*".to_string());
            let measure = skipped.measure.as_deref().unwrap_or("*");
            println!("- {} / {}: {}", provfs, measure, skipped.reason.summary());
        }
    }

    if let Some(error) = &report.star_error {
        println!("\nStar ranks unavailable: {error}");
    }
    render_stars(report.thresholds.as_ref(), report.cutoffs.as_ref());
}

fn render_stars(thresholds: Option<&StarThresholds>, cutoffs: Option<&StarCutoffs>) {
    if let Some(thresholds) = thresholds {
        println!("\nRank thresholds");
        for (idx, value) in thresholds.values.iter().enumerate() {
            println!("- rank {} up to {:.4}", idx + 1, value);
        }
    }
    if let Some(cutoffs) = cutoffs {
        println!("\nStar cutoffs");
        for (idx, value) in cutoffs.boundaries.iter().enumerate() {
            println!("- {} / {} stars: {:.4}", idx + 1, idx + 2, value);
        }
    }
}
