//! The command line interface for the program.
use crate::cee::prime::{ProjectCeeSummary, calculate_project_cee};
use crate::input::{load_project, load_site};
use crate::log;
use crate::output::{create_output_directory, write_project_summary, write_rentability};
use crate::rentability::{RentabilityResult, calculate_rentability};
use crate::settings::Settings;
use ::log::{info, warn};
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use itertools::Itertools;
use std::path::{Path, PathBuf};

pub mod settings;
use settings::SettingsSubcommands;

/// The command line interface for the program.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
    /// Flag to provide the CLI docs as markdown
    #[arg(long, hide = true)]
    markdown_help: bool,
}

/// Options for commands which write results
#[derive(Args, Default)]
pub struct OutputOpts {
    /// Directory for output files (nothing is written if omitted)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Calculate the CEE prime of a project.
    Prime {
        /// Path to the project file.
        project_file: PathBuf,
        /// Output options
        #[command(flatten)]
        opts: OutputOpts,
    },
    /// Calculate the rentability of a site.
    Rentability {
        /// Path to the site file.
        site_file: PathBuf,
        /// Project file whose CEE prime is used when the site has no subsidy of its own.
        #[arg(short, long)]
        project: Option<PathBuf>,
        /// Output options
        #[command(flatten)]
        opts: OutputOpts,
    },
    /// Manage program settings.
    Settings {
        /// The available subcommands for managing settings.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Prime { project_file, opts } => {
                handle_prime_command(&project_file, &opts, None).map(|_| ())
            }
            Self::Rentability {
                site_file,
                project,
                opts,
            } => handle_rentability_command(&site_file, project.as_deref(), &opts, None)
                .map(|_| ()),
            Self::Settings { subcommand } => subcommand.execute(),
        }
    }
}

/// Parse CLI arguments and run the requested command
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Invoked as: `$ primecee --markdown-help`
    if cli.markdown_help {
        clap_markdown::print_help_markdown::<Cli>();
        return Ok(());
    }

    let Some(command) = cli.command else {
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Load settings, unless provided by the caller
fn load_settings(settings: Option<Settings>) -> Result<Settings> {
    match settings {
        Some(settings) => Ok(settings),
        None => Settings::load().context("Failed to load settings."),
    }
}

/// Create the output folder, if any, and initialise the logger.
///
/// A log file is written to the output folder when there is one.
fn prepare_output(opts: &OutputOpts, settings: &Settings) -> Result<Option<PathBuf>> {
    let Some(output_dir) = opts.output_dir.as_deref() else {
        log::init(&settings.log_level, None).context("Failed to initialise logging.")?;
        return Ok(None);
    };

    let overwrite = create_output_directory(output_dir, opts.overwrite || settings.overwrite)
        .with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_dir.display()
            )
        })?;
    log::init(&settings.log_level, Some(output_dir)).context("Failed to initialise logging.")?;

    // NB: We have to wait until the logger is initialised to display this warning
    if overwrite {
        warn!("Output folder will be overwritten");
    }
    info!("Output folder: {}", output_dir.display());

    Ok(Some(output_dir.to_path_buf()))
}

/// Report problems with individual products which don't prevent the calculation
fn log_summary_warnings(summary: &ProjectCeeSummary) {
    for product in summary.unresolved_multipliers() {
        warn!(
            "No quantity found for product {} ({}): it is valued at zero",
            product.product_id, product.product_name
        );
    }

    for product in summary.failed_expressions() {
        warn!(
            "Custom expression for product {} could not be evaluated: it is valued at zero",
            product.product_id
        );
    }

    if summary.has_missing_kwh_cumac {
        warn!("Some products have no kWh cumac value for this building type and were left out");
    }

    if !summary.skipped.is_empty() {
        info!(
            "Products left out of the totals: {}",
            summary
                .skipped
                .iter()
                .map(|skipped| format!(
                    "{} ({})",
                    skipped
                        .product_id
                        .as_ref()
                        .map_or("no product", |id| &*id.0),
                    skipped.reason
                ))
                .join(", ")
        );
    }
}

/// Handle the `prime` command.
pub fn handle_prime_command(
    project_path: &Path,
    opts: &OutputOpts,
    settings: Option<Settings>,
) -> Result<ProjectCeeSummary> {
    let settings = load_settings(settings)?;
    let output_dir = prepare_output(opts, &settings)?;

    let (project, catalog, parameters) =
        load_project(project_path).context("Failed to load project.")?;
    info!("Loaded project from {}", project_path.display());

    let summary = calculate_project_cee(&project, &catalog, &parameters);
    log_summary_warnings(&summary);
    info!(
        "Total prime: {:.2} € ({:.2} MWh cumac)",
        summary.totals.total_prime.0, summary.totals.total_valorisation_mwh.0
    );

    if let Some(output_dir) = output_dir {
        write_project_summary(&output_dir, &summary)?;
    }

    Ok(summary)
}

/// Handle the `rentability` command.
///
/// If `project_path` is given, the project's CEE prime is used as the subsidy when the site
/// doesn't record one.
pub fn handle_rentability_command(
    site_path: &Path,
    project_path: Option<&Path>,
    opts: &OutputOpts,
    settings: Option<Settings>,
) -> Result<RentabilityResult> {
    let settings = load_settings(settings)?;
    let output_dir = prepare_output(opts, &settings)?;

    let (site, parameters) = load_site(site_path).context("Failed to load site.")?;
    info!("Loaded site from {}", site_path.display());

    let fallback_subsidy = match project_path {
        Some(project_path) => {
            let (project, catalog, project_parameters) =
                load_project(project_path).context("Failed to load project.")?;
            let summary = calculate_project_cee(&project, &catalog, &project_parameters);
            log_summary_warnings(&summary);
            Some(summary.totals.total_prime)
        }
        None => None,
    };

    let input = site.to_rentability_input(fallback_subsidy, &parameters);
    let result = calculate_rentability(&input, parameters.zero_tolerance);
    if !result.subcontractor_included && result.subcontractor_estimate.is_positive() {
        info!(
            "Subcontractor payment not confirmed: estimated cost of {:.2} € left out",
            result.subcontractor_estimate.0
        );
    }
    info!(
        "CA: {:.2} €, costs: {:.2} €, margin: {:.2} € ({:.1} %, {:.2} €/{})",
        result.ca.0,
        result.total_costs.0,
        result.margin_total.0,
        result.margin_rate.0 * 100.0,
        result.margin_per_unit.0,
        result.unit_label
    );

    if let Some(output_dir) = output_dir {
        write_rentability(&output_dir, input.travaux_option, &result)?;
    }

    Ok(result)
}
