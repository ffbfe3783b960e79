//! nuceos CLI

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nuceos_core::constants::mev_to_fm;
use nuceos_core::grid::{table_full, table_ye, GridSpec};
use nuceos_core::selection::{select_random, EosContext, ModelParameters};
use nuceos_core::virial::VirialCoefficients;
use nuceos_core::{EosError, EosModel, EosSettings, ModelTables, Rejection};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "nuceos")]
#[command(about = "Finite-temperature nuclear equation of state")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,

    /// Settings file (JSON); missing fields take their defaults.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Virial coefficient parameters (JSON), e.g. the output of `vir-fit`.
    #[arg(long, global = true)]
    virial: Option<PathBuf>,

    /// Use the polynomial neutron-star fit instead of half-integer powers.
    #[arg(long, global = true)]
    new_ns_fit: bool,

    /// Add muons to the lepton contribution.
    #[arg(long, global = true)]
    muons: bool,

    /// Skip the fixed-Ye sound-speed scan during selection.
    #[arg(long, global = true)]
    no_cs2_test: bool,

    /// Output file for results (pretty JSON). Defaults to stdout.
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TableArgs {
    /// Neutron-star EOS table (JSON)
    #[arg(long)]
    ns_table: PathBuf,

    /// Skyrme parameter table (JSON)
    #[arg(long)]
    skyrme_table: PathBuf,
}

#[derive(Args)]
struct ModelArgs {
    #[command(flatten)]
    tables: TableArgs,

    #[arg(long, default_value = "0")]
    i_ns: usize,

    #[arg(long, default_value = "0")]
    i_skyrme: usize,

    /// QMC exponent alpha
    #[arg(long, default_value = "0.49")]
    qmc_alpha: f64,

    /// QMC coefficient a (MeV)
    #[arg(long, default_value = "12.7")]
    qmc_a: f64,

    /// Symmetry energy slope L (MeV)
    #[arg(long, default_value = "50.0")]
    l: f64,

    /// Symmetry energy S (MeV)
    #[arg(long, default_value = "32.0")]
    s: f64,

    /// Squared sound speed at n_B = 2 fm^-3
    #[arg(long, default_value = "0.5")]
    phi: f64,
}

impl ModelArgs {
    fn parameters(&self) -> ModelParameters {
        ModelParameters {
            i_ns: self.i_ns,
            i_skyrme: self.i_skyrme,
            qmc_alpha: self.qmc_alpha,
            qmc_a: self.qmc_a,
            l: self.l,
            s: self.s,
            phi: self.phi,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Refit the virial coefficients to the reference data
    VirFit,

    /// Select a model and report its parameters and high-density branch
    Select {
        #[command(flatten)]
        model: ModelArgs,
    },

    /// Draw random parameter sets until one is accepted
    Random {
        #[command(flatten)]
        tables: TableArgs,

        #[arg(long, default_value = "1")]
        seed: u64,

        #[arg(long, default_value = "10000")]
        max_attempts: usize,
    },

    /// Evaluate one point (T in MeV)
    Point {
        #[command(flatten)]
        model: ModelArgs,

        #[arg(long)]
        nb: f64,

        #[arg(long)]
        ye: f64,

        #[arg(long)]
        t: f64,
    },

    /// Tabulate hadronic diagnostics over n_B x T at fixed Ye
    TableYe {
        #[command(flatten)]
        model: ModelArgs,

        #[arg(long)]
        ye: f64,

        /// Threads (0 = auto)
        #[arg(long, default_value = "0")]
        threads: usize,
    },

    /// Tabulate the full n_B x Ye x T grid
    TableFull {
        #[command(flatten)]
        model: ModelArgs,

        /// Threads (0 = auto)
        #[arg(long, default_value = "0")]
        threads: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    let settings = load_settings(&cli)?;
    let virial = load_virial(cli.virial.as_deref())?;
    let output = cli.output.as_deref();

    match &cli.command {
        Commands::VirFit => cmd_vir_fit(virial, &settings, output),
        Commands::Select { model } => cmd_select(model, &settings, &virial, output),
        Commands::Random {
            tables,
            seed,
            max_attempts,
        } => cmd_random(tables, *seed, *max_attempts, &settings, &virial, output),
        Commands::Point { model, nb, ye, t } => cmd_point(model, *nb, *ye, *t, &settings, &virial, output),
        Commands::TableYe { model, ye, threads } => {
            set_threads(*threads);
            let model = select(model, &settings, &virial)?;
            let table = table_ye(&model, *ye, &GridSpec::standard())?;
            write_json(output, &table)
        }
        Commands::TableFull { model, threads } => {
            set_threads(*threads);
            let model = select(model, &settings, &virial)?;
            let table = table_full(&model, &GridSpec::standard())?;
            write_json(output, &table)
        }
    }
}

fn load_settings(cli: &Cli) -> Result<EosSettings> {
    let mut settings = match &cli.settings {
        Some(path) => {
            let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))?
        }
        None => EosSettings::default(),
    };
    if cli.new_ns_fit {
        settings.old_ns_fit = false;
    }
    if cli.muons {
        settings.include_muons = true;
    }
    if cli.no_cs2_test {
        settings.select_cs2_test = false;
    }
    Ok(settings)
}

fn load_virial(path: Option<&Path>) -> Result<VirialCoefficients> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            Ok(serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))?)
        }
        None => Ok(VirialCoefficients::default()),
    }
}

fn set_threads(threads: usize) {
    if threads > 0 {
        // Best-effort; if a global pool already exists, keep going.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global();
    }
}

fn load_tables(args: &TableArgs) -> Result<ModelTables> {
    tracing::info!(ns = %args.ns_table.display(), skyrme = %args.skyrme_table.display(), "loading tables");
    Ok(ModelTables::load(&args.ns_table, &args.skyrme_table)?)
}

/// A negative sound speed found by the causality scan ends the run; any
/// other rejection is returned to the caller.
fn abort_on_causality(err: EosError) -> anyhow::Error {
    if let EosError::Rejected(rejection @ Rejection::Causality { .. }) = &err {
        tracing::error!(code = rejection.code(), "{rejection}; aborting");
    }
    err.into()
}

fn select(args: &ModelArgs, settings: &EosSettings, virial: &VirialCoefficients) -> Result<EosModel> {
    let tables = load_tables(&args.tables)?;
    let context = EosContext::Unselected
        .select(&args.parameters(), &tables, settings, virial)
        .map_err(abort_on_causality)?;
    Ok(context.model()?.clone())
}

#[derive(Serialize)]
struct VirFitOutput {
    report: nuceos_core::virial::VirialFitReport,
    coefficients: VirialCoefficients,
}

fn cmd_vir_fit(mut virial: VirialCoefficients, settings: &EosSettings, output: Option<&Path>) -> Result<()> {
    let report = virial.fit(settings.fit);
    if report.bn_chi2.is_none() || report.bpn_chi2.is_none() {
        tracing::warn!("virial fit incomplete; unconverged coefficients kept their previous values");
    }
    write_json(
        output,
        &VirFitOutput {
            report,
            coefficients: virial,
        },
    )
}

#[derive(Serialize)]
struct SelectOutput {
    accepted: bool,
    code: Option<i32>,
    reason: Option<String>,
    params: ModelParameters,
    neutron_star: Option<nuceos_core::neutron_star::NeutronStarEos>,
}

fn cmd_select(
    args: &ModelArgs,
    settings: &EosSettings,
    virial: &VirialCoefficients,
    output: Option<&Path>,
) -> Result<()> {
    let tables = load_tables(&args.tables)?;
    let params = args.parameters();
    let result = match EosContext::Unselected.select(&params, &tables, settings, virial) {
        Ok(context) => SelectOutput {
            accepted: true,
            code: None,
            reason: None,
            params,
            neutron_star: Some(context.model()?.neutron_star.clone()),
        },
        Err(EosError::Rejected(rejection)) if !matches!(rejection, Rejection::Causality { .. }) => SelectOutput {
            accepted: false,
            code: Some(rejection.code()),
            reason: Some(rejection.to_string()),
            params,
            neutron_star: None,
        },
        Err(err) => return Err(abort_on_causality(err)),
    };
    write_json(output, &result)
}

#[derive(Serialize)]
struct RandomOutput {
    attempts: usize,
    params: ModelParameters,
}

fn cmd_random(
    args: &TableArgs,
    seed: u64,
    max_attempts: usize,
    settings: &EosSettings,
    virial: &VirialCoefficients,
    output: Option<&Path>,
) -> Result<()> {
    let tables = load_tables(args)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let (model, attempts) =
        select_random(&mut rng, &tables, settings, virial, max_attempts).map_err(abort_on_causality)?;
    write_json(
        output,
        &RandomOutput {
            attempts,
            params: model.params,
        },
    )
}

#[derive(Serialize)]
struct PointOutput {
    nb: f64,
    ye: f64,
    t_mev: f64,
    point: nuceos_core::PointResult,
    cs2: f64,
    cs2_fix_ye: f64,
}

fn cmd_point(
    args: &ModelArgs,
    nb: f64,
    ye: f64,
    t_mev: f64,
    settings: &EosSettings,
    virial: &VirialCoefficients,
    output: Option<&Path>,
) -> Result<()> {
    let model = select(args, settings, virial)?;
    let point = model.evaluate_point(nb, ye, t_mev)?;
    let (nn, np, t) = (nb * (1.0 - ye), nb * ye, mev_to_fm(t_mev));
    write_json(
        output,
        &PointOutput {
            nb,
            ye,
            t_mev,
            point,
            cs2: model.cs2(nn, np, t)?,
            cs2_fix_ye: model.cs2_fix_ye(nn, np, t)?,
        },
    )
}

fn write_json<T: Serialize>(output: Option<&Path>, value: &T) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}
