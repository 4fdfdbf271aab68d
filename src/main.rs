use anyhow::{Context, Result, bail};
use authenticity_irt::{
    inference::{CancelToken, JackknifeReport, LoocvOptions, cooks_from_report, run_loocv},
    io::{
        read_loocv, read_observations, read_toml, write_cooks, write_fit_summary, write_loocv,
        write_matrix, write_observations, write_persons,
    },
    irt::{
        IrtData, JointFit, JointModel, JointOptions, SimulationConfig, flip_responses, simulate,
    },
};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::info;
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Parser, Debug)]
#[command(name = "authenticity-irt")]
#[command(about = "Joint 2D graded-response IRT with authenticity weights", long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a synthetic observation CSV.
    Simulate(SimulateArgs),
    /// Joint fit: fit.toml and persons.csv.
    Fit(FitArgs),
    /// Full fit, leave-one-out sweep and Cook's distance.
    Loocv(LoocvArgs),
    /// Cook's distance from an existing loocv.csv.
    Cooks(CooksArgs),
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Simulation TOML; omitted fields keep their defaults.
    #[arg(long = "config")]
    config: Option<PathBuf>,
    #[arg(long = "persons")]
    n_persons: Option<usize>,
    #[arg(long = "items")]
    n_items: Option<usize>,
    #[arg(long = "seed")]
    seed: Option<u64>,
    /// 1-based persons whose responses are reversed.
    #[arg(long = "flip", value_delimiter = ',')]
    flip: Vec<usize>,
    #[arg(long = "out")]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Observation CSV.
    data: PathBuf,
    /// Model TOML; omitted fields keep their defaults.
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct FitArgs {
    #[command(flatten)]
    model: ModelArgs,
    #[arg(long = "out-dir", default_value = ".")]
    out_dir: PathBuf,
}

#[derive(Args, Debug)]
struct LoocvArgs {
    #[command(flatten)]
    model: ModelArgs,
    #[arg(long = "out-dir", default_value = ".")]
    out_dir: PathBuf,
    /// Dedicated worker threads; the global pool is used when omitted.
    #[arg(long = "threads")]
    threads: Option<usize>,
    /// Also compute holdout standard errors.
    #[arg(long = "standard-errors", default_value_t = false)]
    standard_errors: bool,
}

#[derive(Args, Debug)]
struct CooksArgs {
    /// LOOCV CSV written by `loocv`.
    loocv: PathBuf,
    #[arg(long = "out-dir", default_value = ".")]
    out_dir: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match cli.command {
        Command::Simulate(args) => run_simulate(args),
        Command::Fit(args) => run_fit(args),
        Command::Loocv(args) => run_loocv_cmd(args),
        Command::Cooks(args) => run_cooks(args),
    }
}

fn run_simulate(args: SimulateArgs) -> Result<()> {
    let mut cfg: SimulationConfig = match &args.config {
        Some(path) => read_toml(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(n) = args.n_persons {
        cfg.n_persons = n;
    }
    if let Some(j) = args.n_items {
        cfg.n_items = j;
    }
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }

    let sim = simulate(&cfg).context("simulation failed")?;
    let data = if args.flip.is_empty() {
        sim.data
    } else {
        let mut persons = Vec::with_capacity(args.flip.len());
        for &p in &args.flip {
            if p == 0 || p > cfg.n_persons {
                bail!("--flip person {p} is outside 1..={}", cfg.n_persons);
            }
            persons.push(p - 1);
        }
        flip_responses(&sim.data, &persons).context("flipping responses failed")?
    };
    write_observations(&args.out, &data)?;
    info!(
        "Wrote {} observations ({} persons, {} items) to {}",
        data.n_obs(),
        data.n_persons(),
        data.n_items(),
        args.out.display()
    );
    Ok(())
}

fn run_fit(args: FitArgs) -> Result<()> {
    let (data, options) = load_model_inputs(&args.model)?;
    let fit = fit_full(&data, &options)?;
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;
    write_fit_outputs(&args.out_dir, &fit)
}

fn run_loocv_cmd(args: LoocvArgs) -> Result<()> {
    let (data, options) = load_model_inputs(&args.model)?;
    let fit = fit_full(&data, &options)?;
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;
    write_fit_outputs(&args.out_dir, &fit)?;

    let loocv = LoocvOptions { threads: args.threads, standard_errors: args.standard_errors };
    let report = run_loocv(&data, &options, &fit, &loocv, &CancelToken::new())
        .context("LOOCV sweep failed")?;
    let loocv_path = args.out_dir.join("loocv.csv");
    // A fresh sweep replaces any earlier file instead of appending to it.
    if loocv_path.exists() {
        fs::remove_file(&loocv_path)
            .with_context(|| format!("failed to replace {}", loocv_path.display()))?;
    }
    write_loocv(&loocv_path, &report)?;
    info!("Wrote {} LOOCV records to {}", report.records.len(), loocv_path.display());

    let jackknife = cooks_from_report(&report).context("Cook's distance failed")?;
    write_jackknife_outputs(&args.out_dir, &jackknife)
}

fn run_cooks(args: CooksArgs) -> Result<()> {
    let report = read_loocv(&args.loocv)?;
    let jackknife = cooks_from_report(&report).context("Cook's distance failed")?;
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;
    write_jackknife_outputs(&args.out_dir, &jackknife)
}

fn load_model_inputs(args: &ModelArgs) -> Result<(IrtData, JointOptions)> {
    let data = read_observations(&args.data)?;
    let options: JointOptions = match &args.config {
        Some(path) => read_toml(path)?,
        None => JointOptions::default(),
    };
    options.validate().context("invalid model configuration")?;
    info!(
        "Loaded {} observations ({} persons, {} items) from {}",
        data.n_obs(),
        data.n_persons(),
        data.n_items(),
        args.data.display()
    );
    Ok((data, options))
}

fn fit_full(data: &IrtData, options: &JointOptions) -> Result<JointFit> {
    let mut model = JointModel::new(data, options.clone()).context("invalid model setup")?;
    model.fit_default(data).context("joint fit failed")?;
    Ok(model.into_fit()?)
}

fn write_fit_outputs(out_dir: &Path, fit: &JointFit) -> Result<()> {
    write_fit_summary(&out_dir.join("fit.toml"), fit)?;
    write_persons(&out_dir.join("persons.csv"), &fit.persons)?;
    info!("Wrote fit.toml and persons.csv to {}", out_dir.display());
    Ok(())
}

fn write_jackknife_outputs(out_dir: &Path, jackknife: &JackknifeReport) -> Result<()> {
    write_cooks(&out_dir.join("cooks_d.csv"), jackknife)?;
    write_matrix(&out_dir.join("jackknife_hessian.csv"), &jackknife.hessian)?;
    info!(
        "Wrote cooks_d.csv and jackknife_hessian.csv to {} ({} records, p = {})",
        out_dir.display(),
        jackknife.records.len(),
        jackknife.p
    );
    Ok(())
}
