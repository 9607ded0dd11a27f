use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use xlsplit_core::{
    plan_split, split_workbook_with_template, ProgressEvent, ShortTemplatePolicy, SplitOptions,
    Strategy,
};

mod render;

const CHUNK_SIZE_BOUNDS: (u32, u32) = (100, 999);
const HEADER_ROWS_BOUNDS: (u32, u32) = (1, 10);

#[derive(Parser)]
#[command(
    name = "xlsplit",
    version,
    about = "Split a large xlsx worksheet into smaller workbooks that repeat its header rows"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a zip of part workbooks, each holding the header rows plus up to
    /// `--chunk-size` data rows.
    Split(SplitArgs),
    /// Print the sheet's extents and the parts a split would produce.
    Plan(PlanArgs),
}

#[derive(Args)]
struct SelectionArgs {
    /// Maximum data rows per part (100-999).
    #[arg(long)]
    chunk_size: Option<u32>,
    /// Rows at the top of the sheet repeated in every part (1-10).
    #[arg(long)]
    header_rows: Option<u32>,
    /// Sheet to split; defaults to the sheet the workbook opens on.
    #[arg(long)]
    sheet: Option<String>,
}

#[derive(Args)]
struct SplitArgs {
    input: PathBuf,
    /// Archive to write; defaults to `<input stem>_split.zip` next to the input.
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[command(flatten)]
    selection: SelectionArgs,
    /// `template` trims a reloaded copy of the workbook per part (cost grows with parts x
    /// workbook size); `rebuild` writes each part from scratch, copying formatting.
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,
    /// Copy this many columns instead of the sheet's last used column (rebuild only).
    #[arg(long)]
    max_col: Option<u32>,
    /// Workbook to trim instead of the input (template strategy only).
    #[arg(long)]
    template: Option<PathBuf>,
    /// What to do when the template has fewer rows than a part needs.
    #[arg(long, value_enum)]
    on_short_template: Option<ShortTemplateArg>,
    /// JSON file with split options; flags given on the command line win.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Do not print progress.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Args)]
struct PlanArgs {
    input: PathBuf,
    #[command(flatten)]
    selection: SelectionArgs,
    /// Print the plan as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Template,
    Rebuild,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Template => Strategy::Template,
            StrategyArg::Rebuild => Strategy::Rebuild,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ShortTemplateArg {
    Error,
    Truncate,
}

impl From<ShortTemplateArg> for ShortTemplatePolicy {
    fn from(arg: ShortTemplateArg) -> Self {
        match arg {
            ShortTemplateArg::Error => ShortTemplatePolicy::Error,
            ShortTemplateArg::Truncate => ShortTemplatePolicy::Truncate,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Split(args) => cmd_split(args),
        Command::Plan(args) => cmd_plan(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: &Path) -> Result<SplitOptions> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

impl SelectionArgs {
    fn apply(&self, opts: &mut SplitOptions) {
        if let Some(n) = self.chunk_size {
            opts.chunk_size = n;
        }
        if let Some(n) = self.header_rows {
            opts.header_rows = n;
        }
        if let Some(name) = &self.sheet {
            opts.sheet_name = Some(name.clone());
        }
    }
}

/// The narrower bounds the command line offers on top of the library's own checks.
fn check_bounds(opts: &SplitOptions) -> Result<()> {
    let (lo, hi) = CHUNK_SIZE_BOUNDS;
    if !(lo..=hi).contains(&opts.chunk_size) {
        bail!("chunk size must be between {lo} and {hi}, got {}", opts.chunk_size);
    }
    let (lo, hi) = HEADER_ROWS_BOUNDS;
    if !(lo..=hi).contains(&opts.header_rows) {
        bail!("header rows must be between {lo} and {hi}, got {}", opts.header_rows);
    }
    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook".to_string());
    input.with_file_name(format!("{stem}_split.zip"))
}

fn cmd_split(args: SplitArgs) -> Result<()> {
    let mut opts = match &args.config {
        Some(path) => load_config(path)?,
        None => SplitOptions::default(),
    };
    args.selection.apply(&mut opts);
    if let Some(strategy) = args.strategy {
        opts.strategy = strategy.into();
    }
    if let Some(n) = args.max_col {
        opts.max_col_override = Some(n);
    }
    if let Some(policy) = args.on_short_template {
        opts.short_template = policy.into();
    }
    check_bounds(&opts)?;

    let source =
        fs::read(&args.input).with_context(|| format!("reading {}", args.input.display()))?;
    let template = match &args.template {
        Some(path) => Some(fs::read(path).with_context(|| format!("reading {}", path.display()))?),
        None => None,
    };
    let output = args.output.clone().unwrap_or_else(|| default_output(&args.input));
    log::info!("splitting {} into {}", args.input.display(), output.display());

    let mut stderr = std::io::stderr();
    let mut printed = false;
    let mut sink = |event: &ProgressEvent| {
        printed = true;
        let _ = write!(stderr, "\r{}", render::progress_line(event));
        let _ = stderr.flush();
    };
    let progress: Option<&mut dyn xlsplit_core::ProgressSink> =
        if args.quiet { None } else { Some(&mut sink) };
    let outcome = split_workbook_with_template(
        &source,
        template.as_deref().unwrap_or(source.as_slice()),
        &opts,
        progress,
    );
    if printed {
        eprintln!();
    }
    let outcome = outcome?;

    fs::write(&output, &outcome.archive)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("Done. Created {} files.", outcome.parts);
    Ok(())
}

fn cmd_plan(args: PlanArgs) -> Result<()> {
    let mut opts = SplitOptions::default();
    args.selection.apply(&mut opts);
    check_bounds(&opts)?;

    let bytes =
        fs::read(&args.input).with_context(|| format!("reading {}", args.input.display()))?;
    let plan = plan_split(&bytes, &opts)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", render::plan_text(&plan));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_sits_next_to_input() {
        assert_eq!(
            default_output(Path::new("/data/orders.xlsx")),
            PathBuf::from("/data/orders_split.zip")
        );
    }

    #[test]
    fn test_bounds() {
        let mut opts = SplitOptions::default();
        assert!(check_bounds(&opts).is_ok());
        opts.chunk_size = 99;
        assert!(check_bounds(&opts).is_err());
        opts.chunk_size = 100;
        opts.header_rows = 11;
        assert!(check_bounds(&opts).is_err());
    }
}
