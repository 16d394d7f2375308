use std::{
    fs::File,
    io::{BufWriter, Write},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use llcflush_bin::allocator::{AllocStrategy, HugepageSizeArg, allocate};
use llcflush_bin::init_logging_with_progress;
use llcflush_core::memory::{BytePointer, COLOR_MASK, GetConsecPfns, PageLayout, Region};
use llcflush_core::sink::DiagnosticWriter;
use llcflush_core::util::{CL_SIZE, LLC_SIZE, Size, pin_to_core};
use llcflush_core::{LineTiming, Sweep, SweepConfig, SweepReport, VerifyMode};
use log::{error, info, warn};
use serde::Serialize;

/// Exit status when the region cannot be allocated.
const ALLOC_FAILURE: u8 = 1;

/// Largest region in MB whose length, rounded up to 1 GB pages, still fits a mapping.
const MAX_SIZE_MB: u64 = (isize::MAX as u64) >> 20;

/// CLI arguments for the `llc-flush` binary.
#[derive(Debug, Parser, Serialize, Clone)]
#[command(about = "Evict a last-level-cache sized region from the cache hierarchy, line by line")]
struct CliArgs {
    /// Time a read before and after each flush and print one line per cache line.
    #[clap(long = "verify")]
    verify: bool,
    /// The region size in MB.
    #[clap(long = "size-mb", default_value_t = (LLC_SIZE.bytes() >> 20) as u64,
           value_parser = clap::value_parser!(u64).range(1..=MAX_SIZE_MB))]
    size_mb: u64,
    /// The sweep stride in bytes (power of two, at least 8).
    #[clap(long = "line-size", default_value_t = CL_SIZE, value_parser = parse_line_size)]
    line_size: usize,
    /// The allocation strategy to use.
    #[clap(long = "alloc-strategy", value_enum, default_value = "hugetlb")]
    alloc_strategy: AllocStrategy,
    /// The huge page size for the hugetlb strategy.
    #[clap(long = "hugepage-size", value_enum, default_value = "default")]
    hugepage_size: HugepageSizeArg,
    /// Pin the run to this logical core.
    #[clap(long = "core")]
    core: Option<usize>,
    /// Log the physical ranges, page colors and LLC slices of the region (requires root).
    #[clap(long = "layout")]
    layout: bool,
    /// Output file for the run record (JSON format).
    #[clap(long = "output")]
    output: Option<String>,
    /// Show a progress bar during the sweep.
    #[clap(long = "progress")]
    progress: bool,
}

fn parse_line_size(s: &str) -> std::result::Result<usize, String> {
    let line_size = s.parse::<usize>().map_err(|e| e.to_string())?;
    SweepConfig::new(line_size, VerifyMode::Off).map_err(|e| e.to_string())?;
    Ok(line_size)
}

#[derive(Serialize)]
struct RunRecord<'a> {
    date: String,
    args: &'a CliArgs,
    config: SweepConfig,
    base: usize,
    region_bytes: usize,
    mapped_bytes: usize,
    report: SweepReport,
    timings: &'a [LineTiming],
}

impl RunRecord<'_> {
    fn save_to_file(&self, filename: &str) -> Result<()> {
        let file = File::create(filename)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        info!("Results saved to {}", filename);
        Ok(())
    }
}

fn sweep_bar(lines: usize) -> ProgressBar {
    let style = ProgressStyle::with_template(
        "Sweeping {wide_bar:40.cyan/blue} {pos:>7}/{len:7} lines [{elapsed_precise}]",
    )
    .unwrap_or(ProgressStyle::default_bar());
    ProgressBar::new(lines as u64).with_style(style)
}

fn run(
    args: &CliArgs,
    config: SweepConfig,
    region: &Region,
    progress: &MultiProgress,
) -> Result<()> {
    if args.layout {
        region.log_pfns(log::Level::Info);
        match PageLayout::of(region, COLOR_MASK) {
            Ok(layout) => layout.log(log::Level::Info),
            Err(e) => warn!("Failed to resolve page layout: {}", e),
        }
    }

    let mut sweep = Sweep::new(config);
    if args.progress {
        sweep = sweep.with_progress(progress.add(sweep_bar(config.lines(region.len()))));
    }

    let mut diagnostics = DiagnosticWriter::new(BufWriter::new(std::io::stdout().lock()));
    let mut timings = Vec::new();
    let report = if args.output.is_some() {
        sweep.run(region, &mut (&mut diagnostics, &mut timings))
    } else {
        sweep.run(region, &mut diagnostics)
    };
    let written = diagnostics
        .finish()
        .context("Failed to write diagnostic output")?;
    info!(
        "Swept {} lines ({} bytes) in {:.2?}, {} diagnostic lines",
        report.lines, report.bytes, report.elapsed, written
    );

    if let Some(output) = &args.output {
        RunRecord {
            date: chrono::Local::now().to_rfc3339(),
            args,
            config,
            base: region.ptr() as usize,
            region_bytes: region.len(),
            mapped_bytes: region.mapped_len(),
            report,
            timings: &timings,
        }
        .save_to_file(output)
        .with_context(|| format!("Failed to save results to {}", output))?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    let progress = match init_logging_with_progress() {
        Ok(progress) => progress,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:?}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("CLI args: {:?}", args);

    let config = match SweepConfig::new(args.line_size, args.verify.into()) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid sweep configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(core) = args.core
        && let Err(e) = pin_to_core(core)
    {
        error!("Failed to pin to core {}: {}", core, e);
        return ExitCode::FAILURE;
    }

    let size = Size::MB(args.size_mb as usize);
    let region = match allocate(args.alloc_strategy, args.hugepage_size, size) {
        Ok(region) => region,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(ALLOC_FAILURE);
        }
    };

    match run(&args, config, &region, &progress) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:?}", e);
            ExitCode::FAILURE
        }
    }
}
