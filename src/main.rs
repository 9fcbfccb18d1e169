use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, CommandFactory, ErrorKind, Parser, Subcommand};

use foote::segment::{self, FeatureKind, ThresholdPolicy};
use foote::track;

#[derive(clap::ValueEnum, Clone, Debug)]
enum Threshold {
    None,
    Max,
    Mad,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum Kind {
    All,
    Chroma,
    Timbral,
}

impl Kind {
    fn kinds(&self) -> Vec<FeatureKind> {
        match self {
            Kind::All => FeatureKind::ALL.to_vec(),
            Kind::Chroma => vec![FeatureKind::Chroma],
            Kind::Timbral => vec![FeatureKind::Timbral],
        }
    }
}

fn parse_smoothing(s: &str) -> Result<(usize, usize), String> {
    let (window, factor) = s
        .split_once(':')
        .ok_or_else(|| format!("expected WINDOW:FACTOR, got '{}'", s))?;
    let window = window
        .parse()
        .map_err(|e| format!("invalid window length '{}': {}", window, e))?;
    let factor = factor
        .parse()
        .map_err(|e| format!("invalid downsample factor '{}': {}", factor, e))?;
    Ok((window, factor))
}

#[derive(Debug, clap::Args)]
struct GridArgs {
    #[clap(
        long = "half-width",
        value_parser = clap::value_parser!(usize),
        help = "Kernel half-width in frames. May be repeated. Defaults to 20, 30, 40 and 50."
    )]
    half_widths: Vec<usize>,

    #[clap(
        long = "smoothing",
        value_parser = parse_smoothing,
        help = "Smoothing window length and downsample factor as WINDOW:FACTOR. May be repeated. Defaults to 9:2, 9:4 and 21:5."
    )]
    smoothing_params: Vec<(usize, usize)>,

    #[clap(long, value_enum, default_value = "all", help = "Feature kinds to analyze.")]
    kind: Kind,

    #[clap(
        long,
        default_value_t = segment::DEFAULT_FEATURE_RATE,
        value_parser = clap::value_parser!(f64),
        help = "Frame rate of the raw feature sequences, in frames per second."
    )]
    feature_rate: f64,

    #[clap(
        long,
        default_value_t = segment::DEFAULT_MIN_DISTANCE,
        value_parser = clap::value_parser!(usize),
        help = "Minimum distance between two boundaries, in (downsampled) frames."
    )]
    min_distance: usize,

    #[clap(
        long,
        value_enum,
        default_value = "mad",
        help = "Peak threshold policy. 'mad' uses median + value * MAD, 'max' uses value * maximum and 'none' keeps every local maximum."
    )]
    threshold: Threshold,

    #[clap(
        long,
        default_value_t = segment::DEFAULT_MAD_MULTIPLIER,
        value_parser = clap::value_parser!(f64),
        help = "Parameter of the peak threshold policy."
    )]
    threshold_value: f64,

    #[clap(
        long,
        default_value = "false",
        action(ArgAction::SetTrue),
        help = "Re-analyze all tracks and ignore any existing analysis data on disk."
    )]
    force: bool,
}

impl GridArgs {
    fn threshold_policy(&self) -> ThresholdPolicy {
        match self.threshold {
            Threshold::None => ThresholdPolicy::None,
            Threshold::Max => ThresholdPolicy::FractionOfMax(self.threshold_value),
            Threshold::Mad => ThresholdPolicy::MedianMad {
                multiplier: self.threshold_value,
            },
        }
    }

    fn analyzer(&self, paths: Vec<PathBuf>) -> track::Analyzer<PathBuf> {
        let mut analyzer = track::Analyzer::from_files(paths, self.force)
            .with_kinds(self.kind.kinds())
            .with_feature_rate(self.feature_rate)
            .with_min_distance(self.min_distance)
            .with_threshold_policy(self.threshold_policy());
        if !self.half_widths.is_empty() {
            analyzer = analyzer.with_half_widths(self.half_widths.clone());
        }
        if !self.smoothing_params.is_empty() {
            analyzer = analyzer.with_smoothing_params(self.smoothing_params.clone());
        }
        analyzer
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[clap(
        arg_required_else_help = true,
        after_help = "Segment one or more feature files over a grid of kernel sizes and smoothing parameters. The results are written to disk alongside each feature file, and are used by the 'evaluate' command."
    )]
    Analyze {
        #[clap(
            required = true,
            multiple_values = true,
            value_parser = clap::value_parser!(PathBuf),
            help = "Feature files or directories to analyze."
        )]
        paths: Vec<PathBuf>,

        #[clap(flatten)]
        grid: GridArgs,

        #[clap(
            long,
            default_value = "false",
            action(ArgAction::SetTrue),
            help = "Do not display detected boundaries in stdout."
        )]
        no_display: bool,
    },

    #[clap(
        arg_required_else_help = true,
        after_help = "Evaluate detected boundaries against reference annotations. Analysis data can either be pre-computed using the 'analyze' command, or generated as part of the evaluation by specifying the --analyze flag."
    )]
    Evaluate {
        #[clap(
            required = true,
            multiple_values = true,
            value_parser = clap::value_parser!(PathBuf),
            help = "Feature files or directories to evaluate."
        )]
        paths: Vec<PathBuf>,

        #[clap(
            long,
            value_parser = clap::value_parser!(PathBuf),
            help = "Directory containing one '<track name>.json' reference file per track."
        )]
        annotations: PathBuf,

        #[clap(
            long = "window",
            value_parser = clap::value_parser!(f64),
            help = "Evaluation tolerance window in seconds. May be repeated. Defaults to 0.5 and 3."
        )]
        windows: Vec<f64>,

        #[clap(
            long,
            value_parser = clap::value_parser!(PathBuf),
            help = "Directory to write one JSON report per evaluation window to."
        )]
        output: Option<PathBuf>,

        #[clap(flatten)]
        grid: GridArgs,

        #[clap(
            long,
            default_value = "false",
            action(ArgAction::SetTrue),
            help = "Run the analysis step in-place instead of looking for pre-computed analysis data."
        )]
        analyze: bool,

        #[clap(
            long,
            default_value = "false",
            action(ArgAction::SetTrue),
            help = "Do not display the evaluation summary in stdout."
        )]
        no_display: bool,
    },
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(
        long,
        global = true,
        default_value = "false",
        action(ArgAction::SetTrue),
        help = "By default, feature files are validated by parsing them. Setting this flag will switch to just checking file extensions."
    )]
    extensions_only: bool,

    #[clap(
        long,
        global = true,
        default_value = "false",
        action(ArgAction::SetTrue),
        help = "Process tracks one at a time instead of in parallel."
    )]
    no_threading: bool,

    #[clap(
        short,
        long,
        global = true,
        default_value = "false",
        action(ArgAction::SetTrue),
        help = "Enable trace logging."
    )]
    verbose: bool,
}

impl Cli {
    fn validate_grid(grid: &GridArgs) {
        let mut cmd = Cli::command();
        if grid.half_widths.iter().any(|&m| m == 0) {
            cmd.error(ErrorKind::InvalidValue, "half-width must be at least 1")
                .exit();
        }
        if grid
            .smoothing_params
            .iter()
            .any(|&(window, factor)| window == 0 || factor == 0)
        {
            cmd.error(
                ErrorKind::InvalidValue,
                "smoothing window length and downsample factor must be at least 1",
            )
            .exit();
        }
        if grid.feature_rate <= 0.0 {
            cmd.error(
                ErrorKind::InvalidValue,
                "feature_rate must be a positive number",
            )
            .exit();
        }
        if !(grid.threshold_value.is_finite() && grid.threshold_value >= 0.0) {
            cmd.error(
                ErrorKind::InvalidValue,
                "threshold_value must be a non-negative finite number",
            )
            .exit();
        }
    }

    fn validate(&self) {
        let mut cmd = Cli::command();
        match &self.command {
            Commands::Analyze { grid, .. } => Self::validate_grid(grid),
            Commands::Evaluate {
                grid,
                windows,
                annotations,
                ..
            } => {
                Self::validate_grid(grid);
                if windows.iter().any(|&w| !w.is_finite() || w < 0.0) {
                    cmd.error(
                        ErrorKind::InvalidValue,
                        "evaluation window must be a non-negative number",
                    )
                    .exit();
                }
                if !annotations.is_dir() {
                    cmd.error(
                        ErrorKind::InvalidValue,
                        format!("annotations directory not found: {}", annotations.display()),
                    )
                    .exit();
                }
            }
        }
    }

    fn find_feature_files(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        match foote::util::find_feature_files(paths, !self.extensions_only) {
            Err(e) => {
                let mut cmd = Cli::command();
                cmd.error(ErrorKind::InvalidValue, e.to_string()).exit();
            }
            Ok(v) => v,
        }
    }
}

fn display_analysis(path: &std::path::Path, analysis: &track::TrackAnalysis) {
    println!("\n{}\n", path.display());
    for run in analysis.runs() {
        let boundaries: Vec<String> = run
            .boundaries_secs(analysis.feature_rate())
            .into_iter()
            .map(|s| foote::util::format_time(Duration::from_secs_f64(s)))
            .collect();
        println!(
            "* {} half_width={} smoothing=({}, {}) - [{}]",
            run.kind,
            run.half_width,
            run.window_length,
            run.downsample_factor,
            boundaries.join(", ")
        );
    }
}

fn main() -> foote::Result<()> {
    let args = Cli::parse();

    let level = if args.verbose {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    args.validate();
    let threading = !args.no_threading;

    match args.command {
        Commands::Analyze {
            ref paths,
            ref grid,
            no_display,
        } => {
            let files = args.find_feature_files(paths);
            let analyzer = grid.analyzer(files);
            let data = analyzer.run(true, threading)?;
            if !no_display {
                for (path, analysis) in analyzer.paths().iter().zip(data.iter()) {
                    display_analysis(path, analysis);
                }
            }
        }
        Commands::Evaluate {
            ref paths,
            ref annotations,
            ref windows,
            ref output,
            ref grid,
            analyze,
            no_display,
        } => {
            let files = args.find_feature_files(paths);
            if files.is_empty() {
                let mut cmd = Cli::command();
                cmd.error(
                    ErrorKind::InvalidValue,
                    "no valid feature files found in provided paths",
                )
                .exit();
            }
            let mut evaluator = track::Evaluator::from_files(files, annotations)
                .with_analyzer(grid.analyzer(Vec::new()));
            if !windows.is_empty() {
                evaluator = evaluator.with_windows(windows.clone());
            }
            evaluator.run(analyze, !no_display, output.as_deref(), threading)?;
        }
    }

    Ok(())
}
