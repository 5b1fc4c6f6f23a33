use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
};

use clap::{Parser, ValueEnum};
use pic_dasm::{
    addr::Addr,
    analyzer::{Analyzer, AnalyzerConfig},
    disasm::{
        Disassembler,
        listing::{ListingOptions, write_listing},
    },
    graph::write_dot,
    hints,
    image::{Format, MemoryImage},
    symbols::{DataRange, Symbols},
};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// PIC16 disassembler with call-depth analysis
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Program image, raw little-endian words or Intel HEX
    image: PathBuf,

    /// Image format
    #[arg(short, long, value_enum, default_value_t = FormatArg::Auto)]
    format: FormatArg,

    /// Hint file with register names, labels and data ranges
    #[arg(short = 's', long = "hints")]
    hints: Vec<PathBuf>,

    /// Run the call-depth analysis
    #[arg(short, long)]
    depth: bool,

    /// Write the call graph as Graphviz dot; implies --depth
    #[arg(short, long)]
    graph: Option<PathBuf>,

    /// Keep one graph edge per pair of labels
    #[arg(long)]
    single_trace: bool,

    /// Leave `call` edges out of the graph
    #[arg(long)]
    no_subroutine_edges: bool,

    /// Abort when calls nest deeper than this
    #[arg(long, default_value_t = 100)]
    max_depth: u32,

    /// Treat START-END (inclusive) as data
    #[arg(long, value_parser = parse_range)]
    data: Vec<DataRange>,

    /// Show addresses and raw words
    #[arg(short, long)]
    words: bool,

    /// Listing output, stdout by default
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// More logging, repeatable
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Auto,
    Bin,
    Hex,
}

impl From<FormatArg> for Format {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Auto => Format::Auto,
            FormatArg::Bin => Format::Binary,
            FormatArg::Hex => Format::Hex,
        }
    }
}

fn parse_range(s: &str) -> Result<DataRange, String> {
    let (start, end) = s
        .split_once('-')
        .ok_or_else(|| "must be of the form START-END".to_owned())?;
    let start = Addr::parse(start).ok_or_else(|| format!("bad address {start:?}"))?;
    let end = Addr::parse(end).ok_or_else(|| format!("bad address {end:?}"))?;
    if end < start {
        return Err(format!("{end} is before {start}"));
    }
    Ok(DataRange::inclusive(start, end, s))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(args: Args) -> pic_dasm::Result<()> {
    let image = MemoryImage::load(&args.image, args.format.into())?;
    let mut symbols = Symbols::new();
    for path in &args.hints {
        let summary = hints::load(path, &mut symbols)?;
        info!(path = %path.display(), ?summary, "loaded hints");
    }
    for range in args.data {
        symbols.add_data_range(range);
    }

    let mut disasm = Disassembler::new(image, symbols);
    disasm.scan();

    let analysis = if args.depth || args.graph.is_some() {
        let cfg = AnalyzerConfig {
            max_depth: args.max_depth,
            single_trace: args.single_trace,
            subroutine_edges: !args.no_subroutine_edges,
            ..Default::default()
        };
        Some(Analyzer::new(cfg).analyze(&mut disasm)?)
    } else {
        None
    };

    let opts = ListingOptions {
        show_words: args.words,
        show_depth: analysis.is_some(),
    };
    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    write_listing(&mut out, &mut disasm, analysis.as_ref(), &opts)?;
    out.flush()?;

    if let (Some(path), Some(analysis)) = (&args.graph, &analysis) {
        let mut dot = BufWriter::new(File::create(path)?);
        write_dot(&mut dot, &analysis.graph)?;
        dot.flush()?;
        debug!(path = %path.display(), edges = analysis.graph.edges().len(), "call graph written");
    }
    Ok(())
}

fn main_err() -> Result<(), String> {
    let args = Args::parse();
    init_logging(args.verbose);

    run(args).map_err(|err| err.to_string())
}

fn main() {
    if let Err(err) = main_err() {
        eprintln!("\x1b[1;31merror:\x1b[m {err}");
        std::process::exit(1);
    }
}
