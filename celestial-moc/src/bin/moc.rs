use anyhow::{bail, Context};
use celestial_moc::io::{self, Format};
use celestial_moc::{ColumnOrdering, Decoded, Logic, Moc, StMoc, WriteOptions};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Fits,
    Ascii,
    Json,
}

impl From<OutputFormat> for Format {
    fn from(f: OutputFormat) -> Self {
        match f {
            OutputFormat::Fits => Format::Fits,
            OutputFormat::Ascii => Format::Ascii,
            OutputFormat::Json => Format::Json,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Ordering {
    Nuniq,
    Range,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogicArg {
    Min,
    Max,
}

impl From<LogicArg> for Logic {
    fn from(l: LogicArg) -> Self {
        match l {
            LogicArg::Min => Logic::Min,
            LogicArg::Max => Logic::Max,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Operation {
    Union,
    Inter,
    Minus,
    Diff,
}

#[derive(clap::Args)]
struct Output {
    /// Output format (default: from the output extension, else FITS)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
    /// FITS column layout for single-dimension maps
    #[arg(long, value_enum, default_value = "nuniq")]
    ordering: Ordering,
    /// Always write 64-bit FITS columns
    #[arg(long)]
    force_64bit: bool,
}

impl Output {
    fn options(&self, path: &Path) -> WriteOptions {
        let format = self
            .format
            .map(Format::from)
            .or_else(|| Format::from_extension(path))
            .unwrap_or(Format::Fits);
        let ordering = match self.ordering {
            Ordering::Nuniq => ColumnOrdering::Nuniq,
            Ordering::Range => ColumnOrdering::Range,
        };
        WriteOptions::new(format)
            .with_ordering(ordering)
            .with_64bit(self.force_64bit)
    }
}

#[derive(Parser)]
#[command(name = "moc")]
#[command(about = "Inspect, convert and combine Multi-Order Coverage maps")]
struct Cli {
    /// Log debug events to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a summary of a MOC file
    Info {
        file: PathBuf,
    },
    /// Rewrite a MOC in another format
    Convert {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        out: Output,
    },
    /// Combine two MOCs of the same kind
    Op {
        #[arg(value_enum)]
        operation: Operation,
        a: PathBuf,
        b: PathBuf,
        output: PathBuf,
        /// How to reconcile different orders
        #[arg(long, value_enum, default_value = "max")]
        logic: LogicArg,
        #[command(flatten)]
        out: Output,
    },
    /// Lower the resolution of a MOC
    Degrade {
        input: PathBuf,
        output: PathBuf,
        /// Target order (the space order of a space-time map)
        #[arg(long)]
        order: u8,
        /// Target time order of a space-time map
        #[arg(long)]
        time_order: Option<u8>,
        #[arg(long, value_enum, default_value = "max")]
        logic: LogicArg,
        #[command(flatten)]
        out: Output,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    match cli.command {
        Commands::Info { file } => {
            let map = load(&file)?;
            print_info(&file, &map);
        }
        Commands::Convert { input, output, out } => {
            let map = load(&input)?;
            save(&map, &output, &out)?;
        }
        Commands::Op {
            operation,
            a,
            b,
            output,
            logic,
            out,
        } => {
            let logic = Logic::from(logic);
            let result = match (load(&a)?, load(&b)?) {
                (Decoded::Moc(a), Decoded::Moc(b)) => Decoded::Moc(match operation {
                    Operation::Union => a.union_with(&b, logic),
                    Operation::Inter => a.intersection_with(&b, logic),
                    Operation::Minus => a.subtraction_with(&b, logic),
                    Operation::Diff => a.difference_with(&b, logic),
                }?),
                (Decoded::StMoc(a), Decoded::StMoc(b)) => Decoded::StMoc(match operation {
                    Operation::Union => a.union_with(&b, logic),
                    Operation::Inter => a.intersection_with(&b, logic),
                    Operation::Minus => a.subtraction_with(&b, logic),
                    Operation::Diff => a.difference_with(&b, logic),
                }?),
                _ => bail!("cannot combine a space-time map with a single-dimension map"),
            };
            save(&result, &output, &out)?;
        }
        Commands::Degrade {
            input,
            output,
            order,
            time_order,
            logic,
            out,
        } => {
            let logic = Logic::from(logic);
            let result = match load(&input)? {
                Decoded::Moc(mut moc) => {
                    if time_order.is_some() {
                        bail!("--time-order only applies to space-time maps");
                    }
                    moc.set_moc_order_with(order, logic)?;
                    Decoded::Moc(moc)
                }
                Decoded::StMoc(mut st) => {
                    st.set_space_order_with(order, logic)?;
                    if let Some(t) = time_order {
                        st.set_time_order_with(t, logic)?;
                    }
                    Decoded::StMoc(st)
                }
            };
            save(&result, &output, &out)?;
        }
    }

    Ok(())
}

fn load(path: &Path) -> anyhow::Result<Decoded> {
    io::read_any(path).with_context(|| format!("cannot read MOC from {}", path.display()))
}

fn save(map: &Decoded, path: &Path, out: &Output) -> anyhow::Result<()> {
    let options = out.options(path);
    map.write_path(path, &options)
        .with_context(|| format!("cannot write {} to {}", options.format, path.display()))
}

fn print_info(path: &Path, map: &Decoded) {
    println!("File: {}", path.display());
    match map {
        Decoded::Moc(moc) => print_moc(moc),
        Decoded::StMoc(st) => print_stmoc(st),
    }
}

fn print_moc(moc: &Moc) {
    println!("Dimension: {}", moc.dimension());
    println!("System: {}", moc.system());
    println!("MOC order: {}", moc.moc_order());
    if let Some(deepest) = moc.deepest_cell_order() {
        println!("Deepest cell order: {deepest}");
    }
    println!("Ranges: {}", moc.range_count());
    println!("Cells: {}", moc.cell_count());
    println!("Coverage: {:.6}%", moc.coverage() * 100.0);
    print_properties(moc.properties());
}

fn print_stmoc(st: &StMoc) {
    println!("Dimension: TIME.SPACE");
    println!("Systems: {} / {}", st.time_system(), st.space_system());
    println!("Orders: time {} / space {}", st.time_order(), st.space_order());
    println!("Segments: {}", st.segment_count());
    let time = st.time_moc();
    let space = st.space_moc();
    println!("Time coverage: {:.6}%", time.coverage() * 100.0);
    println!("Sky coverage (any time): {:.6}%", space.coverage() * 100.0);
    print_properties(st.properties());
}

fn print_properties<'a>(properties: impl Iterator<Item = (&'a str, &'a str)>) {
    for (key, value) in properties {
        println!("{key:<8} = {value}");
    }
}
