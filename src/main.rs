use clap::{Parser, Subcommand};
use royalbit_flatsheet::cli;
use royalbit_flatsheet::error::FlatsheetResult;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flatsheet")]
#[command(about = "Flatten nested records into spreadsheet rows, and back.")]
#[command(long_about = "Flatsheet - nested records <-> flat spreadsheet rows

Record types are declared in a YAML catalog: which attributes become columns,
which composites are flattened into their parent, and which lists expand into
repeated rows (MAX_LENGTH, MIN_LENGTH or CARTESIAN).

COMMANDS:
  export  - JSON records to Excel (.xlsx), with merged cells
  import  - Excel rows back to JSON records
  plan    - Show the columns and merges of a catalog type

EXAMPLES:
  flatsheet plan orders.yaml
  flatsheet export orders.yaml orders.json orders.xlsx
  flatsheet import orders.yaml orders.xlsx orders.json --sheet Order

Logging: set RUST_LOG (e.g. RUST_LOG=royalbit_flatsheet=debug)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export JSON records to an Excel file
    Export {
        /// YAML catalog describing the record types
        catalog: PathBuf,

        /// JSON file holding an array of records
        data: PathBuf,

        /// Output Excel file (.xlsx)
        output: PathBuf,

        /// Record type to export (defaults to the catalog root)
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,

        /// Worksheet name (defaults to the type name)
        #[arg(short, long)]
        sheet: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Import Excel rows back into JSON records
    Import {
        /// YAML catalog describing the record types
        catalog: PathBuf,

        /// Input Excel file (.xlsx)
        input: PathBuf,

        /// Output JSON file
        output: PathBuf,

        /// Record type to rebuild (defaults to the catalog root)
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,

        /// Worksheet to read (defaults to the first one)
        #[arg(short, long)]
        sheet: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the flatten plan of a catalog type
    Plan {
        /// YAML catalog describing the record types
        catalog: PathBuf,

        /// Record type to show (defaults to the catalog root)
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,
    },
}

fn main() -> FlatsheetResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "royalbit_flatsheet=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Export {
            catalog,
            data,
            output,
            type_name,
            sheet,
            verbose,
        } => cli::export(catalog, data, output, type_name, sheet, verbose),

        Commands::Import {
            catalog,
            input,
            output,
            type_name,
            sheet,
            verbose,
        } => cli::import(catalog, input, output, type_name, sheet, verbose),

        Commands::Plan { catalog, type_name } => cli::plan(catalog, type_name),
    }
}
