use std::path::PathBuf;

use clap::Parser;

use crate::input::DEFAULT_ADDRESS_COLUMN;

#[derive(Parser, Debug)]
#[command(
    name = "address-screen",
    version,
    about = "Screen cryptocurrency addresses against a risk-intelligence API",
    after_help = "The input CSV must contain an 'address' column (see --address-column).\n\
                  Configuration is read from the environment or a .env file; \
                  CHAINALYSIS_API_KEY is required."
)]
pub struct Cli {
    /// Input CSV file containing addresses to screen
    pub input_file: PathBuf,

    /// Output CSV file for screening results.
    /// Defaults to `<input>_screened.csv` next to the input file.
    pub output_file: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_ADDRESS_COLUMN, help = "Name of the address column")]
    pub address_column: String,

    #[arg(
        long,
        default_value_t = false,
        help = "Omit indirect exposure columns (overrides INCLUDE_INDIRECT_EXPOSURE)"
    )]
    pub exclude_indirect: bool,
}

impl Cli {
    /// Checks the input path before any configuration or network work.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.input_file.exists() {
            anyhow::bail!("Input file '{}' not found", self.input_file.display());
        }
        let is_csv = self
            .input_file
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if !is_csv {
            anyhow::bail!("Input file must be a CSV file");
        }
        Ok(())
    }
}
