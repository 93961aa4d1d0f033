use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Merge every sheet of every workbook in a directory into one summary sheet",
    long_about = None
)]
pub struct Cli {
    /// Directory holding the .xls/.xlsx workbooks to merge
    pub input_dir: PathBuf,
    /// Output workbook (.xlsx, or .csv for plain text)
    pub output: PathBuf,
}
