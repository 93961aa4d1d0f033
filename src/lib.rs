pub mod accessor;
pub mod assistant;
pub mod cli;
pub mod convert;
pub mod dataset;
pub mod error;
pub mod io_utils;
pub mod merge;
pub mod message;
pub mod reader;
pub mod schema;
pub mod storage;
pub mod style;
pub mod validate;
pub mod value;
pub mod writer;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::{LevelFilter, debug};

use crate::cli::Cli;

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheet_merge", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    debug!("Merging {:?} into {:?}", cli.input_dir, cli.output);
    merge::execute(&cli)
}
