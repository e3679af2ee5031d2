use std::path::PathBuf;
use std::time::Instant;

use anyhow::anyhow;
use clap::{CommandFactory, Parser as ClapParser, ValueEnum};
use sqllineage::lineage::LineageRunner;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LineageLevel {
    Table,
    Column,
}

#[derive(clap::Parser)]
#[command(name = "sqllineage")]
#[command(about = "SQL lineage analyzer for Spark/Hive scripts", long_about = None)]
struct Cli {
    /// SQL from command line.
    #[arg(short = 'e', value_name = "QUOTED SQL")]
    sql: Option<String>,
    /// SQL from files.
    #[arg(short = 'f', value_name = "FILENAME")]
    file: Option<PathBuf>,
    /// Print the lineage of each statement before the summary.
    #[arg(short, long)]
    verbose: bool,
    /// Lineage level.
    #[arg(short, long, value_enum, default_value_t = LineageLevel::Table)]
    level: LineageLevel,
    /// Output the lineage summary as JSON.
    #[arg(long)]
    json: bool,
    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
    /// Analyse statements in parallel.
    #[arg(long)]
    parallel: bool,
}

fn read_sql(cli: &Cli) -> anyhow::Result<Option<String>> {
    match (&cli.sql, &cli.file) {
        (Some(_), Some(file)) | (None, Some(file)) => {
            if cli.sql.is_some() {
                eprintln!("Both -e and -f options are specified. -e option will be ignored");
            }
            let sql = std::fs::read_to_string(file)
                .map_err(|err| anyhow!("Failed to read sql file {}: {}", file.display(), err))?;
            Ok(Some(sql))
        }
        (Some(sql), None) => Ok(Some(sql.clone())),
        (None, None) => Ok(None),
    }
}

fn main() -> anyhow::Result<()> {
    let now = Instant::now();

    env_logger::init();
    let cli = Cli::parse();

    let Some(sql) = read_sql(&cli)? else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let mut builder = LineageRunner::builder(&sql).parallel(cli.parallel);
    if cli.verbose {
        builder = builder.verbose();
    }
    let runner = builder.build()?;

    let out_str = if cli.json {
        let summary = runner.summary(matches!(cli.level, LineageLevel::Column));
        if cli.pretty {
            serde_json::to_string_pretty(&summary)?
        } else {
            serde_json::to_string(&summary)?
        }
    } else {
        match cli.level {
            LineageLevel::Table => runner.print_table_lineage(),
            LineageLevel::Column => runner.print_column_lineage(),
        }
    };
    println!("{}", out_str.trim_end());

    let elapsed = now.elapsed();
    log::info!("Elapsed: {:.2?}", elapsed);

    Ok(())
}
