use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use scenariodb::ModelProgram;
use scenariodb::instance::ScenarioUnit;
use scenariodb::storage::read_export;
use scenariodb::workspace::opt_file_extension;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "scenario-tool")]
#[command(about = "Developer tooling for ScenarioDB model instances")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the compilation unit generated for a model definition.
    Unit {
        /// Solve statement tail, e.g. "transport use lp min z".
        #[arg(long)]
        model: String,
        /// Parameter modifier as NAME or NAME:DIM.
        #[arg(long)]
        param: Vec<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the option file extension for an option file number.
    OptExt { number: i32 },
    /// Summarize a store export file.
    Inspect { file: PathBuf },
    /// Check a JSON model program.
    Validate { program: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Unit { model, param, out } => unit(&model, &param, out.as_deref()),
        Command::OptExt { number } => {
            println!("{}", opt_file_extension(number));
            Ok(())
        }
        Command::Inspect { file } => inspect(&file),
        Command::Validate { program } => validate(&program),
    }
}

fn parse_param(spec: &str) -> Result<(String, usize)> {
    match spec.split_once(':') {
        None => Ok((spec.to_string(), 0)),
        Some((name, dim)) => {
            let dim = dim
                .parse()
                .map_err(|_| anyhow!("Invalid dimension in parameter '{}'", spec))?;
            Ok((name.to_string(), dim))
        }
    }
}

fn unit(model: &str, params: &[String], out: Option<&Path>) -> Result<()> {
    let mut unit = ScenarioUnit::new(model);
    for spec in params {
        let (name, dim) = parse_param(spec)?;
        unit = unit.parameter(name, dim);
    }
    let text = unit.build();
    match out {
        Some(path) => {
            fs::write(path, &text)
                .with_context(|| format!("Failed to write unit to '{}'", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}

fn inspect(file: &Path) -> Result<()> {
    let export = read_export(file)
        .with_context(|| format!("Failed to read store export '{}'", file.display()))?;
    println!(
        "Store '{}' exported {} (format v{})",
        export.name, export.exported_at, export.version
    );
    println!("{} symbols, {} records", export.symbols.len(), export.record_count());
    for symbol in &export.symbols {
        println!(
            "  {:<20} {:<10} dim={} records={}",
            symbol.name(),
            symbol.kind(),
            symbol.dim(),
            symbol.number_records()
        );
    }
    Ok(())
}

fn validate(path: &Path) -> Result<()> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read program '{}'", path.display()))?;
    let program = ModelProgram::from_json(&source).map_err(|e| anyhow!(e))?;
    program.validate().map_err(|e| anyhow!(e))?;
    println!(
        "OK: {} sets, {} parameters, {} variables, {} equations, {} models",
        program.sets.len(),
        program.parameters.len(),
        program.variables.len(),
        program.equations.len(),
        program.models.len()
    );
    Ok(())
}
