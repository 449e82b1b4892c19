use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use visual_graph_datasets::app::{DatasetManager, EnsureOptions, LoadSummary};
use visual_graph_datasets::config::{Config, ConfigLoader};
use visual_graph_datasets::domain::DatasetName;
use visual_graph_datasets::error::VgdError;
use visual_graph_datasets::loader::LoadOptions;
use visual_graph_datasets::output::{HumanOutput, JsonOutput, OutputMode};

#[derive(Parser)]
#[command(name = "vgd")]
#[command(about = "Download, cache and load visual graph datasets")]
#[command(version)]
struct Cli {
    /// Config file to use instead of ~/.visual_graph_datasets/config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of a human summary
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Download a dataset unless it is already present")]
    Download(DownloadArgs),
    #[command(about = "List datasets available on a provider")]
    List(ListArgs),
    #[command(about = "List or remove downloaded datasets")]
    Local(LocalArgs),
    #[command(about = "Show the local folder of a downloaded dataset")]
    Info(NameArgs),
    #[command(about = "Load a downloaded dataset and summarize it")]
    Load(LoadArgs),
    #[command(about = "Inspect or create the config file")]
    Config(ConfigArgs),
}

#[derive(Args)]
struct DownloadArgs {
    name: String,

    #[arg(long)]
    provider: Option<String>,

    /// Download again even if the dataset folder exists
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct ListArgs {
    #[arg(long)]
    provider: Option<String>,
}

#[derive(Args)]
struct LocalArgs {
    #[arg(long, value_name = "NAME")]
    remove: Option<String>,
}

#[derive(Args)]
struct NameArgs {
    name: String,
}

#[derive(Args)]
struct LoadArgs {
    name: String,

    /// Skip malformed elements instead of failing
    #[arg(long)]
    skip_malformed: bool,
}

#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    #[command(about = "Print the merged configuration")]
    Show,
    #[command(about = "Write a config file with the defaults")]
    Init,
    #[command(about = "Print the config file location")]
    Path,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(vgd) = report.downcast_ref::<VgdError>() {
            return ExitCode::from(map_exit_code(vgd));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &VgdError) -> u8 {
    match error {
        VgdError::DatasetNotFoundRemote { .. } | VgdError::DatasetNotFoundLocal { .. } => 2,
        VgdError::Http(_) | VgdError::HttpStatus { .. } | VgdError::RemoteMetadata(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    if let Command::Config(args) = &cli.command {
        return run_config(&args.command, cli.config.clone(), output_mode);
    }

    let config = ConfigLoader::load(cli.config.as_deref())?;
    let manager = DatasetManager::new(&config);
    match cli.command {
        Command::Download(args) => run_download(args, &manager, output_mode),
        Command::List(args) => run_list(args, &manager, output_mode),
        Command::Local(args) => run_local(args, &manager, output_mode),
        Command::Info(args) => run_info(args, &manager, output_mode),
        Command::Load(args) => run_load(args, &manager, output_mode),
        Command::Config(_) => Ok(()),
    }
}

fn parse_name(name: &str) -> miette::Result<DatasetName> {
    Ok(name.parse::<DatasetName>()?)
}

fn run_download(
    args: DownloadArgs,
    manager: &DatasetManager<'_>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let name = parse_name(&args.name)?;
    let options = EnsureOptions { force: args.force };
    match output_mode {
        OutputMode::NonInteractive => {
            let result =
                manager.ensure_dataset(&name, args.provider.as_deref(), options, &JsonOutput)?;
            JsonOutput::print(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let result =
                manager.ensure_dataset(&name, args.provider.as_deref(), options, &HumanOutput)?;
            HumanOutput::print_ensure(&result);
            Ok(())
        }
    }
}

fn run_list(
    args: ListArgs,
    manager: &DatasetManager<'_>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = manager.list_remote(args.provider.as_deref(), &JsonOutput)?;
            JsonOutput::print(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let result = manager.list_remote(args.provider.as_deref(), &HumanOutput)?;
            HumanOutput::print_remote(&result);
            Ok(())
        }
    }
}

fn run_local(
    args: LocalArgs,
    manager: &DatasetManager<'_>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    if let Some(name) = args.remove {
        let name = parse_name(&name)?;
        return match output_mode {
            OutputMode::NonInteractive => {
                let result = manager.remove(&name, &JsonOutput)?;
                JsonOutput::print(&result).into_diagnostic()
            }
            OutputMode::Interactive => {
                let result = manager.remove(&name, &HumanOutput)?;
                HumanOutput::print_remove(&result);
                Ok(())
            }
        };
    }

    let result = manager.list_local()?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print(&result).into_diagnostic(),
        OutputMode::Interactive => {
            HumanOutput::print_local(&result);
            Ok(())
        }
    }
}

fn run_info(
    args: NameArgs,
    manager: &DatasetManager<'_>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let name = parse_name(&args.name)?;
    let result = manager.info(&name)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print(&result).into_diagnostic(),
        OutputMode::Interactive => {
            HumanOutput::print_info(&result);
            Ok(())
        }
    }
}

fn run_load(
    args: LoadArgs,
    manager: &DatasetManager<'_>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let name = parse_name(&args.name)?;
    let options = LoadOptions {
        skip_malformed: args.skip_malformed,
        ..LoadOptions::default()
    };
    let dataset = manager.load(&name, &options)?;
    let summary = LoadSummary::from(&dataset);
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print(&summary).into_diagnostic(),
        OutputMode::Interactive => {
            HumanOutput::print_load(&summary);
            Ok(())
        }
    }
}

fn run_config(
    command: &ConfigCommand,
    path: Option<PathBuf>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let path = match path {
        Some(path) => path,
        None => ConfigLoader::default_path()?,
    };
    match command {
        ConfigCommand::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommand::Show => {
            let config: Config = ConfigLoader::load(Some(&path))?;
            JsonOutput::print(&config.to_file()).into_diagnostic()
        }
        ConfigCommand::Init => {
            let written = ConfigLoader::write_template(&path)?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print(&serde_json::json!({
                    "path": path.display().to_string(),
                    "written": written,
                }))
                .into_diagnostic(),
                OutputMode::Interactive => {
                    if written {
                        println!("wrote {}", path.display());
                    } else {
                        println!("{} already exists, left unchanged", path.display());
                    }
                    Ok(())
                }
            }
        }
    }
}
