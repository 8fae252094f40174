use std::path::PathBuf;
use std::process;

use capscope_core::address_space::{AddressSpace, FileMappings, MappingProvider, ProcessMappings};
use capscope_core::config::{InspectorConfig, SymbolSource};
use capscope_core::symbols::SymbolProvider;
use capscope_core::types::{Address, ProcessId};
use capscope_core::{CapscopeError, Result};
use capscope_utils::{
    info, init_logging, init_logging_to_file, init_logging_with_level, LogFormat, LogLevel, LoggingGuard,
};
use clap::{Parser, Subcommand};

/// Inspect which memory a CHERI process can reach, named by image and symbol.
#[derive(Parser, Debug)]
#[command(name = "capscope")]
#[command(version)]
#[command(about = "Inspect which memory a CHERI process can reach, named by image and symbol", long_about = None)]
struct Cli
{
    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// List the mappings of a process with their image bases
    Mappings
    {
        /// Process ID (defaults to capscope itself)
        #[arg(long)]
        pid: Option<u32>,
        /// Mapping list layout: auto, procstat or maps
        #[arg(long)]
        source: Option<String>,
        /// Read a saved mapping dump instead of a live process
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// List the symbols of an image
    Symbols
    {
        /// Path to the binary or shared library
        path: String,
        /// Symbol provider: nm or object
        #[arg(long)]
        provider: Option<String>,
    },
    /// Resolve an address to image!symbol+offset form
    Resolve
    {
        /// Address (hex format: 0x1000 or decimal)
        address: String,
        /// Process ID (defaults to capscope itself)
        #[arg(long)]
        pid: Option<u32>,
    },
}

fn main()
{
    let cli = Cli::parse();

    let guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli) {
        capscope_utils::error!("{e}");
        eprintln!("Error: {e}");
        // process::exit skips destructors; flush the log file first
        drop(guard);
        process::exit(1);
    }
}

fn setup_logging(cli: &Cli) -> std::result::Result<LoggingGuard, Box<dyn std::error::Error>>
{
    let level = cli.log_level.as_deref().map(str::parse::<LogLevel>).transpose()?;

    let guard = match (&cli.log_file, level) {
        (Some(path), level) => init_logging_to_file(path, level)?,
        (None, Some(level)) => init_logging_with_level(level, LogFormat::Pretty)?,
        (None, None) => init_logging()?,
    };
    Ok(guard)
}

fn run_command(cli: Cli) -> Result<()>
{
    let mut config = InspectorConfig::from_env();

    match cli.command {
        Commands::Mappings { pid, source, file } => {
            if let Some(source) = source {
                config.mappings = source.parse()?;
            }
            match file {
                Some(path) => {
                    info!("Reading mappings from {}", path.display());
                    print_mappings(FileMappings::new(path, config.mappings), &config)
                }
                None => {
                    let pid = pid.map_or_else(ProcessId::current, ProcessId::from);
                    info!("Listing mappings of process {}", pid);
                    print_mappings(ProcessMappings::new(pid, config.mappings), &config)
                }
            }
        }
        Commands::Symbols { path, provider } => {
            if let Some(provider) = provider {
                config.symbols = provider.parse::<SymbolSource>()?;
            }
            let symbols = config.symbol_provider().load_symbols(&path)?;
            info!("{} symbols in {}", symbols.len(), path);
            for symbol in &symbols {
                println!("{symbol}");
            }
            Ok(())
        }
        Commands::Resolve { address, pid } => {
            let address = parse_address(&address)?;
            let pid = pid.map_or_else(ProcessId::current, ProcessId::from);
            let mut space = config.address_space(pid);
            println!("{address:#x}  {}", space.resolve_name(address)?);
            Ok(())
        }
    }
}

fn print_mappings<P: MappingProvider>(provider: P, config: &InspectorConfig) -> Result<()>
{
    let mut space = AddressSpace::new(provider, config.symbol_table(), config.max_mappings);
    space.ensure_loaded()?;
    print!("{}", space.listing());
    Ok(())
}

fn parse_address(text: &str) -> Result<Address>
{
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    };
    parsed
        .map(Address::new)
        .map_err(|e| CapscopeError::InvalidArgument(format!("invalid address '{text}': {e}")))
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_address()
    {
        assert_eq!(parse_address("0x1000").unwrap(), Address::new(0x1000));
        assert_eq!(parse_address("0XFF").unwrap(), Address::new(0xff));
        assert_eq!(parse_address("4096").unwrap(), Address::new(4096));
        assert!(parse_address("0xzz").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands()
    {
        let cli = Cli::parse_from(["capscope", "--log-level", "debug", "mappings", "--source", "maps"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Commands::Mappings { source: Some(ref s), .. } if s == "maps"));

        let cli = Cli::parse_from(["capscope", "resolve", "0x1000", "--pid", "42"]);
        assert!(matches!(cli.command, Commands::Resolve { pid: Some(42), .. }));
    }
}
