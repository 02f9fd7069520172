//! CLI for Windows Mobile devices over RAPI.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod files;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use rapi::ops::{HKEY_CLASSES_ROOT, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, HKEY_USERS};
use rapi::{CallContext, Config, FileResolver, Resolver, Selector};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rapi", version, about = "Talk to Windows Mobile devices over RAPI")]
struct Cli {
    /// Device name (default: the active connection).
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Config file (default: $XDG_CONFIG_HOME/synce/rapi.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List known devices.
    #[command(visible_alias = "ls")]
    Devices {
        /// Output format.
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show OS version and storage of the device.
    Status {
        /// Output format.
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },

    /// Copy a file from the device.
    Get(files::GetArgs),

    /// Copy a file to the device.
    Put(files::PutArgs),

    /// Create a directory on the device.
    Mkdir {
        /// Device path.
        path: String,
    },

    /// Remove an empty directory on the device.
    Rmdir {
        /// Device path.
        path: String,
    },

    /// Delete files on the device.
    Rm {
        /// Device paths.
        #[arg(required = true, num_args = 1..)]
        paths: Vec<String>,
    },

    /// Rename or move a file on the device.
    Mv {
        /// Current device path.
        from: String,
        /// New device path.
        to: String,
    },

    /// Start a program on the device.
    Run {
        /// Program path on the device.
        program: String,
        /// Command line passed to the program.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Read a registry value.
    Reg {
        /// Root key.
        root: RootKey,
        /// Subkey path, e.g. `Ident`.
        key: String,
        /// Value name (default: the key's default value).
        name: Option<String>,
    },

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

/// Output format for list/status commands.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable table.
    #[default]
    Table,
    /// Machine-readable JSON.
    Json,
}

/// Predefined registry roots.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum RootKey {
    /// HKEY_LOCAL_MACHINE.
    Hklm,
    /// HKEY_CURRENT_USER.
    Hkcu,
    /// HKEY_CLASSES_ROOT.
    Hkcr,
    /// HKEY_USERS.
    Hku,
}

impl RootKey {
    const fn handle(self) -> u32 {
        match self {
            Self::Hklm => HKEY_LOCAL_MACHINE,
            Self::Hkcu => HKEY_CURRENT_USER,
            Self::Hkcr => HKEY_CLASSES_ROOT,
            Self::Hku => HKEY_USERS,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(e) = cli.dispatch() {
        eprintln!("rapi: {e:#}");
        std::process::exit(1);
    }
}

/// Logs to stderr. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

impl Cli {
    fn dispatch(self) -> Result<()> {
        match &self.command {
            Command::Devices { format } => self.devices(*format),
            Command::Status { format } => status(&mut self.connect()?, *format),
            Command::Get(args) => files::get(&mut self.connect()?, args),
            Command::Put(args) => files::put(&mut self.connect()?, args),
            Command::Mkdir { path } => Ok(self.connect()?.create_directory(path)?),
            Command::Rmdir { path } => Ok(self.connect()?.remove_directory(path)?),
            Command::Rm { paths } => {
                let mut ctx = self.connect()?;
                for path in paths {
                    ctx.delete_file(path)
                        .with_context(|| format!("cannot delete {path}"))?;
                }
                Ok(())
            }
            Command::Mv { from, to } => Ok(self.connect()?.move_file(from, to)?),
            Command::Run { program, args } => run(&mut self.connect()?, program, args),
            Command::Reg { root, key, name } => {
                reg(&mut self.connect()?, *root, key, name.as_deref())
            }
            Command::Completion { shell } => {
                clap_complete::generate(*shell, &mut Self::command(), "rapi", &mut std::io::stdout());
                Ok(())
            }
        }
    }

    fn load_config(&self) -> Result<Config> {
        Config::load_or_default(self.config.as_deref()).context("cannot load config")
    }

    fn selector(&self) -> Selector {
        self.device.clone().map_or(Selector::Default, Selector::Name)
    }

    /// Opens a connected context for the selected device.
    fn connect(&self) -> Result<CallContext> {
        let mut ctx = CallContext::new(self.load_config()?).with_selector(self.selector());
        ctx.connect().with_context(|| format!("cannot connect to {}", self.selector()))?;
        Ok(ctx)
    }

    fn devices(&self, format: OutputFormat) -> Result<()> {
        let config = self.load_config()?;
        let devices = FileResolver::new(&config.info_dir).devices()?;

        if matches!(format, OutputFormat::Json) {
            println!("{}", serde_json::to_string_pretty(&devices)?);
            return Ok(());
        }

        if devices.is_empty() {
            println!("No devices.");
            return Ok(());
        }
        println!("{:<24} {:<8} {:<10} {:<16}", "NAME", "OS", "TRANSPORT", "ADDRESS");
        for info in &devices {
            let os = format!("{}.{}", info.os_major, info.os_minor);
            println!(
                "{:<24} {:<8} {:<10} {:<16}",
                info.name,
                os,
                info.transport.as_deref().unwrap_or("ppp"),
                info.device_ip.as_deref().unwrap_or("-"),
            );
        }
        Ok(())
    }
}

fn status(ctx: &mut CallContext, format: OutputFormat) -> Result<()> {
    let version = ctx.get_version_ex()?;
    let store = ctx.get_store_information()?;

    if matches!(format, OutputFormat::Json) {
        let obj = serde_json::json!({
            "device": ctx.info().map(|i| i.name.clone()),
            "dialect": ctx.dialect().map(|d| format!("{d:?}")),
            "version": version,
            "store": store,
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }

    if let Some(info) = ctx.info() {
        println!("device:  {}", info.name);
    }
    println!(
        "os:      {}.{} build {} {}",
        version.major, version.minor, version.build, version.csd_version
    );
    println!(
        "store:   {} free of {}",
        human_size(u64::from(store.free_size)),
        human_size(u64::from(store.store_size))
    );
    Ok(())
}

fn run(ctx: &mut CallContext, program: &str, args: &[String]) -> Result<()> {
    let command_line = (!args.is_empty()).then(|| args.join(" "));
    let process = ctx
        .create_process(program, command_line.as_deref())
        .with_context(|| format!("cannot start {program}"))?;
    ctx.close_handle(process.thread)?;
    ctx.close_handle(process.process)?;
    println!("{}", process.process_id);
    Ok(())
}

fn reg(ctx: &mut CallContext, root: RootKey, key: &str, name: Option<&str>) -> Result<()> {
    const MAX_VALUE: u32 = 4096;

    let handle = ctx
        .reg_open_key_ex(root.handle(), key)
        .with_context(|| format!("cannot open key {key}"))?;
    let value = ctx.reg_query_value_ex(handle, name, MAX_VALUE);
    ctx.reg_close_key(handle)?;
    let value = value.with_context(|| format!("cannot read {}", name.unwrap_or("(default)")))?;

    if let Some(text) = value.as_string() {
        println!("{text}");
    } else if let Some(word) = value.as_u32() {
        println!("{word:#010x} ({word})");
    } else {
        let hex: Vec<String> = value.data.iter().map(|b| format!("{b:02x}")).collect();
        println!("{}", hex.join(" "));
    }
    Ok(())
}

/// Formats bytes into a human-readable size string.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}
