use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use tracing::debug;

use dfukeys::model::{DeviceId, DeviceType, Protocol, ServerAddress};
use dfukeys::use_cases::{
    DoctorOptions, NewKeysOptions, SaveKeysOptions, ServerKeyOptions, FILENAME_REQUIRED,
};
use dfukeys::{DefaultSession, DfuKeysError, Operation, Settings};

#[derive(Parser, Debug)]
#[command(name = "dfukeys")]
#[command(about = "Provision device keys over DFU", version)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides for the configuration file
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Configuration file (default: platform config dir)
    #[arg(long, global = true, env = "DFUKEYS_CONFIG")]
    pub config: Option<PathBuf>,

    /// DFU utility to run
    #[arg(long, global = true, env = "DFUKEYS_DFU_UTIL")]
    pub dfu_util: Option<String>,

    /// Access token for the cloud API
    #[arg(long, global = true, env = "DFUKEYS_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Cloud API base URL
    #[arg(long, global = true, env = "DFUKEYS_API_URL")]
    pub api_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a new key pair and install it on the device
    New {
        /// Base name of the key files (default: device)
        #[arg(value_name = "filename")]
        filename: Option<String>,

        /// Protocol to generate keys for (default: the device's current one)
        #[arg(long)]
        protocol: Option<ProtocolArg>,

        /// Overwrite existing key files
        #[arg(long)]
        force: bool,
    },

    /// Save the device public key to local files
    Save {
        #[arg(value_name = "filename")]
        filename: Option<String>,

        #[arg(long)]
        protocol: Option<ProtocolArg>,

        #[arg(long)]
        force: bool,
    },

    /// Install a key pair from a file on the device
    Load {
        #[arg(value_name = "filename")]
        filename: Option<String>,
    },

    /// Register a public key with the cloud
    Send {
        #[arg(value_name = "deviceId")]
        device_id: Option<DeviceId>,

        #[arg(value_name = "filename")]
        filename: Option<String>,

        /// Product the device belongs to
        #[arg(long)]
        product: Option<String>,
    },

    /// Install the server public key, or format it for a device type
    Server {
        /// Server public key file (default: the bundled cloud key)
        #[arg(value_name = "filename")]
        filename: Option<String>,

        /// Output of --deviceType formatting (default: <filename>-<type>.der)
        #[arg(value_name = "outputFilename")]
        output_filename: Option<String>,

        /// Only format the key for this device type; no device is touched
        #[arg(long = "deviceType", alias = "device-type", value_enum, ignore_case = true)]
        device_type: Option<DeviceTypeArg>,

        /// Server host name or IPv4 address
        #[arg(long)]
        host: Option<ServerAddress>,

        #[arg(long)]
        port: Option<u16>,

        #[arg(long)]
        protocol: Option<ProtocolArg>,

        #[arg(long)]
        force: bool,
    },

    /// Print the server address the device connects to
    Address,

    /// Print or switch the device transport protocol
    Protocol {
        /// Switch to this protocol
        #[arg(long)]
        protocol: Option<ProtocolArg>,
    },

    /// Regenerate, install and register new device keys
    Doctor {
        #[arg(value_name = "deviceId")]
        device_id: Option<DeviceId>,

        #[arg(long)]
        protocol: Option<ProtocolArg>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProtocolArg {
    Tcp,
    Udp,
}

impl From<ProtocolArg> for Protocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Tcp => Protocol::Tcp,
            ProtocolArg::Udp => Protocol::Udp,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DeviceTypeArg {
    Core,
    Photon,
    P1,
    Electron,
    Argon,
    Boron,
    Xenon,
}

impl From<DeviceTypeArg> for DeviceType {
    fn from(arg: DeviceTypeArg) -> Self {
        match arg {
            DeviceTypeArg::Core => DeviceType::Core,
            DeviceTypeArg::Photon => DeviceType::Photon,
            DeviceTypeArg::P1 => DeviceType::P1,
            DeviceTypeArg::Electron => DeviceType::Electron,
            DeviceTypeArg::Argon => DeviceType::Argon,
            DeviceTypeArg::Boron => DeviceType::Boron,
            DeviceTypeArg::Xenon => DeviceType::Xenon,
        }
    }
}

/// Arguments that parse but do not make a runnable operation
#[derive(Debug)]
struct UsageError {
    subcommand: &'static str,
    message: String,
}

impl UsageError {
    fn missing(subcommand: &'static str, parameter: &str) -> Self {
        Self {
            subcommand,
            message: format!("Parameter '{parameter}' is required."),
        }
    }
}

fn required<T>(value: Option<T>, subcommand: &'static str, parameter: &str) -> Result<T, UsageError> {
    value.ok_or_else(|| UsageError::missing(subcommand, parameter))
}

fn operation(command: Commands) -> Result<Operation, UsageError> {
    let operation = match command {
        Commands::New {
            filename,
            protocol,
            force,
        } => Operation::New(NewKeysOptions {
            filename,
            protocol: protocol.map(Into::into),
            force,
        }),
        Commands::Save {
            filename,
            protocol,
            force,
        } => Operation::Save(SaveKeysOptions {
            filename: required(filename, "save", "filename")?,
            protocol: protocol.map(Into::into),
            force,
        }),
        Commands::Load { filename } => Operation::Load {
            filename: required(filename, "load", "filename")?.into(),
        },
        Commands::Send {
            device_id,
            filename,
            product,
        } => Operation::Send {
            device_id: required(device_id, "send", "deviceId")?,
            filename: required(filename, "send", "filename")?.into(),
            product_id: product,
        },
        Commands::Server {
            filename,
            output_filename,
            device_type,
            host,
            port,
            protocol,
            force,
        } => {
            if device_type.is_some() && filename.is_none() {
                return Err(UsageError {
                    subcommand: "server",
                    message: FILENAME_REQUIRED.to_string(),
                });
            }
            Operation::Server(ServerKeyOptions {
                filename,
                output_filename,
                device_type: device_type.map(Into::into),
                host,
                port,
                protocol: protocol.map(Into::into),
                force,
            })
        }
        Commands::Address => Operation::Address,
        Commands::Protocol { protocol } => Operation::Protocol {
            switch_to: protocol.map(Into::into),
        },
        Commands::Doctor {
            device_id,
            protocol,
        } => Operation::Doctor(DoctorOptions {
            protocol: protocol.map(Into::into),
            ..DoctorOptions::new(required(device_id, "doctor", "deviceId")?)
        }),
    };
    Ok(operation)
}

/// Message on stdout, the subcommand's usage on stderr
fn report_usage(error: &UsageError) -> io::Result<()> {
    println!("{}", error.message);
    let mut command = Cli::command();
    command.build();
    let usage = match command.find_subcommand_mut(error.subcommand) {
        Some(subcommand) => subcommand.render_usage(),
        None => command.render_usage(),
    };
    writeln!(io::stderr(), "{usage}")
}

fn settings(global: &GlobalArgs) -> anyhow::Result<Settings> {
    let mut settings =
        Settings::load(global.config.as_deref()).context("failed to load configuration")?;
    if let Some(dfu_util) = &global.dfu_util {
        settings.dfu_util = dfu_util.clone();
    }
    if let Some(token) = &global.access_token {
        settings.access_token = Some(token.clone());
    }
    if let Some(api_url) = &global.api_url {
        settings.api_url = api_url.clone();
    }
    Ok(settings)
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // stdout only carries results, so help goes to stderr with usage errors
            return Ok(match err.kind() {
                ErrorKind::DisplayVersion => {
                    err.print()?;
                    ExitCode::SUCCESS
                }
                ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                    write!(io::stderr(), "{}", err.render())?;
                    ExitCode::SUCCESS
                }
                _ => {
                    write!(io::stderr(), "{}", err.render())?;
                    ExitCode::FAILURE
                }
            });
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(io::stderr)
        .init();

    let operation = match operation(cli.command) {
        Ok(operation) => operation,
        Err(usage) => {
            report_usage(&usage)?;
            return Ok(ExitCode::FAILURE);
        }
    };
    let settings = settings(&cli.global)?;

    let session = DefaultSession::from_settings(&settings).context("failed to initialise")?;
    if let Operation::Doctor(_) = operation {
        // stop between doctor steps instead of dying half way
        let cancel = session.cancel.clone();
        ctrlc::set_handler(move || cancel.cancel())
            .context("failed to install interrupt handler")?;
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match session.execute(&operation, &mut out) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(DfuKeysError::Usage(message)) => {
            drop(out);
            report_usage(&UsageError {
                subcommand: operation.name(),
                message,
            })?;
            Ok(ExitCode::FAILURE)
        }
        Err(err) => {
            debug!(operation = operation.name(), error = ?err, "Operation failed");
            if let Some(remediation) = err.remediation() {
                writeln!(out, "{remediation}")?;
            }
            writeln!(out, "{}: {err}", operation.failure_context())?;
            Ok(ExitCode::FAILURE)
        }
    }
}
