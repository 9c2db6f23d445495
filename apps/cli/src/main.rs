use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use evic_core::catalog;
use evic_core::protocol::constants::LOGO_SIZE;
use evic_core::{
    DeviceInfo, Logo, LogoFormat, SessionConfig, UploadSession, convert, format_version,
    load_logo,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Joyetech eVic firmware tool (Pure Rust)", long_about = None)]
struct Args {
    /// Session configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload an APROM firmware image
    Upload {
        /// Firmware image
        input: PathBuf,

        /// Image is already decrypted
        #[arg(short, long)]
        unencrypted: bool,

        /// Write this data flash file instead of the one read from the device
        #[arg(short, long)]
        dataflash: Option<PathBuf>,

        /// Skip firmware verification
        #[arg(long)]
        no_verify: bool,
    },

    /// Upload a boot logo: an image to convert, or a 1024-byte logo resource
    Logo {
        /// PNG, BMP or GIF image, or a raw logo resource
        image: PathBuf,

        /// Invert pixels
        #[arg(long)]
        invert: bool,

        /// Skip the logo dimension check
        #[arg(long)]
        no_verify: bool,
    },

    /// Encrypt or decrypt a firmware image
    Convert {
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Save the device data flash to a file
    DumpDataflash {
        #[arg(short, long)]
        output: PathBuf,

        /// Save even if the checksum does not match
        #[arg(long)]
        no_verify: bool,
    },

    /// Restore the device data flash to factory defaults
    ResetDataflash,

    /// Show device information
    Info,
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        if let Some(stage) = e
            .downcast_ref::<evic_core::Error>()
            .and_then(evic_core::Error::stage)
        {
            error!(stage = %stage, "Stopped");
        }
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SessionConfig::default(),
    };

    match args.command {
        Command::Convert { input, output } => {
            let data =
                fs::read(&input).with_context(|| format!("Can't read {}", input.display()))?;
            fs::write(&output, convert(&data))
                .with_context(|| format!("Can't write {}", output.display()))?;
            info!(bytes = data.len(), output = %output.display(), "Firmware converted");
        }
        Command::Upload {
            input,
            unencrypted,
            dataflash,
            no_verify,
        } => {
            config.firmware_path = Some(input.to_string_lossy().into_owned());
            config.unencrypted |= unencrypted;
            config.skip_verify |= no_verify;
            if let Some(path) = dataflash {
                config.dataflash_path = Some(path.to_string_lossy().into_owned());
            }

            info!("Starting eVic upload (nusb backend)...");
            UploadSession::new(config).run()?;
            println!("Firmware upload complete!");
        }
        Command::Logo {
            image,
            invert,
            no_verify,
        } => {
            config.invert_logo |= invert;
            config.skip_verify |= no_verify;
            let invert = config.invert_logo;
            let generalized = config.skip_verify;
            let mut session = UploadSession::new(config);

            let len = fs::metadata(&image)
                .with_context(|| format!("Can't read {}", image.display()))?
                .len();
            if len == LOGO_SIZE as u64 {
                // Already a device logo resource.
                let logo = load_logo(&image)
                    .with_context(|| format!("Can't load logo {}", image.display()))?;
                session.upload_logo(&logo)?;
            } else {
                session
                    .upload_logo_with(|device| {
                        print_device(device);
                        let format = if generalized {
                            LogoFormat::Generalized
                        } else {
                            catalog::lookup(device.product_id.as_bytes())
                                .and_then(|e| e.logo_format())
                                .unwrap_or(LogoFormat::DEFAULT)
                        };
                        Logo::from_image_file(&image, invert, format)
                    })
                    .with_context(|| format!("Can't upload logo {}", image.display()))?;
            }
            println!("Logo upload complete!");
        }
        Command::DumpDataflash { output, no_verify } => {
            let mut session = UploadSession::new(config);
            let df = session.dump_dataflash(!no_verify)?;
            fs::write(&output, df.as_bytes())
                .with_context(|| format!("Can't write data flash file {}", output.display()))?;
            info!(output = %output.display(), "Data flash saved");
        }
        Command::ResetDataflash => {
            UploadSession::new(config).reset_dataflash()?;
            println!("Data flash reset.");
        }
        Command::Info => {
            let device = UploadSession::new(config).info()?;
            print_device(&device);
        }
    }

    Ok(())
}

fn print_device(device: &DeviceInfo) {
    let or_unknown = |s: &Option<String>| s.clone().unwrap_or_else(|| "unknown".into());

    println!("\nFound device:");
    println!("\tManufacturer: {}", or_unknown(&device.strings.manufacturer));
    println!("\tProduct: {}", or_unknown(&device.strings.product));
    println!("\tSerial No: {}\n", or_unknown(&device.strings.serial_number));

    println!("\tDevice name: {} ({})", device.name, device.product_id);
    println!("\tFirmware version: {}", format_version(device.fw_version));
    println!("\tHardware version: {}", format_version(device.hw_version));
    if device.bootloader {
        println!("\tRunning LDROM (version {})", device.ldrom_version);
    }
    if !device.trusted {
        println!("\tData flash checksum does not match");
    }
    println!();
}
