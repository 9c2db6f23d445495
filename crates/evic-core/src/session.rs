//! Upload session - high-level orchestrator for the eVic upload sequence.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::catalog;
use crate::error::{Error, FormatError, Result};
use crate::events::{EvicEvent, EvicObserver, LogLevel, TracingObserver};
use crate::payload::{BootTarget, DataFlash, FirmwareImage, LayoutVersion, Logo, format_version};
use crate::protocol::HidCommand;
use crate::protocol::constants::{DATAFLASH_SIZE, LOGO_FLASH_OFFSET, RESET_SETTLE_MS};
use crate::state::{UploadState, UploadStateMachine};
use crate::transport::{
    ChunkedTransport, DeviceStrings, HidConnector, HidTransport, NusbConnector, TransportError,
};

/// Configuration for an upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Path to the APROM firmware image.
    pub firmware_path: Option<String>,
    /// Firmware image is already decrypted.
    pub unencrypted: bool,
    /// Data flash file to write instead of the record read from the device.
    pub dataflash_path: Option<String>,
    /// Skip firmware and logo verification.
    pub skip_verify: bool,
    /// Wait after a reset before reconnecting.
    pub settle_delay_ms: u64,
    /// Data flash field layout.
    pub layout: LayoutVersion,
    /// Invert logo pixels.
    pub invert_logo: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            firmware_path: None,
            unencrypted: false,
            dataflash_path: None,
            skip_verify: false,
            settle_delay_ms: RESET_SETTLE_MS,
            layout: LayoutVersion::default(),
            invert_logo: false,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}

/// Read a firmware image file.
pub fn load_firmware<P: AsRef<Path>>(path: P, unencrypted: bool) -> Result<FirmwareImage> {
    let data = std::fs::read(path)?;
    Ok(if unencrypted {
        FirmwareImage::plain(data)
    } else {
        FirmwareImage::encrypted(data)
    })
}

/// Read a data flash file, returning the record and the checksum it must
/// match.
pub fn load_dataflash<P: AsRef<Path>>(path: P, layout: LayoutVersion) -> Result<(DataFlash, u32)> {
    let data = std::fs::read(path)?;
    Ok(DataFlash::parse_file(&data, layout)?)
}

/// Read a 1024-byte logo resource file.
pub fn load_logo<P: AsRef<Path>>(path: P) -> Result<Logo> {
    let data = std::fs::read(path)?;
    Ok(Logo::from_bytes(&data)?)
}

/// Summary of a connected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub strings: DeviceStrings,
    pub product_id: String,
    pub name: &'static str,
    pub fw_version: u32,
    pub hw_version: u32,
    pub ldrom_version: u32,
    pub bootloader: bool,
    /// Record passed checksum verification.
    pub trusted: bool,
}

impl DeviceInfo {
    fn new(strings: DeviceStrings, df: &DataFlash) -> Self {
        Self {
            strings,
            product_id: df.product_id_str(),
            name: catalog::display_name(&df.product_id()),
            fw_version: df.fw_version(),
            hw_version: df.hw_version(),
            ldrom_version: df.ldrom_version(),
            bootloader: df.is_bootloader(),
            trusted: df.verify(df.checksum()).is_ok(),
        }
    }
}

/// Data written to flash once the device runs LDROM.
enum Payload<'a> {
    Firmware(&'a FirmwareImage),
    /// Built from the device description once the data flash is trusted.
    Logo(Box<dyn FnOnce(&DeviceInfo) -> Result<Logo> + 'a>),
}

/// Upload session - drives one device through the upload sequence.
pub struct UploadSession<C: HidConnector, O: EvicObserver> {
    config: SessionConfig,
    connector: C,
    observer: Arc<O>,
    machine: UploadStateMachine,
}

impl UploadSession<NusbConnector, TracingObserver> {
    /// Create a session for a USB device with the default tracing observer.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_connector(config, NusbConnector::default(), Arc::new(TracingObserver))
    }
}

impl<C: HidConnector, O: EvicObserver> UploadSession<C, O> {
    /// Create a session with a custom connector and observer.
    pub fn with_connector(config: SessionConfig, connector: C, observer: Arc<O>) -> Self {
        Self {
            config,
            connector,
            observer,
            machine: UploadStateMachine::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Stage reached by the last operation.
    pub fn state(&self) -> UploadState {
        self.machine.state()
    }

    /// Stages entered by the last operation.
    pub fn history(&self) -> &[UploadState] {
        self.machine.history()
    }

    /// Load the configured firmware (and data flash override) and upload it.
    pub fn run(&mut self) -> Result<()> {
        let path = self
            .config
            .firmware_path
            .clone()
            .ok_or_else(|| Error::Config("no firmware path configured".into()))?;
        info!(path = %path, "Loading firmware");
        let image = load_firmware(&path, self.config.unencrypted)?;

        let dataflash = match &self.config.dataflash_path {
            Some(path) => {
                info!(path = %path, "Loading data flash");
                Some(load_dataflash(path, self.config.layout)?)
            }
            None => None,
        };

        self.upload_firmware(&image, dataflash)
    }

    /// Upload an APROM image.
    ///
    /// `dataflash` replaces the record read from the device; it is written
    /// back after verification against its checksum.
    #[instrument(skip(self, image, dataflash), fields(len = image.len(), override_dataflash = dataflash.is_some()))]
    pub fn upload_firmware(
        &mut self,
        image: &FirmwareImage,
        dataflash: Option<(DataFlash, u32)>,
    ) -> Result<()> {
        self.upload(Payload::Firmware(image), dataflash)
    }

    /// Upload a boot logo.
    #[instrument(skip(self, logo), fields(width = logo.width(), height = logo.height()))]
    pub fn upload_logo(&mut self, logo: &Logo) -> Result<()> {
        self.upload(Payload::Logo(Box::new(|_: &DeviceInfo| Ok(logo.clone()))), None)
    }

    /// Upload a boot logo built for the connected device.
    ///
    /// `build` runs after the data flash has been read and trusted, so the
    /// logo can follow the device's catalog dimensions without a second read.
    #[instrument(skip(self, build))]
    pub fn upload_logo_with<F>(&mut self, build: F) -> Result<()>
    where
        F: FnOnce(&DeviceInfo) -> Result<Logo>,
    {
        self.upload(Payload::Logo(Box::new(build)), None)
    }

    /// Read the device data flash, optionally verifying its checksum.
    #[instrument(skip(self))]
    pub fn dump_dataflash(&mut self, verify: bool) -> Result<DataFlash> {
        let dev = self.begin()?;
        let df = self.read_dataflash(&dev).map_err(|e| e.at(UploadState::DataFlashRead))?;
        self.advance(UploadState::DataFlashRead)?;

        if verify {
            df.verify(df.checksum())
                .map_err(|e| e.at(UploadState::DataFlashTrusted))?;
            self.advance(UploadState::DataFlashTrusted)?;
        }
        self.observer.on_event(&EvicEvent::Complete);
        Ok(df)
    }

    /// Restore the device data flash to factory defaults.
    #[instrument(skip(self))]
    pub fn reset_dataflash(&mut self) -> Result<()> {
        let dev = self.begin()?;
        self.send(&dev, &HidCommand::reset_dataflash())
            .map_err(|e| Error::from(e).at(UploadState::DataFlashWritten))?;
        self.advance(UploadState::DataFlashWritten)?;
        info!("Data flash reset to defaults");
        self.observer.on_event(&EvicEvent::Complete);
        Ok(())
    }

    /// Connect and describe the device.
    #[instrument(skip(self))]
    pub fn info(&mut self) -> Result<DeviceInfo> {
        let dev = self.begin()?;
        let df = self.read_dataflash(&dev).map_err(|e| e.at(UploadState::DataFlashRead))?;
        self.advance(UploadState::DataFlashRead)?;
        Ok(DeviceInfo::new(dev.strings(), &df))
    }

    fn upload(&mut self, payload: Payload<'_>, dataflash: Option<(DataFlash, u32)>) -> Result<()> {
        let dev = self.begin()?;

        let read = self.read_dataflash(&dev).map_err(|e| e.at(UploadState::DataFlashRead))?;
        self.advance(UploadState::DataFlashRead)?;
        let bootloader = read.is_bootloader();

        let (mut df, expected) = match dataflash {
            Some(supplied) => {
                info!("Using supplied data flash");
                supplied
            }
            None => {
                let expected = read.checksum();
                (read, expected)
            }
        };
        df.verify(expected)
            .map_err(|e| e.at(UploadState::DataFlashTrusted))?;
        if df.hw_version() > 1000 {
            self.log(LogLevel::Warn, "Hardware version is not set");
        }
        self.advance(UploadState::DataFlashTrusted)?;

        let product_id = df.product_id();
        info!(
            product_id = %df.product_id_str(),
            name = catalog::display_name(&product_id),
            fw_version = %format_version(df.fw_version()),
            hw_version = %format_version(df.hw_version()),
            bootloader,
            "Device data flash"
        );

        let verify = !self.config.skip_verify;
        let (start, data) = match payload {
            Payload::Firmware(image) => {
                let plain = image.to_plain();
                if verify {
                    let found = plain
                        .verify(&catalog::candidate_ids(&product_id), df.hw_version())
                        .map_err(|e| Error::from(e).at(UploadState::FirmwareVerified))?;
                    info!(
                        product_id = %found.product_id,
                        max_hw_version = %format_version(found.max_hw_version),
                        "Firmware verified"
                    );
                }
                (0, plain.into_bytes())
            }
            Payload::Logo(build) => {
                let logo = build(&DeviceInfo::new(dev.strings(), &df))
                    .map_err(|e| e.at(UploadState::FirmwareVerified))?;
                if verify {
                    check_logo(&product_id, &logo)
                        .map_err(|e| Error::from(e).at(UploadState::FirmwareVerified))?;
                }
                (LOGO_FLASH_OFFSET, logo.as_bytes().to_vec())
            }
        };
        if verify {
            self.advance(UploadState::FirmwareVerified)?;
        }

        df.set_bootflag(BootTarget::Ldrom);
        if start == 0 && catalog::needs_cross_flash_patch(&product_id, df.hw_version(), &data) {
            self.log(
                LogLevel::Info,
                &format!(
                    "Changing hardware version from {} to {}",
                    format_version(df.hw_version()),
                    format_version(catalog::CROSS_FLASH_HW_TARGET)
                ),
            );
            df.set_hw_version(catalog::CROSS_FLASH_HW_TARGET);
        }
        self.advance(UploadState::DataFlashPatched)?;

        self.write_dataflash(&dev, &df)
            .map_err(|e| e.at(UploadState::DataFlashWritten))?;
        self.advance(UploadState::DataFlashWritten)?;

        let dev = if bootloader {
            self.log(LogLevel::Info, "Device already in LDROM, skipping reset");
            dev
        } else {
            self.reset(dev);
            self.advance(UploadState::Reset)?;
            let dev = self.connect().map_err(|e| e.at(UploadState::Reconnected))?;
            self.advance(UploadState::Reconnected)?;
            dev
        };

        self.write_flash(&dev, start, &data)
            .map_err(|e| e.at(UploadState::FirmwareWritten))?;
        self.advance(UploadState::FirmwareWritten)?;

        info!(bytes = data.len(), start, "Upload complete");
        self.observer.on_event(&EvicEvent::Complete);
        Ok(())
    }

    /// Start a new operation: clear the state machine and open the device.
    fn begin(&mut self) -> Result<ChunkedTransport<C::Device>> {
        self.machine.reset();
        let dev = self.connect().map_err(|e| e.at(UploadState::Connected))?;
        self.advance(UploadState::Connected)?;
        Ok(dev)
    }

    fn connect(&self) -> Result<ChunkedTransport<C::Device>> {
        let device = self.connector.open()?;
        let dev = ChunkedTransport::new(device);
        self.observer.on_event(&EvicEvent::DeviceConnected {
            vid: dev.get_ref().vendor_id(),
            pid: dev.get_ref().product_id(),
            strings: dev.strings(),
        });
        Ok(dev)
    }

    fn advance(&mut self, to: UploadState) -> Result<()> {
        let from = self.machine.goto_state(to)?;
        self.observer
            .on_event(&EvicEvent::StateChanged { from, to });
        Ok(())
    }

    fn log(&self, level: LogLevel, message: &str) {
        self.observer.on_event(&EvicEvent::Log {
            level,
            message: message.to_string(),
        });
    }

    fn progress(&self, operation: &str, current: usize, total: usize) {
        self.observer.on_event(&EvicEvent::Progress {
            operation: operation.to_string(),
            current: current as u64,
            total: total as u64,
        });
    }

    fn send(
        &self,
        dev: &ChunkedTransport<C::Device>,
        cmd: &HidCommand,
    ) -> Result<(), TransportError> {
        dev.send_command(cmd)?;
        self.observer.on_event(&EvicEvent::CommandSent {
            opcode: cmd.opcode(),
            arg1: cmd.arg1(),
            arg2: cmd.arg2(),
        });
        Ok(())
    }

    fn read_record(&self, dev: &ChunkedTransport<C::Device>) -> Result<DataFlash> {
        self.send(dev, &HidCommand::read_dataflash(0, DATAFLASH_SIZE as u32))?;
        let data = dev.read(DATAFLASH_SIZE)?;
        Ok(DataFlash::from_bytes(&data, self.config.layout)?)
    }

    /// Read the record, re-reading once if it looks like a transient
    /// bootloader read.
    fn read_dataflash(&self, dev: &ChunkedTransport<C::Device>) -> Result<DataFlash> {
        let df = self.read_record(dev)?;
        if df.is_bootloader() {
            debug!(
                fw_version = df.fw_version(),
                ldrom_version = df.ldrom_version(),
                "Reading data flash again"
            );
            return self.read_record(dev);
        }
        Ok(df)
    }

    fn write_dataflash(&self, dev: &ChunkedTransport<C::Device>, df: &DataFlash) -> Result<()> {
        self.send(dev, &HidCommand::write_dataflash(0, DATAFLASH_SIZE as u32))?;
        dev.write(df.as_bytes())?;
        info!(checksum = %format!("0x{:08X}", df.checksum()), "Data flash written");
        Ok(())
    }

    /// Ask the device to restart, then release it and wait for it to settle.
    /// A failed reset write is tolerated.
    fn reset(&self, dev: ChunkedTransport<C::Device>) {
        if let Err(e) = self.send(&dev, &HidCommand::reset_system()) {
            warn!(error = %e, "Reset command failed, continuing");
        }
        drop(dev);
        self.observer.on_event(&EvicEvent::DeviceDisconnected);

        info!(delay_ms = self.config.settle_delay_ms, "Waiting for device to restart");
        thread::sleep(Duration::from_millis(self.config.settle_delay_ms));
    }

    fn write_flash(
        &self,
        dev: &ChunkedTransport<C::Device>,
        start: u32,
        data: &[u8],
    ) -> Result<()> {
        self.send(dev, &HidCommand::write_flash(start, data.len() as u32))?;
        self.progress("Writing flash", 0, data.len());
        dev.write(data)?;
        self.progress("Writing flash", data.len(), data.len());
        Ok(())
    }
}

/// Check a logo against the device's catalog dimensions.
fn check_logo(product_id: &[u8; 4], logo: &Logo) -> Result<(), FormatError> {
    let format = catalog::lookup(product_id)
        .and_then(|e| e.logo_format())
        .ok_or_else(|| FormatError::UnsupportedDevice {
            candidates: vec![String::from_utf8_lossy(product_id).into_owned()],
        })?;
    format.validate(logo.width() as u32, logo.height() as u32)
}
