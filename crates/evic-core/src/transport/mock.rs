//! Simulated device for testing.
//!
//! `MockHid` understands the command frames, serves the data flash as report
//! pages, collects data flash and flash writes, and re-enumerates when reset.
//! All handles opened by a `MockConnector` share one `MockDeviceState`, so a
//! test can inspect the device after the session is done with it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{DeviceStrings, HidConnector, HidTransport, TransportError};
use crate::payload::dataflash::{BootTarget, DataFlash, LayoutVersion};
use crate::protocol::command::{HidCommand, Opcode};
use crate::protocol::constants::{DATAFLASH_SIZE, EVIC_PRODUCT_ID, NUVOTON_VENDOR_ID, REPORT_SIZE};

/// A multi-report write in progress.
#[derive(Debug, Clone)]
enum Pending {
    DataFlash { buf: Vec<u8>, len: usize },
    Flash { start: u32, buf: Vec<u8>, len: usize },
}

impl Pending {
    fn remaining(&self) -> usize {
        match self {
            Pending::DataFlash { buf, len } | Pending::Flash { buf, len, .. } => len - buf.len(),
        }
    }

    fn buf_mut(&mut self) -> &mut Vec<u8> {
        match self {
            Pending::DataFlash { buf, .. } | Pending::Flash { buf, .. } => buf,
        }
    }
}

/// Everything the simulated device knows.
#[derive(Debug, Clone)]
pub struct MockDeviceState {
    /// Stored data flash record.
    pub dataflash: DataFlash,
    /// Record restored by the reset-data-flash command.
    pub factory_dataflash: DataFlash,
    /// Running from LDROM.
    pub bootloader: bool,
    /// Number of upcoming data flash reads that return a transient bad record.
    pub bad_reads: usize,
    /// Reboot on reset but report the reset write as failed.
    pub fail_reset: bool,
    /// Report every write as a full page, like hosts that pad short reports.
    pub pad_reports: bool,
    pub connected: bool,
    /// Times a handle was opened.
    pub connect_count: usize,
    pub strings: DeviceStrings,
    /// Every command frame received.
    pub commands: Vec<HidCommand>,
    /// Completed flash writes as `(start, payload)`.
    pub flash_writes: Vec<(u32, Vec<u8>)>,
    /// Data flash writes received, in order.
    pub dataflash_writes: Vec<Vec<u8>>,
    pending: Option<Pending>,
    outbox: VecDeque<Vec<u8>>,
}

impl MockDeviceState {
    pub fn new(dataflash: DataFlash) -> Self {
        Self {
            factory_dataflash: dataflash.clone(),
            dataflash,
            bootloader: false,
            bad_reads: 0,
            fail_reset: false,
            pad_reports: false,
            connected: false,
            connect_count: 0,
            strings: DeviceStrings {
                manufacturer: Some("Nuvoton".into()),
                product: Some("HID Transfer".into()),
                serial_number: Some("A02014090305".into()),
            },
            commands: Vec::new(),
            flash_writes: Vec::new(),
            dataflash_writes: Vec::new(),
            pending: None,
            outbox: VecDeque::new(),
        }
    }

    /// Opcodes received, in order.
    pub fn opcodes(&self) -> Vec<u8> {
        self.commands.iter().map(|c| c.opcode()).collect()
    }

    /// Record as reported by the running image.
    fn served_record(&mut self) -> DataFlash {
        let mut df = self.dataflash.clone();
        if self.bootloader {
            df.set_fw_version(0);
        }
        if self.bad_reads > 0 {
            self.bad_reads -= 1;
            df.set_fw_version(0);
            df.set_ldrom_version(0xFFFF_FFFF);
        }
        df
    }

    fn queue_pages(&mut self, data: &[u8]) {
        for chunk in data.chunks(REPORT_SIZE) {
            let mut page = chunk.to_vec();
            page.resize(REPORT_SIZE, 0);
            self.outbox.push_back(page);
        }
    }

    fn reboot(&mut self) {
        self.bootloader = self.dataflash.boot_target() == BootTarget::Ldrom;
        self.connected = false;
        self.outbox.clear();
        self.pending = None;
    }

    fn handle_command(&mut self, cmd: HidCommand) -> Result<(), TransportError> {
        self.commands.push(cmd);
        match Opcode::from_code(cmd.opcode()) {
            Some(Opcode::ReadDataFlash) => {
                let len = cmd.arg2().saturating_sub(cmd.arg1()) as usize;
                let record = self.served_record();
                let start = cmd.arg1() as usize;
                let end = (start + len).min(DATAFLASH_SIZE);
                let window = record.as_bytes()[start.min(end)..end].to_vec();
                self.queue_pages(&window);
            }
            Some(Opcode::WriteDataFlash) => {
                self.pending = Some(Pending::DataFlash {
                    buf: Vec::new(),
                    len: cmd.arg2() as usize,
                });
            }
            Some(Opcode::ResetSystem) => {
                self.reboot();
                if self.fail_reset {
                    return Err(TransportError::WriteFailed("pipe error".into()));
                }
            }
            Some(Opcode::WriteFlash) => {
                if !self.bootloader {
                    return Err(TransportError::WriteFailed(
                        "flash writes are only accepted by LDROM".into(),
                    ));
                }
                self.pending = Some(Pending::Flash {
                    start: cmd.arg1(),
                    buf: Vec::new(),
                    len: cmd.arg2() as usize,
                });
            }
            Some(Opcode::ResetDataFlash) => {
                self.dataflash = self.factory_dataflash.clone();
            }
            None => {}
        }
        Ok(())
    }

    fn finish_pending(&mut self) {
        match self.pending.take() {
            Some(Pending::DataFlash { buf, .. }) => {
                if let Ok(df) = DataFlash::from_bytes(&buf, self.dataflash.layout()) {
                    self.dataflash = df;
                }
                self.dataflash_writes.push(buf);
            }
            Some(Pending::Flash { start, buf, .. }) => {
                self.flash_writes.push((start, buf));
            }
            None => {}
        }
    }
}

/// Simulated device handle.
pub struct MockHid {
    state: Arc<Mutex<MockDeviceState>>,
}

impl HidTransport for MockHid {
    fn write(&self, report: &[u8]) -> Result<usize, TransportError> {
        let mut s = self.state.lock().unwrap();
        if !s.connected {
            return Err(TransportError::Disconnected);
        }
        let payload = report.get(1..).unwrap_or_default();
        let accepted = if s.pad_reports {
            REPORT_SIZE + 1
        } else {
            report.len()
        };

        if let Some(pending) = s.pending.as_mut() {
            let take = pending.remaining().min(payload.len());
            pending.buf_mut().extend_from_slice(&payload[..take]);
            if pending.remaining() == 0 {
                s.finish_pending();
            }
            return Ok(accepted);
        }

        if let Some(cmd) = HidCommand::parse(payload) {
            s.handle_command(cmd)?;
            if matches!(s.pending, Some(ref p) if p.remaining() == 0) {
                s.finish_pending();
            }
        }
        Ok(accepted)
    }

    fn read(&self, _len: usize) -> Result<Vec<u8>, TransportError> {
        let mut s = self.state.lock().unwrap();
        if !s.connected {
            return Err(TransportError::Disconnected);
        }
        s.outbox
            .pop_front()
            .ok_or(TransportError::Timeout { timeout_ms: 1000 })
    }

    fn strings(&self) -> DeviceStrings {
        self.state.lock().unwrap().strings.clone()
    }

    fn vendor_id(&self) -> u16 {
        NUVOTON_VENDOR_ID
    }

    fn product_id(&self) -> u16 {
        EVIC_PRODUCT_ID
    }
}

/// Hands out `MockHid` handles to one simulated device.
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<Mutex<MockDeviceState>>,
    present: Arc<Mutex<bool>>,
}

impl MockConnector {
    pub fn new(state: MockDeviceState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            present: Arc::new(Mutex::new(true)),
        }
    }

    /// Device running APROM with a valid record for `product_id`.
    pub fn with_device(product_id: [u8; 4], hw_version: u32, fw_version: u32) -> Self {
        let mut df = DataFlash::blank(LayoutVersion::A);
        df.set_product_id(product_id);
        df.set_hw_version(hw_version);
        df.set_fw_version(fw_version);
        Self::new(MockDeviceState::new(df))
    }

    /// Shared device state.
    pub fn state(&self) -> Arc<Mutex<MockDeviceState>> {
        Arc::clone(&self.state)
    }

    /// Simulate unplugging (or plugging in) the device.
    pub fn set_present(&self, present: bool) {
        *self.present.lock().unwrap() = present;
    }
}

impl HidConnector for MockConnector {
    type Device = MockHid;

    fn open(&self) -> Result<MockHid, TransportError> {
        if !*self.present.lock().unwrap() {
            return Err(TransportError::DeviceNotFound {
                vid: NUVOTON_VENDOR_ID,
                pid: EVIC_PRODUCT_ID,
            });
        }
        let mut s = self.state.lock().unwrap();
        s.connected = true;
        s.connect_count += 1;
        Ok(MockHid {
            state: Arc::clone(&self.state),
        })
    }
}
