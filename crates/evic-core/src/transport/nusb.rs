//! nusb-based HID transport implementation.
//!
//! The device exposes a vendor HID interface with one interrupt endpoint in
//! each direction. Reports are exchanged directly on those endpoints; report
//! ID 0 is not transmitted on the wire.

use std::io::{Read, Write};
use std::sync::Mutex;

use nusb::descriptors::TransferType;
use nusb::io::{EndpointRead, EndpointWrite};
use nusb::transfer::{Direction, In, Interrupt, Out};
use nusb::{MaybeFuture, list_devices};
use tracing::{debug, info, instrument};

use super::traits::{DeviceStrings, HidConnector, HidTransport, TransportError};
use crate::protocol::constants::{
    EP_IN, EP_OUT, EVIC_PRODUCT_ID, HID_INTERFACE, NUVOTON_VENDOR_ID, REPORT_ID, REPORT_SIZE,
};

/// nusb-based HID transport.
pub struct NusbHid {
    reader: Mutex<EndpointRead<Interrupt>>,
    writer: Mutex<EndpointWrite<Interrupt>>,
    strings: DeviceStrings,
    vid: u16,
    pid: u16,
}

impl NusbHid {
    /// Open the first device with the given VID/PID.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        Self::open_device_info(device_info)
    }

    fn open_device_info(device_info: nusb::DeviceInfo) -> Result<Self, TransportError> {
        let vid = device_info.vendor_id();
        let pid = device_info.product_id();
        let strings = DeviceStrings {
            manufacturer: device_info.manufacturer_string().map(str::to_string),
            product: device_info.product_string().map(str::to_string),
            serial_number: device_info.serial_number().map(str::to_string),
        };

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        // The kernel HID driver owns the interface until detached.
        let interface = device
            .detach_and_claim_interface(HID_INTERFACE)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface: HID_INTERFACE,
                message: e.to_string(),
            })?;

        let mut in_endpoint = None;
        let mut out_endpoint = None;

        for config in device.configurations() {
            for iface in config.interfaces() {
                if iface.interface_number() != HID_INTERFACE {
                    continue;
                }
                for alt in iface.alt_settings() {
                    for ep in alt.endpoints() {
                        if ep.transfer_type() == TransferType::Interrupt {
                            if ep.direction() == Direction::In {
                                in_endpoint.get_or_insert(ep.address());
                            } else {
                                out_endpoint.get_or_insert(ep.address());
                            }
                        }
                    }
                }
            }
        }

        let in_endpoint = in_endpoint.unwrap_or_else(|| {
            debug!("No interrupt IN endpoint in descriptors, using default");
            EP_IN
        });
        let out_endpoint = out_endpoint.unwrap_or_else(|| {
            debug!("No interrupt OUT endpoint in descriptors, using default");
            EP_OUT
        });

        let reader = interface
            .endpoint::<Interrupt, In>(in_endpoint)
            .map_err(|_| TransportError::EndpointNotFound {
                ep_type: "Interrupt".into(),
                direction: "In".into(),
            })?
            .reader(REPORT_SIZE);
        let writer = interface
            .endpoint::<Interrupt, Out>(out_endpoint)
            .map_err(|_| TransportError::EndpointNotFound {
                ep_type: "Interrupt".into(),
                direction: "Out".into(),
            })?
            .writer(REPORT_SIZE);

        info!(
            in_ep = %format!("0x{:02X}", in_endpoint),
            out_ep = %format!("0x{:02X}", out_endpoint),
            "Device opened successfully"
        );

        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            strings,
            vid,
            pid,
        })
    }
}

impl HidTransport for NusbHid {
    /// Sends one interrupt transfer. The report ID is dropped and the page is
    /// zero-padded, so a full page (plus report ID) is always reported.
    #[instrument(skip(self, report), fields(len = report.len()))]
    fn write(&self, report: &[u8]) -> Result<usize, TransportError> {
        let payload = match report.split_first() {
            Some((&REPORT_ID, rest)) => rest,
            _ => report,
        };
        if payload.len() > REPORT_SIZE {
            return Err(TransportError::WriteFailed(format!(
                "report of {} bytes exceeds page size",
                payload.len()
            )));
        }

        let mut page = [0u8; REPORT_SIZE];
        page[..payload.len()].copy_from_slice(payload);

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| TransportError::WriteFailed("writer lock poisoned".into()))?;
        writer
            .write_all(&page)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        debug!(bytes_written = REPORT_SIZE, "Write complete");
        Ok(REPORT_SIZE + 1)
    }

    #[instrument(skip(self))]
    fn read(&self, len: usize) -> Result<Vec<u8>, TransportError> {
        let mut reader = self
            .reader
            .lock()
            .map_err(|_| TransportError::ReadFailed("reader lock poisoned".into()))?;
        let mut buf = vec![0u8; len];

        let n = reader
            .read(&mut buf)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

        buf.truncate(n);
        debug!(bytes_read = n, "Read complete");
        Ok(buf)
    }

    fn strings(&self) -> DeviceStrings {
        self.strings.clone()
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}

/// Opens the device by its fixed vendor/product ID.
#[derive(Debug, Clone, Copy)]
pub struct NusbConnector {
    pub vid: u16,
    pub pid: u16,
}

impl Default for NusbConnector {
    fn default() -> Self {
        Self {
            vid: NUVOTON_VENDOR_ID,
            pid: EVIC_PRODUCT_ID,
        }
    }
}

impl HidConnector for NusbConnector {
    type Device = NusbHid;

    fn open(&self) -> Result<NusbHid, TransportError> {
        NusbHid::open_with_ids(self.vid, self.pid)
    }
}
