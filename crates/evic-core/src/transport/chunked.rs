//! Chunked HID transfers.
//!
//! Payloads are split into 64-byte report pages. Each outbound page is
//! prefixed with the report ID; inbound pages are concatenated and trimmed
//! to the requested length.

use tracing::{debug, instrument};

use super::traits::{DeviceStrings, HidTransport, TransportError};
use crate::protocol::HidCommand;
use crate::protocol::constants::{REPORT_ID, REPORT_SIZE};

/// Page-oriented transfers on top of a raw `HidTransport`.
pub struct ChunkedTransport<T: HidTransport> {
    inner: T,
}

impl<T: HidTransport> ChunkedTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn strings(&self) -> DeviceStrings {
        self.inner.strings()
    }

    /// Write `payload` as a sequence of report pages.
    ///
    /// Some hosts always consume a full page, even for a short final chunk;
    /// that padding is subtracted before the byte count is checked.
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub fn write(&self, payload: &[u8]) -> Result<(), TransportError> {
        let mut accepted = 0usize;
        let mut report = Vec::with_capacity(REPORT_SIZE + 1);

        for chunk in payload.chunks(REPORT_SIZE) {
            report.clear();
            report.push(REPORT_ID);
            report.extend_from_slice(chunk);
            let n = self.inner.write(&report)?;
            accepted += n.saturating_sub(1);
        }

        let remainder = payload.len() % REPORT_SIZE;
        if accepted > payload.len() && remainder != 0 {
            accepted -= REPORT_SIZE - remainder;
        }

        if accepted != payload.len() {
            return Err(TransportError::LengthMismatch {
                op: "write",
                expected: payload.len(),
                actual: accepted,
            });
        }

        debug!(
            pages = payload.len().div_ceil(REPORT_SIZE),
            bytes = accepted,
            "Chunked write complete"
        );
        Ok(())
    }

    /// Read exactly `len` bytes as `ceil(len / 64)` report pages.
    #[instrument(skip(self))]
    pub fn read(&self, len: usize) -> Result<Vec<u8>, TransportError> {
        let pages = len.div_ceil(REPORT_SIZE);
        let mut data = Vec::with_capacity(pages * REPORT_SIZE);

        for _ in 0..pages {
            data.extend_from_slice(&self.inner.read(REPORT_SIZE)?);
        }
        data.truncate(len);

        if data.len() != len {
            return Err(TransportError::LengthMismatch {
                op: "read",
                expected: len,
                actual: data.len(),
            });
        }

        debug!(pages, bytes = len, "Chunked read complete");
        Ok(data)
    }

    /// Send a single command frame.
    pub fn send_command(&self, cmd: &HidCommand) -> Result<(), TransportError> {
        debug!(?cmd, "Sending command");
        self.write(cmd.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Records reports; optionally reports every write as a full page.
    struct PageRecorder {
        reports: Mutex<Vec<Vec<u8>>>,
        pages: Mutex<VecDeque<Vec<u8>>>,
        full_page: bool,
    }

    impl PageRecorder {
        fn new(full_page: bool) -> Self {
            Self {
                reports: Mutex::new(Vec::new()),
                pages: Mutex::new(VecDeque::new()),
                full_page,
            }
        }
    }

    impl HidTransport for PageRecorder {
        fn write(&self, report: &[u8]) -> Result<usize, TransportError> {
            self.reports.lock().unwrap().push(report.to_vec());
            Ok(if self.full_page {
                REPORT_SIZE + 1
            } else {
                report.len()
            })
        }

        fn read(&self, _len: usize) -> Result<Vec<u8>, TransportError> {
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(TransportError::Timeout { timeout_ms: 0 })
        }

        fn strings(&self) -> DeviceStrings {
            DeviceStrings::default()
        }

        fn vendor_id(&self) -> u16 {
            0
        }

        fn product_id(&self) -> u16 {
            0
        }
    }

    #[test]
    fn test_write_boundaries() {
        for (len, chunks) in [(64usize, 1usize), (65, 2), (128, 2)] {
            for full_page in [false, true] {
                let t = ChunkedTransport::new(PageRecorder::new(full_page));
                let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
                t.write(&payload).unwrap();

                let reports = t.get_ref().reports.lock().unwrap().clone();
                assert_eq!(reports.len(), chunks, "len={len} full_page={full_page}");
                assert!(reports.iter().all(|r| r[0] == REPORT_ID));
                let joined: Vec<u8> = reports.iter().flat_map(|r| r[1..].to_vec()).collect();
                assert_eq!(joined, payload);
            }
        }
    }

    #[test]
    fn test_write_command_padded_host() {
        let t = ChunkedTransport::new(PageRecorder::new(true));
        t.send_command(&HidCommand::reset_system()).unwrap();
        let reports = t.get_ref().reports.lock().unwrap().clone();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].len(), 19);
    }

    #[test]
    fn test_write_short_accept_fails() {
        struct Lossy;
        impl HidTransport for Lossy {
            fn write(&self, report: &[u8]) -> Result<usize, TransportError> {
                Ok(report.len() - 1)
            }
            fn read(&self, _len: usize) -> Result<Vec<u8>, TransportError> {
                Ok(Vec::new())
            }
            fn strings(&self) -> DeviceStrings {
                DeviceStrings::default()
            }
            fn vendor_id(&self) -> u16 {
                0
            }
            fn product_id(&self) -> u16 {
                0
            }
        }

        let t = ChunkedTransport::new(Lossy);
        let err = t.write(&[0u8; 100]).unwrap_err();
        assert!(matches!(
            err,
            TransportError::LengthMismatch {
                expected: 100,
                actual: 98,
                ..
            }
        ));
    }

    #[test]
    fn test_read_truncates_final_page() {
        let rec = PageRecorder::new(false);
        for i in 0..3u8 {
            rec.pages.lock().unwrap().push_back(vec![i; REPORT_SIZE]);
        }
        let t = ChunkedTransport::new(rec);
        let data = t.read(130).unwrap();
        assert_eq!(data.len(), 130);
        assert_eq!(data[0], 0);
        assert_eq!(data[64], 1);
        assert_eq!(data[129], 2);
    }

    #[test]
    fn test_read_short_page_fails() {
        let rec = PageRecorder::new(false);
        rec.pages.lock().unwrap().push_back(vec![0; 10]);
        let t = ChunkedTransport::new(rec);
        assert!(matches!(
            t.read(10),
            Ok(ref d) if d.len() == 10
        ));

        let rec = PageRecorder::new(false);
        rec.pages.lock().unwrap().push_back(vec![0; 10]);
        let t = ChunkedTransport::new(rec);
        assert!(matches!(
            t.read(64),
            Err(TransportError::LengthMismatch { op: "read", .. })
        ));
    }

    #[test]
    fn test_empty_transfers() {
        let t = ChunkedTransport::new(PageRecorder::new(true));
        t.write(&[]).unwrap();
        assert!(t.read(0).unwrap().is_empty());
        assert!(t.get_ref().reports.lock().unwrap().is_empty());
    }
}
