//! Transport layer abstraction.

pub mod chunked;
pub mod mock;
pub mod nusb;
pub mod traits;

pub use chunked::ChunkedTransport;
pub use mock::{MockConnector, MockDeviceState, MockHid};
pub use nusb::{NusbConnector, NusbHid};
pub use traits::{DeviceStrings, HidConnector, HidTransport, TransportError};
