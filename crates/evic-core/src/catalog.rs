//! Static device catalog.
//!
//! Maps the 4-character product ID stored in the data flash to a display
//! name, the product IDs whose firmware the device can also run, and the
//! logo dimensions it expects.

use crate::payload::logo::LogoFormat;

/// One known product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCatalogEntry {
    pub product_id: &'static str,
    pub name: &'static str,
    /// Other product IDs whose firmware is accepted.
    pub compatible: &'static [&'static str],
    /// Logo width and height, when the device shows a boot logo.
    pub logo: Option<(u8, u8)>,
}

impl DeviceCatalogEntry {
    /// Product IDs to look for in a firmware image, own ID first.
    pub fn candidate_ids(&self) -> Vec<&'static str> {
        std::iter::once(self.product_id)
            .chain(self.compatible.iter().copied())
            .collect()
    }

    /// Logo dimension rule for this device.
    pub fn logo_format(&self) -> Option<LogoFormat> {
        self.logo
            .map(|(width, height)| LogoFormat::Fixed { width, height })
    }
}

/// Product ID of the primary cross-flash family (eVic-VTC Mini).
pub const PRIMARY_FAMILY: &[u8; 4] = b"E052";

/// Product ID of the companion cross-flash family (Presa TC75W).
pub const COMPANION_FAMILY: &[u8; 4] = b"W007";

/// Primary family hardware revisions that must be relabelled before
/// accepting companion firmware.
pub const CROSS_FLASH_HW_VERSIONS: &[u32] = &[106, 108, 109, 111];

/// Hardware version the companion firmware accepts.
pub const CROSS_FLASH_HW_TARGET: u32 = 103;

pub static DEVICE_CATALOG: &[DeviceCatalogEntry] = &[
    DeviceCatalogEntry {
        product_id: "E052",
        name: "eVic-VTC Mini",
        compatible: &["W007"],
        logo: Some((64, 40)),
    },
    DeviceCatalogEntry {
        product_id: "W007",
        name: "Presa TC75W",
        compatible: &["E052"],
        logo: Some((64, 40)),
    },
    DeviceCatalogEntry {
        product_id: "E056",
        name: "CUBOID MINI",
        compatible: &[],
        logo: Some((64, 40)),
    },
    DeviceCatalogEntry {
        product_id: "E060",
        name: "Cuboid",
        compatible: &[],
        logo: Some((64, 40)),
    },
    DeviceCatalogEntry {
        product_id: "E083",
        name: "eGrip II",
        compatible: &[],
        logo: Some((64, 40)),
    },
    DeviceCatalogEntry {
        product_id: "M011",
        name: "iStick TC100W",
        compatible: &[],
        logo: None,
    },
    DeviceCatalogEntry {
        product_id: "M041",
        name: "iStick Pico",
        compatible: &[],
        logo: Some((64, 48)),
    },
    DeviceCatalogEntry {
        product_id: "W010",
        name: "Classic",
        compatible: &[],
        logo: None,
    },
    DeviceCatalogEntry {
        product_id: "W011",
        name: "Lite",
        compatible: &[],
        logo: None,
    },
    DeviceCatalogEntry {
        product_id: "W013",
        name: "Stout",
        compatible: &[],
        logo: None,
    },
    DeviceCatalogEntry {
        product_id: "W014",
        name: "Reuleaux RX200",
        compatible: &[],
        logo: None,
    },
];

/// Look up a product by its raw data flash ID.
pub fn lookup(product_id: &[u8]) -> Option<&'static DeviceCatalogEntry> {
    DEVICE_CATALOG
        .iter()
        .find(|e| e.product_id.as_bytes() == product_id)
}

/// Display name, or "Unknown device".
pub fn display_name(product_id: &[u8]) -> &'static str {
    lookup(product_id).map_or("Unknown device", |e| e.name)
}

/// Candidate firmware product IDs for a device. Unknown devices only match
/// their own ID.
pub fn candidate_ids(product_id: &[u8]) -> Vec<String> {
    match lookup(product_id) {
        Some(entry) => entry
            .candidate_ids()
            .into_iter()
            .map(str::to_string)
            .collect(),
        None => vec![String::from_utf8_lossy(product_id).into_owned()],
    }
}

/// Whether companion firmware on this device needs the hardware version
/// forced to [`CROSS_FLASH_HW_TARGET`].
pub fn needs_cross_flash_patch(product_id: &[u8], hw_version: u32, firmware: &[u8]) -> bool {
    product_id == PRIMARY_FAMILY
        && CROSS_FLASH_HW_VERSIONS.contains(&hw_version)
        && crate::payload::firmware::find(firmware, COMPANION_FAMILY).is_some()
}
