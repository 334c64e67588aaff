//! M-Bus Manufacturer ID Conversion and Catalog
//!
//! Manufacturer IDs are 3-letter FLAG Association codes packed into 16 bits:
//!
//! ```text
//! id = (char1 - 64) * 32² + (char2 - 64) * 32 + (char3 - 64)
//! ```
//!
//! The ID travels little-endian on the wire. `ManufacturerId` keeps the raw
//! 16-bit value so that any received ID, valid letters or not, is encoded back
//! unchanged.
//!
//! ```rust
//! use mbus_master::vendors::manufacturer::ManufacturerId;
//!
//! let id = ManufacturerId::from_code("ABB").unwrap();
//! assert_eq!(id.raw(), 0x0442);
//! assert_eq!(id.code(), "ABB");
//! assert_eq!(id.name(), Some("ABB Group"));
//! ```

use crate::error::MBusError;
use once_cell::sync::Lazy;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Information about a known M-Bus manufacturer
#[derive(Debug, Clone, PartialEq)]
pub struct ManufacturerInfo {
    /// 3-letter manufacturer code (e.g., "LUG")
    pub code: &'static str,
    /// Full manufacturer name
    pub name: &'static str,
}

const CATALOG: &[(&str, &str)] = &[
    ("ABB", "ABB Group"),
    ("ACW", "Actaris (Itron)"),
    ("AMT", "Aquametro AG"),
    ("BHG", "Brunata Hürth"),
    ("CEN", "Example Manufacturer"),
    ("DZG", "DZG Metering"),
    ("EDC", "EDC Electronic Design"),
    ("EFE", "Engelmann Sensor"),
    ("ELS", "Elster (Honeywell)"),
    ("ELV", "Elvaco"),
    ("EMH", "EMH Energie-Messtechnik"),
    ("EMU", "EMU Electronic AG"),
    ("HYD", "Diehl Metering (Hydrometer)"),
    ("IST", "ista International"),
    ("ITW", "Itron"),
    ("KAM", "Kamstrup"),
    ("LUG", "Landis+Gyr"),
    ("NZR", "Neue Zählerwerke"),
    ("PAD", "PadMess GmbH"),
    ("QDS", "Qundis GmbH"),
    ("REL", "Relay GmbH"),
    ("SBC", "Saia-Burgess Controls"),
    ("SEN", "Sensus Metering Systems"),
    ("SIE", "Siemens"),
    ("SLB", "Schlumberger"),
    ("SON", "Sontex SA"),
    ("SPX", "Sensus (Spanner-Pollux)"),
    ("TCH", "Techem GmbH"),
    ("ZRM", "Minol Zenner Group"),
];

/// Database of known M-Bus manufacturers keyed by packed ID
pub static KNOWN_MANUFACTURERS: Lazy<HashMap<u16, ManufacturerInfo>> = Lazy::new(|| {
    CATALOG
        .iter()
        .filter_map(|&(code, name)| {
            ManufacturerId::from_code(code)
                .ok()
                .map(|id| (id.raw(), ManufacturerInfo { code, name }))
        })
        .collect()
});

/// Packed 16-bit manufacturer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ManufacturerId(u16);

impl ManufacturerId {
    /// Wraps a raw ID as received on the wire.
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Packs a 3-letter code (case insensitive).
    pub fn from_code(code: &str) -> Result<Self, MBusError> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(MBusError::InvalidManufacturer);
        }
        let packed = bytes.iter().fold(0u16, |acc, b| {
            (acc << 5) | u16::from(b.to_ascii_uppercase() - 64)
        });
        Ok(Self(packed))
    }

    pub fn from_le_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_le_bytes(bytes))
    }

    pub fn to_le_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Unpacks the 3-letter code. Values outside A-Z decode to whatever
    /// character the 5-bit group maps to.
    pub fn code(self) -> String {
        [10u16, 5, 0]
            .iter()
            .map(|shift| char::from((((self.0 >> shift) & 0x1F) as u8) + 64))
            .collect()
    }

    pub fn info(self) -> Option<&'static ManufacturerInfo> {
        KNOWN_MANUFACTURERS.get(&self.0)
    }

    pub fn name(self) -> Option<&'static str> {
        self.info().map(|info| info.name)
    }
}

impl fmt::Display for ManufacturerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

impl Serialize for ManufacturerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_known_codes() {
        assert_eq!(ManufacturerId::from_code("ABB").unwrap().raw(), 0x0442);
        assert_eq!(ManufacturerId::from_code("AMT").unwrap().raw(), 0x05B4);
        assert_eq!(ManufacturerId::from_code("ELS").unwrap().raw(), 0x1593);
        assert_eq!(ManufacturerId::from_code("lug").unwrap().raw(), 0x32A7);
    }

    #[test]
    fn rejects_malformed_codes() {
        assert_eq!(
            ManufacturerId::from_code("AB"),
            Err(MBusError::InvalidManufacturer)
        );
        assert_eq!(
            ManufacturerId::from_code("A1B"),
            Err(MBusError::InvalidManufacturer)
        );
    }

    #[test]
    fn wire_bytes_are_little_endian() {
        let id = ManufacturerId::from_le_bytes([0x42, 0x04]);
        assert_eq!(id.code(), "ABB");
        assert_eq!(id.to_le_bytes(), [0x42, 0x04]);
    }

    #[test]
    fn catalog_lookup() {
        let sbc = ManufacturerId::from_code("SBC").unwrap();
        assert_eq!(sbc.name(), Some("Saia-Burgess Controls"));
        assert_eq!(ManufacturerId::from_raw(0x0000).name(), None);
    }

    proptest::proptest! {
        #[test]
        fn any_raw_id_is_preserved(raw in proptest::num::u16::ANY) {
            let id = ManufacturerId::from_raw(raw);
            proptest::prop_assert_eq!(ManufacturerId::from_le_bytes(id.to_le_bytes()), id);
        }

        #[test]
        fn letter_codes_round_trip(code in "[A-Z]{3}") {
            let id = ManufacturerId::from_code(&code).unwrap();
            proptest::prop_assert_eq!(id.code(), code);
        }
    }
}
