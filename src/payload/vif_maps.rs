//! VIF Lookup Tables
//!
//! Static tables for the primary VIF codes and the two extension tables
//! selected by VIF `0xFD` and `0xFB`, as defined in EN 13757-3. Table keys are
//! the code with the extension bit stripped. The tables are built once on
//! first use and shared by every decoder.

use crate::payload::vif::VifInfo;
use once_cell::sync::Lazy;
use std::collections::HashMap;

type VifTable = HashMap<u8, VifInfo>;

fn insert(map: &mut VifTable, code: u8, quantity: &'static str, unit: &'static str, exponent: i8) {
    map.insert(
        code,
        VifInfo {
            quantity,
            unit,
            exponent,
        },
    );
}

/// Inserts `first..=last`, the exponent growing by one per code from `offset`.
fn insert_range(
    map: &mut VifTable,
    first: u8,
    last: u8,
    quantity: &'static str,
    unit: &'static str,
    offset: i8,
) {
    for code in first..=last {
        insert(map, code, quantity, unit, (code - first) as i8 + offset);
    }
}

/// Inserts four codes whose low two bits select seconds, minutes, hours, days.
fn insert_durations(map: &mut VifTable, first: u8, quantity: &'static str) {
    for (i, unit) in ["s", "min", "h", "d"].into_iter().enumerate() {
        insert(map, first + i as u8, quantity, unit, 0);
    }
}

/// Primary VIF table (codes 0x00-0x7A).
pub static PRIMARY_VIF: Lazy<VifTable> = Lazy::new(|| {
    let mut map = HashMap::new();
    insert_range(&mut map, 0x00, 0x07, "Energy", "Wh", -3);
    insert_range(&mut map, 0x08, 0x0F, "Energy", "J", 0);
    insert_range(&mut map, 0x10, 0x17, "Volume", "m³", -6);
    insert_range(&mut map, 0x18, 0x1F, "Mass", "kg", -3);
    insert_durations(&mut map, 0x20, "On time");
    insert_durations(&mut map, 0x24, "Operating time");
    insert_range(&mut map, 0x28, 0x2F, "Power", "W", -3);
    insert_range(&mut map, 0x30, 0x37, "Power", "J/h", 0);
    insert_range(&mut map, 0x38, 0x3F, "Volume flow", "m³/h", -6);
    insert_range(&mut map, 0x40, 0x47, "Volume flow", "m³/min", -7);
    insert_range(&mut map, 0x48, 0x4F, "Volume flow", "m³/s", -9);
    insert_range(&mut map, 0x50, 0x57, "Mass flow", "kg/h", -3);
    insert_range(&mut map, 0x58, 0x5B, "Flow temperature", "°C", -3);
    insert_range(&mut map, 0x5C, 0x5F, "Return temperature", "°C", -3);
    insert_range(&mut map, 0x60, 0x63, "Temperature difference", "K", -3);
    insert_range(&mut map, 0x64, 0x67, "External temperature", "°C", -3);
    insert_range(&mut map, 0x68, 0x6B, "Pressure", "bar", -3);
    insert(&mut map, 0x6C, "Date", "", 0);
    insert(&mut map, 0x6D, "Date and time", "", 0);
    insert(&mut map, 0x6E, "Units for H.C.A.", "", 0);
    insert_durations(&mut map, 0x70, "Averaging duration");
    insert_durations(&mut map, 0x74, "Actuality duration");
    insert(&mut map, 0x78, "Fabrication number", "", 0);
    insert(&mut map, 0x79, "Enhanced identification", "", 0);
    insert(&mut map, 0x7A, "Bus address", "", 0);
    map
});

/// Extension table selected by VIF 0xFD.
pub static VIF_FD_TABLE: Lazy<VifTable> = Lazy::new(|| {
    let mut map = HashMap::new();
    insert_range(&mut map, 0x00, 0x03, "Credit", "currency units", -3);
    insert_range(&mut map, 0x04, 0x07, "Debit", "currency units", -3);
    for (code, quantity) in [
        (0x08, "Access number"),
        (0x09, "Medium"),
        (0x0A, "Manufacturer"),
        (0x0B, "Parameter set identification"),
        (0x0C, "Model / version"),
        (0x0D, "Hardware version"),
        (0x0E, "Firmware version"),
        (0x0F, "Software version"),
        (0x10, "Customer location"),
        (0x11, "Customer"),
        (0x12, "Access code user"),
        (0x13, "Access code operator"),
        (0x14, "Access code system operator"),
        (0x15, "Access code developer"),
        (0x16, "Password"),
        (0x17, "Error flags"),
        (0x18, "Error mask"),
        (0x1A, "Digital output"),
        (0x1B, "Digital input"),
        (0x20, "First storage number for cyclic storage"),
        (0x21, "Last storage number for cyclic storage"),
        (0x22, "Size of storage block"),
        (0x3A, "Dimensionless"),
        (0x60, "Reset counter"),
        (0x61, "Cumulation counter"),
        (0x62, "Control signal"),
        (0x63, "Day of week"),
        (0x64, "Week number"),
        (0x65, "Time point of day change"),
        (0x66, "State of parameter activation"),
        (0x67, "Special supplier information"),
        (0x70, "Date and time of battery change"),
    ] {
        insert(&mut map, code, quantity, "", 0);
    }
    insert(&mut map, 0x1C, "Baud rate", "baud", 0);
    insert(&mut map, 0x1D, "Response delay time", "bit times", 0);
    insert(&mut map, 0x1E, "Retry", "", 0);
    insert_durations(&mut map, 0x24, "Storage interval");
    insert(&mut map, 0x28, "Storage interval", "months", 0);
    insert(&mut map, 0x29, "Storage interval", "years", 0);
    insert_durations(&mut map, 0x2C, "Duration since last readout");
    insert(&mut map, 0x30, "Start of tariff", "", 0);
    insert(&mut map, 0x31, "Duration of tariff", "min", 0);
    insert(&mut map, 0x32, "Duration of tariff", "h", 0);
    insert(&mut map, 0x33, "Duration of tariff", "d", 0);
    insert_durations(&mut map, 0x34, "Period of tariff");
    insert(&mut map, 0x38, "Period of tariff", "months", 0);
    insert(&mut map, 0x39, "Period of tariff", "years", 0);
    insert_range(&mut map, 0x40, 0x4F, "Voltage", "V", -9);
    insert_range(&mut map, 0x50, 0x5F, "Current", "A", -12);
    for (i, unit) in ["h", "d", "months", "years"].into_iter().enumerate() {
        insert(&mut map, 0x68 + i as u8, "Duration since last cumulation", unit, 0);
        insert(&mut map, 0x6C + i as u8, "Operating time battery", unit, 0);
    }
    map
});

/// Extension table selected by VIF 0xFB.
pub static VIF_FB_TABLE: Lazy<VifTable> = Lazy::new(|| {
    let mut map = HashMap::new();
    insert_range(&mut map, 0x00, 0x01, "Energy", "Wh", 5);
    insert_range(&mut map, 0x08, 0x09, "Energy", "J", 8);
    insert_range(&mut map, 0x10, 0x11, "Volume", "m³", 2);
    insert_range(&mut map, 0x18, 0x19, "Mass", "kg", 5);
    insert(&mut map, 0x21, "Volume", "ft³", -1);
    insert(&mut map, 0x22, "Volume", "US gal", -1);
    insert(&mut map, 0x23, "Volume", "US gal", 0);
    insert(&mut map, 0x24, "Volume flow", "US gal/min", -3);
    insert(&mut map, 0x25, "Volume flow", "US gal/min", 0);
    insert(&mut map, 0x26, "Volume flow", "US gal/h", 0);
    insert_range(&mut map, 0x28, 0x29, "Power", "W", 5);
    insert_range(&mut map, 0x30, 0x31, "Power", "J/h", 8);
    insert_range(&mut map, 0x58, 0x5B, "Flow temperature", "°F", -3);
    insert_range(&mut map, 0x5C, 0x5F, "Return temperature", "°F", -3);
    insert_range(&mut map, 0x60, 0x63, "Temperature difference", "°F", -3);
    insert_range(&mut map, 0x64, 0x67, "External temperature", "°F", -3);
    insert_range(&mut map, 0x70, 0x73, "Cold / warm temperature limit", "°F", -3);
    insert_range(&mut map, 0x74, 0x77, "Cold / warm temperature limit", "°C", -3);
    insert_range(&mut map, 0x78, 0x7F, "Cumulative count max power", "W", -3);
    map
});

pub fn lookup_primary_vif(code: u8) -> Option<VifInfo> {
    PRIMARY_VIF.get(&(code & 0x7F)).copied()
}

pub fn lookup_vife_fd(code: u8) -> Option<VifInfo> {
    VIF_FD_TABLE.get(&(code & 0x7F)).copied()
}

pub fn lookup_vife_fb(code: u8) -> Option<VifInfo> {
    VIF_FB_TABLE.get(&(code & 0x7F)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_energy_and_volume() {
        let info = lookup_primary_vif(0x06).unwrap();
        assert_eq!((info.quantity, info.unit, info.exponent), ("Energy", "Wh", 3));
        let info = lookup_primary_vif(0x13).unwrap();
        assert_eq!((info.unit, info.exponent), ("m³", -3));
    }

    #[test]
    fn extension_bit_is_ignored() {
        assert_eq!(lookup_primary_vif(0x86), lookup_primary_vif(0x06));
    }

    #[test]
    fn temperatures_and_durations() {
        let info = lookup_primary_vif(0x62).unwrap();
        assert_eq!((info.unit, info.exponent), ("K", -1));
        let info = lookup_primary_vif(0x22).unwrap();
        assert_eq!((info.quantity, info.unit), ("On time", "h"));
    }

    #[test]
    fn reserved_codes_are_absent() {
        assert!(lookup_primary_vif(0x6F).is_none());
        assert!(lookup_vife_fd(0x7F).is_none());
        assert!(lookup_vife_fb(0x02).is_none());
    }

    #[test]
    fn extension_tables() {
        assert_eq!(lookup_vife_fd(0x17).unwrap().quantity, "Error flags");
        let volts = lookup_vife_fd(0x48).unwrap();
        assert_eq!((volts.unit, volts.exponent), ("V", -1));
        let mwh = lookup_vife_fb(0x01).unwrap();
        assert_eq!((mwh.unit, mwh.exponent), ("Wh", 6));
    }
}
