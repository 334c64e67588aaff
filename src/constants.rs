//! M-Bus Protocol Constants
//!
//! This module defines constants used in the M-Bus protocol implementation,
//! based on the EN 13757-2 and EN 13757-3 standards.

// ----------------------------------------------------------------------------
// Frame markers
// ----------------------------------------------------------------------------

/// Single character acknowledgment
pub const MBUS_FRAME_ACK: u8 = 0xE5;

/// Start byte of a short frame
pub const MBUS_FRAME_SHORT_START: u8 = 0x10;

/// Start byte of a control or long frame (sent twice)
pub const MBUS_FRAME_LONG_START: u8 = 0x68;

/// Stop byte of every multi-byte frame
pub const MBUS_FRAME_STOP: u8 = 0x16;

/// Length field value of a control frame (C, A, CI)
pub const MBUS_FRAME_CONTROL_LENGTH: u8 = 3;

/// Maximum number of application data bytes in a long frame
pub const MBUS_FRAME_DATA_LENGTH_MAX: usize = 252;

/// Longest possible frame on the wire in bytes
pub const MBUS_FRAME_LENGTH_MAX: usize = MBUS_FRAME_DATA_LENGTH_MAX + 9;

// ----------------------------------------------------------------------------
// Addresses
// ----------------------------------------------------------------------------

/// Address reserved for unconfigured slaves
pub const MBUS_ADDRESS_UNCONFIGURED: u8 = 0x00;

/// Network layer (secondary addressing) address
pub const MBUS_ADDRESS_NETWORK_LAYER: u8 = 0xFD;

/// Broadcast, all slaves reply
pub const MBUS_ADDRESS_BROADCAST_REPLY: u8 = 0xFE;

/// Broadcast, no slave replies
pub const MBUS_ADDRESS_BROADCAST_NOREPLY: u8 = 0xFF;

// ----------------------------------------------------------------------------
// Control field
// ----------------------------------------------------------------------------

// Control masks (full control bytes for common commands)
pub const MBUS_CONTROL_MASK_SND_NKE: u8 = 0x40;
pub const MBUS_CONTROL_MASK_SND_UD: u8 = 0x53; // includes DIR M2S and FCV
pub const MBUS_CONTROL_MASK_REQ_UD2: u8 = 0x5B; // includes DIR M2S and FCV
pub const MBUS_CONTROL_MASK_REQ_UD1: u8 = 0x5A; // includes DIR M2S and FCV
pub const MBUS_CONTROL_MASK_RSP_UD: u8 = 0x08; // S2M response

// Control flag bits
pub const MBUS_CONTROL_MASK_FCB: u8 = 0x20;
pub const MBUS_CONTROL_MASK_FCV: u8 = 0x10;
pub const MBUS_CONTROL_MASK_ACD: u8 = 0x20;
pub const MBUS_CONTROL_MASK_DFC: u8 = 0x10;
pub const MBUS_CONTROL_MASK_DIR_M2S: u8 = 0x40;
pub const MBUS_CONTROL_MASK_DIR_S2M: u8 = 0x00;
pub const MBUS_CONTROL_MASK_FUNCTION: u8 = 0x0F;

// Control information (CI) codes
pub const MBUS_CONTROL_INFO_DATA_SEND: u8 = 0x51;
pub const MBUS_CONTROL_INFO_SELECT_SLAVE: u8 = 0x52;
pub const MBUS_CONTROL_INFO_ERROR_GENERAL: u8 = 0x70;
pub const MBUS_CONTROL_INFO_RESP_VARIABLE: u8 = 0x72;
pub const MBUS_CONTROL_INFO_RESP_FIXED: u8 = 0x73;

// ----------------------------------------------------------------------------
// Variable data structure
// ----------------------------------------------------------------------------

/// Length of the fixed header in front of the data records
pub const MBUS_DATA_VARIABLE_HEADER_LENGTH: usize = 12;

/// Length of a secondary address in a selection frame
pub const MBUS_SECONDARY_ADDRESS_LENGTH: usize = 8;

/// DIF (Data Information Field) mask for data length
pub const MBUS_DATA_RECORD_DIF_MASK_DATA: u8 = 0x0F;

/// DIF mask for function
pub const MBUS_DATA_RECORD_DIF_MASK_FUNCTION: u8 = 0x30;

/// DIF mask for storage number
pub const MBUS_DATA_RECORD_DIF_MASK_STORAGE_NO: u8 = 0x40;

/// DIFE (Data Information Field Extension) mask for storage number
pub const MBUS_DATA_RECORD_DIFE_MASK_STORAGE_NO: u8 = 0x0F;

/// DIFE mask for tariff
pub const MBUS_DATA_RECORD_DIFE_MASK_TARIFF: u8 = 0x30;

/// DIFE mask for device (subunit)
pub const MBUS_DATA_RECORD_DIFE_MASK_DEVICE: u8 = 0x40;

/// Maximum number of DIFE bytes in one record
pub const MBUS_DATA_RECORD_DIFE_MAX: usize = 10;

/// Maximum number of VIFE bytes in one record
pub const MBUS_DATA_RECORD_VIFE_MAX: usize = 10;

/// DIF idle filler
pub const MBUS_DIB_DIF_IDLE_FILLER: u8 = 0x2F;

/// DIF manufacturer specific
pub const MBUS_DIB_DIF_MANUFACTURER_SPECIFIC: u8 = 0x0F;

/// DIF more records follow
pub const MBUS_DIB_DIF_MORE_RECORDS_FOLLOW: u8 = 0x1F;

/// DIF global readout request
pub const MBUS_DIB_DIF_GLOBAL_READOUT: u8 = 0x7F;

/// DIF extension bit
pub const MBUS_DIB_DIF_EXTENSION_BIT: u8 = 0x80;

/// VIF without extension
pub const MBUS_DIB_VIF_WITHOUT_EXTENSION: u8 = 0x7F;

/// VIF extension bit
pub const MBUS_DIB_VIF_EXTENSION_BIT: u8 = 0x80;

/// VIF selecting the first extension table
pub const MBUS_DIB_VIF_EXTENSION_FB: u8 = 0xFB;

/// VIF selecting the second extension table
pub const MBUS_DIB_VIF_EXTENSION_FD: u8 = 0xFD;

/// VIF with plain-text unit (extension bit stripped)
pub const MBUS_DIB_VIF_PLAIN_TEXT: u8 = 0x7C;

/// VIF "any" (extension bit stripped)
pub const MBUS_DIB_VIF_ANY: u8 = 0x7E;

/// VIF manufacturer specific (extension bit stripped)
pub const MBUS_DIB_VIF_MANUFACTURER_SPECIFIC: u8 = 0x7F;

/// Highest LVAR value introducing a text string
pub const MBUS_LVAR_TEXT_MAX: u8 = 0xBF;
