//! The payload module contains the application layer: variable data records,
//! their value encodings and unit tables, and the RSP_UD response structure.

pub mod data_encoding;
pub mod record;
pub mod user_data;
pub mod vif;
pub mod vif_maps;

pub use record::{
    decode_data_block, decode_record, encode_data_block, DataBlock, DataInformationBlock,
    DataRecord, DataValue, RecordFunction,
};
pub use user_data::{StatusFlags, UserDataResponse};
pub use vif::{StandardUnits, UnitResolver, ValueInformationBlock, VifCode, VifInfo};
