//! `DataValue`: a Variant plus status and timestamp metadata (spec.md §4.1).
//!
//! The leading byte is a presence bitmap over six optional fields rather
//! than a type tag: bit 0 value, bit 1 status, bit 2 source timestamp,
//! bit 3 server timestamp, bit 4 source picoseconds, bit 5 server
//! picoseconds.

use super::primitives::{Reader, Writer};
use super::variant::Variant;
use crate::core::{CodecError, StatusCode};

const HAS_VALUE: u8 = 0x01;
const HAS_STATUS: u8 = 0x02;
const HAS_SOURCE_TIMESTAMP: u8 = 0x04;
const HAS_SERVER_TIMESTAMP: u8 = 0x08;
const HAS_SOURCE_PICOSECONDS: u8 = 0x10;
const HAS_SERVER_PICOSECONDS: u8 = 0x20;

/// A value sample together with the status and timestamps OPC UA services
/// attach to attribute reads.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    /// The sampled value, if any.
    pub value: Option<Variant>,
    /// The status at the time of the sample.
    pub status: Option<StatusCode>,
    /// Timestamp assigned by the value's source.
    pub source_timestamp: Option<i64>,
    /// Timestamp assigned by the server on receipt.
    pub server_timestamp: Option<i64>,
    /// Sub-100ns precision for `source_timestamp`.
    pub source_picoseconds: Option<u16>,
    /// Sub-100ns precision for `server_timestamp`.
    pub server_picoseconds: Option<u16>,
}

impl DataValue {
    /// A DataValue carrying only a value, `Good` status implied.
    pub fn of(value: Variant) -> Self {
        Self {
            value: Some(value),
            ..Default::default()
        }
    }

    fn presence_bitmap(&self) -> u8 {
        let mut mask = 0u8;
        if self.value.is_some() {
            mask |= HAS_VALUE;
        }
        if self.status.is_some() {
            mask |= HAS_STATUS;
        }
        if self.source_timestamp.is_some() {
            mask |= HAS_SOURCE_TIMESTAMP;
        }
        if self.server_timestamp.is_some() {
            mask |= HAS_SERVER_TIMESTAMP;
        }
        if self.source_picoseconds.is_some() {
            mask |= HAS_SOURCE_PICOSECONDS;
        }
        if self.server_picoseconds.is_some() {
            mask |= HAS_SERVER_PICOSECONDS;
        }
        mask
    }

    /// Encode this DataValue.
    pub fn encode(&self, w: &mut Writer) -> Result<(), CodecError> {
        let mask = self.presence_bitmap();
        w.write_u8(mask)?;
        if let Some(v) = &self.value {
            v.encode(w)?;
        }
        if let Some(s) = self.status {
            w.write_u32(s.as_wire_code())?;
        }
        if let Some(t) = self.source_timestamp {
            w.write_date_time(t)?;
        }
        if let Some(t) = self.server_timestamp {
            w.write_date_time(t)?;
        }
        if let Some(p) = self.source_picoseconds {
            w.write_u16(p)?;
        }
        if let Some(p) = self.server_picoseconds {
            w.write_u16(p)?;
        }
        Ok(())
    }

    /// Decode a DataValue.
    pub fn decode(r: &mut Reader) -> Result<Self, CodecError> {
        let mask = r.read_u8()?;
        let mut dv = DataValue::default();
        if mask & HAS_VALUE != 0 {
            dv.value = Some(Variant::decode(r)?);
        }
        if mask & HAS_STATUS != 0 {
            dv.status = Some(StatusCode::from_wire_code(r.read_u32()?));
        }
        if mask & HAS_SOURCE_TIMESTAMP != 0 {
            dv.source_timestamp = Some(r.read_date_time()?);
        }
        if mask & HAS_SERVER_TIMESTAMP != 0 {
            dv.server_timestamp = Some(r.read_date_time()?);
        }
        if mask & HAS_SOURCE_PICOSECONDS != 0 {
            dv.source_picoseconds = Some(r.read_u16()?);
        }
        if mask & HAS_SERVER_PICOSECONDS != 0 {
            dv.server_picoseconds = Some(r.read_u16()?);
        }
        Ok(dv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::variant::Scalar;

    fn roundtrip(dv: DataValue) {
        let mut w = Writer::new();
        dv.encode(&mut w).unwrap();
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(DataValue::decode(&mut r).unwrap(), dv);
        r.finish().unwrap();
    }

    #[test]
    fn empty_data_value_is_one_byte() {
        let mut w = Writer::new();
        DataValue::default().encode(&mut w).unwrap();
        assert_eq!(w.into_bytes(), vec![0]);
    }

    #[test]
    fn value_only_roundtrip() {
        roundtrip(DataValue::of(Variant::Scalar(Scalar::Int32(7))));
    }

    #[test]
    fn full_roundtrip() {
        roundtrip(DataValue {
            value: Some(Variant::Scalar(Scalar::Boolean(true))),
            status: Some(StatusCode::BadTypeMismatch),
            source_timestamp: Some(132_223_104_000_000_000),
            server_timestamp: Some(132_223_104_000_000_000),
            source_picoseconds: Some(5),
            server_picoseconds: Some(9),
        });
    }

    #[test]
    fn status_only_roundtrip() {
        roundtrip(DataValue {
            status: Some(StatusCode::BadNodeIdUnknown),
            ..Default::default()
        });
    }
}
