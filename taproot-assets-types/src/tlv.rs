use alloc::collections::BTreeMap;
use alloc::{format, vec, vec::Vec};
use bitcoin::io::{self as bitcoin_io, Read};

use crate::error::Error;

/// Largest value accepted for a single record.
pub const MAX_RECORD_SIZE: u64 = 16 << 20;

/// Records with a type this stream does not know about. Only odd types end up
/// here; they are re-emitted verbatim when the parent is encoded again.
pub type UnknownOddTypes = BTreeMap<u64, Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Type(pub u64);

impl Type {
    pub fn is_odd(self) -> bool {
        self.0 % 2 != 0
    }
    pub fn is_even(self) -> bool {
        self.0 % 2 == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    tlv_type: Type,
    value: Vec<u8>,
}

impl Record {
    pub fn tlv_type(&self) -> Type {
        self.tlv_type
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn into_value(self) -> Vec<u8> {
        self.value
    }

    pub fn value_reader(&self) -> bitcoin_io::Cursor<&[u8]> {
        bitcoin_io::Cursor::new(&self.value)
    }

    /// Interprets the value as a fixed size byte array.
    pub fn fixed<const N: usize>(&self) -> Result<[u8; N], Error> {
        self.value.as_slice().try_into().map_err(|_| {
            Error::InvalidTlvValue(
                self.tlv_type.0,
                format!("expected {} bytes, got {}", N, self.value.len()),
            )
        })
    }

    pub fn u8(&self) -> Result<u8, Error> {
        Ok(self.fixed::<1>()?[0])
    }

    pub fn u16_be(&self) -> Result<u16, Error> {
        Ok(u16::from_be_bytes(self.fixed()?))
    }

    pub fn u32_be(&self) -> Result<u32, Error> {
        Ok(u32::from_be_bytes(self.fixed()?))
    }

    /// Interprets the whole value as a single BigSize integer.
    pub fn bigsize(&self) -> Result<u64, Error> {
        let mut reader = self.value_reader();
        let value = read_bigsize(&mut reader)?;
        if (reader.position() as usize) != self.value.len() {
            return Err(Error::TrailingBytes("BigSize value"));
        }
        Ok(value)
    }

    /// Stores the record in `unknown` if it is odd, fails otherwise.
    pub fn keep_if_odd(self, unknown: &mut UnknownOddTypes) -> Result<(), Error> {
        if self.tlv_type.is_odd() {
            unknown.insert(self.tlv_type.0, self.value);
            Ok(())
        } else {
            // As per BOLT #1: even, unknown types are an error.
            Err(Error::UnknownTlvType(self.tlv_type.0))
        }
    }
}

pub struct Stream<R: Read> {
    reader: R,
    last_type: Option<u64>,
}

impl<R: Read> Stream<R> {
    pub fn new(reader: R) -> Self {
        Stream {
            reader,
            last_type: None,
        }
    }

    /// Reads the next record, returning `None` on a clean end of stream.
    pub fn next_record(&mut self) -> Result<Option<Record>, Error> {
        let mut first = [0u8; 1];
        if self.reader.read(&mut first)? == 0 {
            return Ok(None);
        }
        let tlv_type = read_bigsize_with_prefix(first[0], &mut self.reader)?;
        if let Some(previous) = self.last_type {
            if tlv_type <= previous {
                return Err(Error::OutOfOrderTlvType {
                    previous,
                    current: tlv_type,
                });
            }
        }
        self.last_type = Some(tlv_type);

        let length = read_bigsize(&mut self.reader).map_err(|e| {
            Error::TlvStream(format!("failed to read length of type {}: {}", tlv_type, e))
        })?;
        if length > MAX_RECORD_SIZE {
            return Err(Error::TlvStream(format!(
                "TLV record too large: {} bytes for type {}",
                length, tlv_type
            )));
        }

        let mut value = vec![0; length as usize];
        self.reader.read_exact(&mut value).map_err(|e| {
            Error::TlvStream(format!(
                "failed to read value of type {} (length {}): {}",
                tlv_type, length, e
            ))
        })?;
        Ok(Some(Record {
            tlv_type: Type(tlv_type),
            value,
        }))
    }
}

/// Collects records and writes them out in ascending type order.
#[derive(Debug, Default)]
pub struct Writer {
    records: BTreeMap<u64, Vec<u8>>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, tlv_type: Type, value: Vec<u8>) -> &mut Self {
        self.records.insert(tlv_type.0, value);
        self
    }

    pub fn unknown(&mut self, unknown: &UnknownOddTypes) -> &mut Self {
        for (tlv_type, value) in unknown {
            self.records
                .entry(*tlv_type)
                .or_insert_with(|| value.clone());
        }
        self
    }

    pub fn finish(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (tlv_type, value) in &self.records {
            write_bigsize(*tlv_type, &mut out);
            write_bigsize(value.len() as u64, &mut out);
            out.extend_from_slice(value);
        }
        out
    }
}

pub fn write_bigsize(value: u64, out: &mut Vec<u8>) {
    match value {
        0..=0xFC => out.push(value as u8),
        0xFD..=0xFFFF => {
            out.push(0xFD);
            out.extend_from_slice(&(value as u16).to_be_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            out.push(0xFE);
            out.extend_from_slice(&(value as u32).to_be_bytes());
        }
        _ => {
            out.push(0xFF);
            out.extend_from_slice(&value.to_be_bytes());
        }
    }
}

pub fn bigsize_bytes(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    write_bigsize(value, &mut out);
    out
}

pub fn read_bigsize<R: Read + ?Sized>(r: &mut R) -> Result<u64, Error> {
    let mut first = [0u8; 1];
    r.read_exact(&mut first)?;
    read_bigsize_with_prefix(first[0], r)
}

fn read_bigsize_with_prefix<R: Read + ?Sized>(prefix: u8, r: &mut R) -> Result<u64, Error> {
    match prefix {
        0xFD => {
            let value = u16::from_be_bytes(read_array(r)?) as u64;
            if value < 0xFD {
                return Err(Error::NonCanonicalVarInt);
            }
            Ok(value)
        }
        0xFE => {
            let value = u32::from_be_bytes(read_array(r)?) as u64;
            if value <= 0xFFFF {
                return Err(Error::NonCanonicalVarInt);
            }
            Ok(value)
        }
        0xFF => {
            let value = u64::from_be_bytes(read_array(r)?);
            if value <= 0xFFFF_FFFF {
                return Err(Error::NonCanonicalVarInt);
            }
            Ok(value)
        }
        byte => Ok(byte as u64),
    }
}

pub fn read_array<const N: usize, R: Read + ?Sized>(r: &mut R) -> Result<[u8; N], Error> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Writes `bytes` prefixed with its BigSize length.
pub fn write_var_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    write_bigsize(bytes.len() as u64, out);
    out.extend_from_slice(bytes);
}

pub fn read_var_bytes<R: Read + ?Sized>(r: &mut R, max: u64) -> Result<Vec<u8>, Error> {
    let len = read_bigsize(r)?;
    if len > max {
        return Err(Error::TlvStream(format!(
            "var bytes too large: {} > {}",
            len, max
        )));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_to_end<R: Read + ?Sized>(r: &mut R) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 512];
    loop {
        match r.read(&mut chunk)? {
            0 => break,
            n => out.extend_from_slice(&chunk[..n]),
        }
    }
    Ok(out)
}

/// Packs bits LSB first within each byte.
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, bit) in bits.iter().enumerate() {
        if *bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

pub fn unpack_bits(bytes: &[u8]) -> Vec<bool> {
    (0..bytes.len() * 8)
        .map(|i| (bytes[i / 8] >> (i % 8)) & 1 == 1)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigsize_boundaries() {
        for (value, len) in [
            (0u64, 1usize),
            (0xFC, 1),
            (0xFD, 3),
            (0xFFFF, 3),
            (0x1_0000, 5),
            (0xFFFF_FFFF, 5),
            (0x1_0000_0000, 9),
            (u64::MAX, 9),
        ] {
            let bytes = bigsize_bytes(value);
            assert_eq!(bytes.len(), len, "value {value}");
            assert_eq!(read_bigsize(&mut bytes.as_slice()).unwrap(), value);
        }
    }

    #[test]
    fn non_canonical_bigsize_rejected() {
        let bytes = [0xFDu8, 0x00, 0x10];
        assert!(matches!(
            read_bigsize(&mut bytes.as_slice()),
            Err(Error::NonCanonicalVarInt)
        ));
    }

    #[test]
    fn stream_rejects_out_of_order_types() {
        let bytes = [0x04u8, 0x01, 0xAA, 0x02, 0x01, 0xBB];
        let mut stream = Stream::new(&bytes[..]);
        assert!(stream.next_record().unwrap().is_some());
        assert!(matches!(
            stream.next_record(),
            Err(Error::OutOfOrderTlvType {
                previous: 4,
                current: 2
            })
        ));
    }

    #[test]
    fn stream_rejects_truncated_value() {
        let bytes = [0x01u8, 0x05, 0xAA];
        let mut stream = Stream::new(&bytes[..]);
        assert!(matches!(stream.next_record(), Err(Error::TlvStream(_))));
    }

    #[test]
    fn writer_interleaves_unknown_records() {
        let mut unknown = UnknownOddTypes::new();
        unknown.insert(3, vec![0x33]);
        let bytes = Writer::new()
            .record(Type(4), vec![0x44])
            .record(Type(0), vec![])
            .unknown(&unknown)
            .finish();
        assert_eq!(bytes, vec![0x00, 0x00, 0x03, 0x01, 0x33, 0x04, 0x01, 0x44]);
    }

    #[test]
    fn even_unknown_records_fail() {
        let mut unknown = UnknownOddTypes::new();
        let odd = Record {
            tlv_type: Type(7),
            value: vec![1],
        };
        let even = Record {
            tlv_type: Type(8),
            value: vec![1],
        };
        odd.keep_if_odd(&mut unknown).unwrap();
        assert!(matches!(
            even.keep_if_odd(&mut unknown),
            Err(Error::UnknownTlvType(8))
        ));
        assert_eq!(unknown.get(&7), Some(&vec![1]));
    }

    #[test]
    fn bits_pack_lsb_first() {
        let bits = [true, false, false, false, false, false, false, false, true];
        let packed = pack_bits(&bits);
        assert_eq!(packed, vec![0x01, 0x01]);
        assert_eq!(&unpack_bits(&packed)[..9], &bits);
    }
}
