mod reader;
mod writer;

pub use reader::{Reader, ReaderError};
pub use writer::Writer;

use crate::crypto::Hash;
use indexmap::IndexMap;
use std::{borrow::Cow, collections::HashSet, hash::Hash as StdHash};

// All types using this serializer share one binary convention:
// unsigned integers that are part of a payload body use uvarint (LEB128),
// fixed-width fields are big-endian.
pub trait Serializer {
    fn write(&self, writer: &mut Writer);

    fn read(reader: &mut Reader) -> Result<Self, ReaderError>
    where
        Self: Sized;

    fn size(&self) -> usize {
        let mut buffer = Vec::new();
        let mut writer = Writer::new(&mut buffer);
        self.write(&mut writer);
        writer.total_write()
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        let mut writer = Writer::new(&mut buffer);
        self.write(&mut writer);
        buffer
    }

    fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ReaderError>
    where
        Self: Sized,
    {
        let mut reader = Reader::new(bytes);
        let value = Self::read(&mut reader)?;
        if reader.size() != 0 {
            return Err(ReaderError::InvalidSize);
        }
        Ok(value)
    }

    fn from_hex(hex: &str) -> Result<Self, ReaderError>
    where
        Self: Sized,
    {
        let bytes = hex::decode(hex).map_err(|_| ReaderError::InvalidHex)?;
        Self::from_bytes(&bytes)
    }
}

impl Serializer for u8 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(*self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u8()
    }

    fn size(&self) -> usize {
        1
    }
}

impl Serializer for u64 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u64()
    }

    fn size(&self) -> usize {
        8
    }
}

impl Serializer for bool {
    fn write(&self, writer: &mut Writer) {
        writer.write_bool(*self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_bool()
    }

    fn size(&self) -> usize {
        1
    }
}

impl<T: Serializer> Serializer for Option<T> {
    fn write(&self, writer: &mut Writer) {
        match self {
            Some(value) => {
                writer.write_bool(true);
                value.write(writer);
            }
            None => writer.write_bool(false),
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        if reader.read_bool()? {
            Ok(Some(T::read(reader)?))
        } else {
            Ok(None)
        }
    }

    fn size(&self) -> usize {
        1 + self.as_ref().map(|v| v.size()).unwrap_or(0)
    }
}

impl<T: Serializer + Clone> Serializer for Cow<'_, T> {
    fn write(&self, writer: &mut Writer) {
        self.as_ref().write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Cow::Owned(T::read(reader)?))
    }

    fn size(&self) -> usize {
        self.as_ref().size()
    }
}

// Collections are length-prefixed with a uvarint
impl<T: Serializer> Serializer for Vec<T> {
    fn write(&self, writer: &mut Writer) {
        writer.write_uvarint(self.len() as u64);
        for item in self {
            item.write(writer);
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let count = reader.read_uvarint()?;
        if count > reader.size() as u64 {
            return Err(ReaderError::InvalidSize);
        }

        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            items.push(T::read(reader)?);
        }
        Ok(items)
    }

    fn size(&self) -> usize {
        crate::serializer::uvarint_size(self.len() as u64)
            + self.iter().map(|i| i.size()).sum::<usize>()
    }
}

impl<K: Serializer + StdHash + Eq, V: Serializer> Serializer for IndexMap<K, V> {
    fn write(&self, writer: &mut Writer) {
        writer.write_uvarint(self.len() as u64);
        for (key, value) in self {
            key.write(writer);
            value.write(writer);
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let count = reader.read_uvarint()?;
        if count > reader.size() as u64 {
            return Err(ReaderError::InvalidSize);
        }

        let mut map = IndexMap::with_capacity(count as usize);
        for _ in 0..count {
            let key = K::read(reader)?;
            let value = V::read(reader)?;
            if map.insert(key, value).is_some() {
                return Err(ReaderError::InvalidValue);
            }
        }
        Ok(map)
    }

    fn size(&self) -> usize {
        uvarint_size(self.len() as u64)
            + self.iter().map(|(k, v)| k.size() + v.size()).sum::<usize>()
    }
}

impl<T: Serializer + StdHash + Eq> Serializer for HashSet<T> {
    fn write(&self, writer: &mut Writer) {
        writer.write_uvarint(self.len() as u64);
        for item in self {
            item.write(writer);
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let count = reader.read_uvarint()?;
        if count > reader.size() as u64 {
            return Err(ReaderError::InvalidSize);
        }

        let mut set = HashSet::with_capacity(count as usize);
        for _ in 0..count {
            if !set.insert(T::read(reader)?) {
                return Err(ReaderError::InvalidValue);
            }
        }
        Ok(set)
    }
}

impl Serializer for Hash {
    fn write(&self, writer: &mut Writer) {
        writer.write_hash(self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_hash()
    }

    fn size(&self) -> usize {
        crate::crypto::HASH_SIZE
    }
}

// Number of bytes the uvarint encoding of `value` occupies
pub fn uvarint_size(value: u64) -> usize {
    let mut value = value;
    let mut size = 1;
    while value >= 0x80 {
        value >>= 7;
        size += 1;
    }
    size
}
