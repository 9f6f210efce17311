use crate::crypto::{Hash, HASH_SIZE};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Invalid size")]
    InvalidSize,
    #[error("Invalid value")]
    InvalidValue,
    #[error("Invalid hex")]
    InvalidHex,
    #[error("Exceeds max size")]
    ExceedsMaxSize,
    #[error("Error on try into")]
    ErrorTryInto,
}

// Reader walks a borrowed buffer, every read is bounds checked
pub struct Reader<'a> {
    bytes: &'a [u8],
    total: usize,
}

impl<'a> Reader<'a> {
    pub const fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, total: 0 }
    }

    pub fn skip(&mut self, count: usize) -> Result<(), ReaderError> {
        if count > self.size() {
            return Err(ReaderError::InvalidSize);
        }
        self.total += count;
        Ok(())
    }

    pub fn read_bool(&mut self) -> Result<bool, ReaderError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(ReaderError::InvalidValue),
        }
    }

    pub fn read_bytes_ref(&mut self, count: usize) -> Result<&'a [u8], ReaderError> {
        if count > self.size() {
            return Err(ReaderError::InvalidSize);
        }

        let bytes = &self.bytes[self.total..self.total + count];
        self.total += count;
        Ok(bytes)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, ReaderError> {
        Ok(self.read_bytes_ref(count)?.to_vec())
    }

    pub fn read_bytes_32(&mut self) -> Result<[u8; 32], ReaderError> {
        let bytes = self.read_bytes_ref(32)?;
        bytes.try_into().map_err(|_| ReaderError::ErrorTryInto)
    }

    // Length-prefixed (uvarint) byte string, capped by the caller
    pub fn read_var_bytes(&mut self, max: usize) -> Result<Vec<u8>, ReaderError> {
        let count = self.read_uvarint()? as usize;
        if count > max {
            return Err(ReaderError::ExceedsMaxSize);
        }
        self.read_bytes(count)
    }

    pub fn read_hash(&mut self) -> Result<Hash, ReaderError> {
        let bytes = self.read_bytes_ref(HASH_SIZE)?;
        Ok(Hash::new(
            bytes.try_into().map_err(|_| ReaderError::ErrorTryInto)?,
        ))
    }

    pub fn read_u8(&mut self) -> Result<u8, ReaderError> {
        if self.size() == 0 {
            return Err(ReaderError::InvalidSize);
        }
        let byte = self.bytes[self.total];
        self.total += 1;
        Ok(byte)
    }

    pub fn read_u16(&mut self) -> Result<u16, ReaderError> {
        let bytes = self.read_bytes_ref(2)?;
        Ok(u16::from_be_bytes(
            bytes.try_into().map_err(|_| ReaderError::ErrorTryInto)?,
        ))
    }

    pub fn read_u32(&mut self) -> Result<u32, ReaderError> {
        let bytes = self.read_bytes_ref(4)?;
        Ok(u32::from_be_bytes(
            bytes.try_into().map_err(|_| ReaderError::ErrorTryInto)?,
        ))
    }

    pub fn read_u64(&mut self) -> Result<u64, ReaderError> {
        let bytes = self.read_bytes_ref(8)?;
        Ok(u64::from_be_bytes(
            bytes.try_into().map_err(|_| ReaderError::ErrorTryInto)?,
        ))
    }

    pub fn read_u128(&mut self) -> Result<u128, ReaderError> {
        let bytes = self.read_bytes_ref(16)?;
        Ok(u128::from_be_bytes(
            bytes.try_into().map_err(|_| ReaderError::ErrorTryInto)?,
        ))
    }

    // LEB128 unsigned decoding, rejects encodings that overflow a u64
    pub fn read_uvarint(&mut self) -> Result<u64, ReaderError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift == 63 && byte > 1 {
                return Err(ReaderError::InvalidValue);
            }

            value |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }

            shift += 7;
            if shift > 63 {
                return Err(ReaderError::InvalidValue);
            }
        }
    }

    pub fn read_string_with_size(&mut self, size: usize) -> Result<String, ReaderError> {
        let bytes = self.read_bytes(size)?;
        String::from_utf8(bytes).map_err(|_| ReaderError::InvalidValue)
    }

    pub fn read_string(&mut self, max: usize) -> Result<String, ReaderError> {
        let size = self.read_uvarint()? as usize;
        if size > max {
            return Err(ReaderError::ExceedsMaxSize);
        }
        self.read_string_with_size(size)
    }

    // Remaining unread bytes
    pub fn size(&self) -> usize {
        self.bytes.len() - self.total
    }

    pub fn total_size(&self) -> usize {
        self.bytes.len()
    }

    pub fn total_read(&self) -> usize {
        self.total
    }
}
