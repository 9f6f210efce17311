use crate::{
    config::{
        MAX_TOKEN_DECIMAL_SEPARATOR, MAX_TOKEN_DESCRIPTION_LENGTH, MAX_TOKEN_NAME_LENGTH,
        MAX_TOKEN_TICKER_LENGTH,
    },
    crypto::PublicKeyHash,
    serializer::{uvarint_size, Reader, ReaderError, Serializer, Writer},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tokens are keyed by a 20-byte hash; the empty key aliases the
/// native token.
pub type TokenHash = PublicKeyHash;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid token name")]
    InvalidName,
    #[error("Invalid token ticker")]
    InvalidTicker,
    #[error("Invalid token description")]
    InvalidDescription,
    #[error("Invalid decimal separator")]
    InvalidDecimalSeparator,
    #[error("Supply exceeds max supply")]
    SupplyExceeded,
    #[error("Supply underflow")]
    SupplyUnderflow,
}

/// Token metadata. Immutable after creation except for `supply`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub name: String,
    pub ticker: String,
    pub decimal_separator: u8,
    pub description: String,
    pub supply: u64,
    pub max_supply: u64,
}

impl Token {
    pub fn validate(&self) -> Result<(), TokenError> {
        if self.name.is_empty() || self.name.len() > MAX_TOKEN_NAME_LENGTH {
            return Err(TokenError::InvalidName);
        }
        if self.ticker.is_empty()
            || self.ticker.len() > MAX_TOKEN_TICKER_LENGTH
            || !self.ticker.chars().all(|c| c.is_ascii_uppercase())
        {
            return Err(TokenError::InvalidTicker);
        }
        if self.description.len() > MAX_TOKEN_DESCRIPTION_LENGTH {
            return Err(TokenError::InvalidDescription);
        }
        if self.decimal_separator > MAX_TOKEN_DECIMAL_SEPARATOR {
            return Err(TokenError::InvalidDecimalSeparator);
        }
        if self.supply > self.max_supply {
            return Err(TokenError::SupplyExceeded);
        }
        Ok(())
    }

    pub fn add_supply(&mut self, amount: u64) -> Result<(), TokenError> {
        let supply = self
            .supply
            .checked_add(amount)
            .ok_or(TokenError::SupplyExceeded)?;
        if supply > self.max_supply {
            return Err(TokenError::SupplyExceeded);
        }
        self.supply = supply;
        Ok(())
    }

    pub fn sub_supply(&mut self, amount: u64) -> Result<(), TokenError> {
        self.supply = self
            .supply
            .checked_sub(amount)
            .ok_or(TokenError::SupplyUnderflow)?;
        Ok(())
    }
}

impl Serializer for Token {
    fn write(&self, writer: &mut Writer) {
        writer.write_string(&self.name);
        writer.write_string(&self.ticker);
        writer.write_u8(self.decimal_separator);
        writer.write_string(&self.description);
        writer.write_uvarint(self.supply);
        writer.write_uvarint(self.max_supply);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            name: reader.read_string(MAX_TOKEN_NAME_LENGTH)?,
            ticker: reader.read_string(MAX_TOKEN_TICKER_LENGTH)?,
            decimal_separator: reader.read_u8()?,
            description: reader.read_string(MAX_TOKEN_DESCRIPTION_LENGTH)?,
            supply: reader.read_uvarint()?,
            max_supply: reader.read_uvarint()?,
        })
    }

    fn size(&self) -> usize {
        uvarint_size(self.name.len() as u64)
            + self.name.len()
            + uvarint_size(self.ticker.len() as u64)
            + self.ticker.len()
            + 1
            + uvarint_size(self.description.len() as u64)
            + self.description.len()
            + uvarint_size(self.supply)
            + uvarint_size(self.max_supply)
    }
}

/// Native token descriptor, created at genesis
pub fn native_token() -> Token {
    use crate::config::{COIN_DECIMAL_SEPARATOR, MAX_SUPPLY, NATIVE_TOKEN_NAME, NATIVE_TOKEN_TICKER};
    Token {
        name: NATIVE_TOKEN_NAME.to_owned(),
        ticker: NATIVE_TOKEN_TICKER.to_owned(),
        decimal_separator: COIN_DECIMAL_SEPARATOR,
        description: String::new(),
        supply: 0,
        max_supply: MAX_SUPPLY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_token() -> Token {
        Token {
            name: "Test Token".to_owned(),
            ticker: "TEST".to_owned(),
            decimal_separator: 6,
            description: "a token".to_owned(),
            supply: 1000,
            max_supply: 10000,
        }
    }

    #[test]
    fn test_validate() {
        assert!(test_token().validate().is_ok());
        assert!(native_token().validate().is_ok());

        let mut token = test_token();
        token.ticker = "test".to_owned();
        assert!(token.validate().is_err());

        let mut token = test_token();
        token.supply = token.max_supply + 1;
        assert!(token.validate().is_err());
    }

    #[test]
    fn test_supply_guards() {
        let mut token = test_token();
        assert!(token.add_supply(9000).is_ok());
        assert!(token.add_supply(1).is_err());
        assert!(token.sub_supply(10000).is_ok());
        assert!(token.sub_supply(1).is_err());
    }

    #[test]
    fn test_serializer_round_trip() {
        let token = test_token();
        let bytes = token.to_bytes();
        assert_eq!(bytes.len(), token.size());
        assert_eq!(Token::from_bytes(&bytes).unwrap(), token);
    }
}
