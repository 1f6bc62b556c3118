//! Checkpoint serialization.
//!
//! This module contains two traits: `TextSerialize` and `TextDeserialize`,
//! analogs of the Serde `Serialize` and `Deserialize` traits but intended for
//! the simulator's whitespace-separated token format used by the segmented
//! block files, plus `Tokens`, a streaming token reader over any `BufRead`.

mod error;

pub use error::SerializationError;

use std::io;
use std::str::FromStr;

/// Serialization into the simulator's token format.
///
/// Every value writes itself as one or more whitespace-terminated tokens, so
/// concatenating serialized values yields a well-formed stream.
pub trait TextSerialize {
    fn text_serialize<W: io::Write>(&self, target: W) -> Result<(), io::Error>;

    fn text_serialize_to_string(&self) -> Result<String, io::Error> {
        let mut data = Vec::new();
        self.text_serialize(&mut data)?;
        Ok(String::from_utf8(data).expect("token serialization is ascii"))
    }
}

/// Deserialization from a token stream produced by [`TextSerialize`].
pub trait TextDeserialize: Sized {
    fn text_deserialize<R: io::BufRead>(tokens: &mut Tokens<R>) -> Result<Self, SerializationError>;
}

/// A whitespace-separated token reader.
pub struct Tokens<R> {
    inner: R,
    buf: String,
}

impl<R: io::BufRead> Tokens<R> {
    pub fn new(inner: R) -> Self {
        Tokens {
            inner,
            buf: String::new(),
        }
    }

    /// Returns the next token, or `SerializationError::Parse` at end of input.
    pub fn next_token(&mut self) -> Result<&str, SerializationError> {
        self.buf.clear();
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte)? {
                0 if self.buf.is_empty() => {
                    return Err(SerializationError::Parse("unexpected end of token stream"))
                }
                0 => break,
                _ if byte[0].is_ascii_whitespace() => {
                    if !self.buf.is_empty() {
                        break;
                    }
                }
                _ => self.buf.push(byte[0] as char),
            }
        }
        Ok(&self.buf)
    }

    /// Reads the next token and parses it as `T`.
    pub fn parse<T: FromStr>(&mut self) -> Result<T, SerializationError> {
        self.next_token()?
            .parse()
            .map_err(|_| SerializationError::Parse("malformed numeric token"))
    }

    /// True once no tokens remain, consuming any trailing whitespace.
    pub fn at_end(&mut self) -> Result<bool, SerializationError> {
        loop {
            let available = self.inner.fill_buf()?;
            match available.iter().position(|b| !b.is_ascii_whitespace()) {
                Some(0) => return Ok(false),
                Some(n) => {
                    self.inner.consume(n);
                    return Ok(false);
                }
                None if available.is_empty() => return Ok(true),
                None => {
                    let len = available.len();
                    self.inner.consume(len);
                }
            }
        }
    }
}

macro_rules! impl_text_for_integer {
    ($($int:ty),*) => {$(
        impl TextSerialize for $int {
            fn text_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
                write!(target, "{} ", self)
            }
        }

        impl TextDeserialize for $int {
            fn text_deserialize<R: io::BufRead>(
                tokens: &mut Tokens<R>,
            ) -> Result<Self, SerializationError> {
                tokens.parse()
            }
        }
    )*};
}

impl_text_for_integer!(i64, u32, u64, usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_split_on_any_whitespace() {
        let mut tokens = Tokens::new("1 2\t3\n 4".as_bytes());
        for expected in 1..=4i64 {
            assert_eq!(tokens.parse::<i64>().unwrap(), expected);
        }
        assert!(tokens.at_end().unwrap());
    }

    #[test]
    fn exhausted_stream_is_a_parse_error() {
        let mut tokens = Tokens::new("7 ".as_bytes());
        assert_eq!(tokens.parse::<i64>().unwrap(), 7);
        assert!(matches!(
            i64::text_deserialize(&mut tokens),
            Err(SerializationError::Parse(_))
        ));
    }

    #[test]
    fn integer_roundtrip() {
        let serialized = (-42i64).text_serialize_to_string().unwrap();
        let mut tokens = Tokens::new(serialized.as_bytes());
        assert_eq!(i64::text_deserialize(&mut tokens).unwrap(), -42);
    }
}
