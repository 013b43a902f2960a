//! Encoders and decoders used by the adapters at the edges of a stream to turn payloads into
//! bytes and back. A closure with the matching signature is an encoder (or decoder) too.

use std::marker::PhantomData;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Result;
use crate::error::Error;

/// Encoder transforms typed data to bytes.
pub trait Encoder<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<Vec<u8>>;
}

/// Decoder transforms bytes to typed data.
pub trait Decoder<T>: Send + Sync {
    fn decode(&self, data: &[u8]) -> Result<T>;
}

impl<T, F> Encoder<T> for F
where
    F: Fn(&T) -> Result<Vec<u8>> + Send + Sync,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        self(value)
    }
}

impl<T, F> Decoder<T> for F
where
    F: Fn(&[u8]) -> Result<T> + Send + Sync,
{
    fn decode(&self, data: &[u8]) -> Result<T> {
        self(data)
    }
}

/// UTF-8 strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl Encoder<String> for StringCodec {
    fn encode(&self, value: &String) -> Result<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }
}

impl Decoder<String> for StringCodec {
    fn decode(&self, data: &[u8]) -> Result<String> {
        String::from_utf8(data.to_vec()).map_err(|e| Error::Codec(e.to_string()))
    }
}

/// Raw bytes, passed through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl Encoder<Bytes> for BytesCodec {
    fn encode(&self, value: &Bytes) -> Result<Vec<u8>> {
        Ok(value.to_vec())
    }
}

impl Decoder<Bytes> for BytesCodec {
    fn decode(&self, data: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }
}

/// JSON through serde.
pub struct JsonCodec<T> {
    _typ: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self { _typ: PhantomData }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize> Encoder<T> for JsonCodec<T> {
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }
}

impl<T: DeserializeOwned> Decoder<T> for JsonCodec<T> {
    fn decode(&self, data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: u32,
        item: String,
    }

    #[test]
    fn test_string_codec() {
        let encoded = StringCodec.encode(&"hello".to_string()).unwrap();
        assert_eq!(encoded, b"hello");
        assert_eq!(StringCodec.decode(b"hello").unwrap(), "hello");
        assert!(matches!(
            Decoder::<String>::decode(&StringCodec, &[0xff, 0xfe]),
            Err(Error::Codec(_))
        ));
    }

    #[test]
    fn test_bytes_codec() {
        let value = Bytes::from_static(b"\x00\x01");
        assert_eq!(BytesCodec.encode(&value).unwrap(), vec![0, 1]);
        assert_eq!(BytesCodec.decode(&[0, 1]).unwrap(), value);
    }

    #[test]
    fn test_json_codec() {
        let codec = JsonCodec::<Order>::new();
        let order = Order {
            id: 7,
            item: "pizza".to_string(),
        };
        let encoded = codec.encode(&order).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), order);
        assert!(codec.decode(b"{").is_err());
    }

    #[test]
    fn test_closure_codec() {
        let upper = |v: &String| -> Result<Vec<u8>> { Ok(v.to_uppercase().into_bytes()) };
        assert_eq!(Encoder::encode(&upper, &"abc".to_string()).unwrap(), b"ABC");

        let len = |d: &[u8]| -> Result<usize> { Ok(d.len()) };
        assert_eq!(Decoder::decode(&len, b"abcd").unwrap(), 4);
    }
}
