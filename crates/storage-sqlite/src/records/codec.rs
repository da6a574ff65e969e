use serde::de::DeserializeOwned;
use serde::Serialize;

use fieldbook_core::errors::{Error, Result};

/// Serializer pair a repository uses to turn records into store plaintext.
pub trait RecordCodec<T>: Send + Sync {
    fn encode(&self, record: &T) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

/// JSON codec. Encode failures surface as encryption errors and decode
/// failures as decryption errors, so a malformed entry reads the same as a
/// foreign one.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl<T> RecordCodec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, record: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(record)
            .map_err(|e| Error::encryption(format!("failed to serialize record: {}", e)))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::decryption(format!("failed to parse record: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldbook_core::customers::Customer;

    #[test]
    fn malformed_bytes_are_unreadable_local_data() {
        let err = RecordCodec::<Customer>::decode(&JsonCodec, b"not json").expect_err("decode");
        assert!(err.is_unreadable_local_data());
    }

    #[test]
    fn customer_survives_codec() {
        let customer = Customer::new("Ada", "ada@example.com");
        let bytes = JsonCodec.encode(&customer).expect("encode");
        let decoded: Customer = JsonCodec.decode(&bytes).expect("decode");
        assert_eq!(decoded, customer);
    }
}
