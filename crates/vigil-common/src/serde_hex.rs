//! Serde adapters rendering fixed-size byte arrays as lowercase hex strings,
//! so identifiers and signatures stay readable on the wire.

use serde::de::Error as DeError;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serializer;

pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&hex::encode(bytes))
}

pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
where
    D: Deserializer<'de>,
{
    let digits = String::deserialize(deserializer)?;
    let bytes = hex::decode(&digits).map_err(DeError::custom)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| DeError::custom(format!("expected {N} bytes, got {}", bytes.len())))
}

/// Same adapters for variable-length byte vectors
pub mod vec {
    use super::*;

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let digits = String::deserialize(deserializer)?;
        hex::decode(&digits).map_err(DeError::custom)
    }
}

/// Same adapters for lists of byte vectors (e.g. witness stacks)
pub mod vec_list {
    use super::*;

    pub fn serialize<S>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(items.iter().map(|bytes| hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let items = Vec::<String>::deserialize(deserializer)?;
        items
            .iter()
            .map(|digits| hex::decode(digits).map_err(DeError::custom))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use serde::Deserialize;
    use serde::Serialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super")]
        id: [u8; 32],
        #[serde(with = "super::vec")]
        blob: Vec<u8>,
    }

    #[test]
    fn test_hex_fields_roundtrip() {
        let value = Wrapper {
            id: [0xab; 32],
            blob: vec![1, 2, 3],
        };
        let encoded = serde_json::to_string(&value).unwrap();
        assert!(encoded.contains(&"ab".repeat(32)));
        assert!(encoded.contains("010203"));

        let decoded: Wrapper = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_rejects_wrong_length() {
        let err = serde_json::from_str::<Wrapper>(r#"{"id":"abcd","blob":""}"#);
        assert!(err.is_err());
    }
}
