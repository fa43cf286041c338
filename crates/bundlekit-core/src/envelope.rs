//! Unpack worker payload envelope
//!
//! The unpack worker reports its result on its log stream as a single JSON
//! object `{"content": "<base64>"}`, where the decoded bytes are a tar.gz of
//! the bundle directory.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::archive::{read_tar_gz, to_tar_gz};
use crate::error::{CoreError, Result};
use crate::fs::BundleFs;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(default)]
    content: String,
}

/// Encode a tree as a worker payload
pub fn encode(fs: &BundleFs) -> Result<String> {
    let archive = to_tar_gz(fs)?;
    let envelope = Envelope {
        content: STANDARD.encode(archive),
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Decode a worker payload back into a tree
///
/// Leading and trailing whitespace (e.g. the newline a log line ends with)
/// is ignored.
pub fn decode(data: &[u8]) -> Result<BundleFs> {
    let envelope: Envelope = serde_json::from_slice(data).map_err(|e| CoreError::Payload {
        message: format!("parse bundle data: {}", e),
    })?;

    let archive = STANDARD
        .decode(envelope.content.as_bytes())
        .map_err(|e| CoreError::Payload {
            message: format!("decode bundle content: {}", e),
        })?;
    if archive.is_empty() {
        return Err(CoreError::Payload {
            message: "bundle content is empty".to_string(),
        });
    }

    read_tar_gz(archive.as_slice()).map_err(|e| CoreError::Payload {
        message: format!("read bundle content: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let mut fs = BundleFs::new();
        fs.insert("manifests/a.yaml", "kind: X").unwrap();

        let payload = encode(&fs).unwrap();
        assert!(payload.starts_with(r#"{"content":""#));

        let decoded = decode(format!("{}\n", payload).as_bytes()).unwrap();
        assert_eq!(decoded, fs);
    }

    #[test]
    fn test_decode_bad_json() {
        let err = decode(b"extract: permission denied").unwrap_err();
        assert!(err.to_string().contains("parse bundle data"));
    }

    #[test]
    fn test_decode_bad_base64() {
        let err = decode(br#"{"content":"!!!not base64!!!"}"#).unwrap_err();
        assert!(err.to_string().contains("decode bundle content"));
    }

    #[test]
    fn test_decode_bad_gzip() {
        let content = STANDARD.encode(b"plain text, not gzip");
        let err = decode(format!(r#"{{"content":"{}"}}"#, content).as_bytes()).unwrap_err();
        assert!(err.to_string().contains("read bundle content"));
    }

    #[test]
    fn test_decode_missing_content() {
        assert!(decode(b"{}").is_err());
    }
}
