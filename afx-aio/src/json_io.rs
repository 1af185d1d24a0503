// afx-aio/src/json_io.rs
use std::io;
use std::path::Path;

use afx_common::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Reads and deserializes a JSON file. A missing file yields `None`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    debug!("Reading JSON from: {}", path.display());
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Serializes `data` (pretty-printed) and atomically replaces `path` with a
/// file of the given `mode`.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, data: &T, mode: u32) -> Result<()> {
    debug!("Writing JSON to: {}", path.display());
    let mut bytes = serde_json::to_vec_pretty(data)?;
    bytes.push(b'\n');
    crate::fs::atomic_write_file(path, &bytes, mode)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn missing_and_empty_files_read_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        let missing: Option<BTreeMap<String, String>> =
            read_json(&tmp.path().join("nope.json")).unwrap();
        assert!(missing.is_none());

        let empty = tmp.path().join("empty.json");
        std::fs::write(&empty, "  \n").unwrap();
        let parsed: Option<BTreeMap<String, String>> = read_json(&empty).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn writes_then_reads_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.json");
        let mut data = BTreeMap::new();
        data.insert("b".to_string(), "2".to_string());
        data.insert("a".to_string(), "1".to_string());
        write_json(&path, &data, 0o644).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.find("\"a\"").unwrap() < text.find("\"b\"").unwrap());
        let back: Option<BTreeMap<String, String>> = read_json(&path).unwrap();
        assert_eq!(back, Some(data));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, "{\"resources\": ").unwrap();
        let res: Result<Option<BTreeMap<String, String>>> = read_json(&path);
        assert!(res.is_err());
    }
}
