// certmig-core/src/infrastructure/fs.rs

use crate::infrastructure::error::InfrastructureError;
use std::io::Write;
use std::path::Path;

/// Write content to a file atomically using a temporary file.
///
/// The temp file is created in the target's directory so the final
/// rename stays on one filesystem; the target is either fully written
/// or untouched. Manifests and the consistency map all go through here.
pub fn atomic_write<P: AsRef<Path>, C: AsRef<[u8]>>(
    path: P,
    content: C,
) -> Result<(), InfrastructureError> {
    let path = path.as_ref();
    let parent = path.parent().unwrap_or_else(|| Path::new("."));

    let mut temp_file = tempfile::NamedTempFile::new_in(parent).map_err(InfrastructureError::Io)?;

    temp_file
        .write_all(content.as_ref())
        .map_err(InfrastructureError::Io)?;

    temp_file
        .persist(path)
        .map_err(|e| InfrastructureError::Io(e.error))?;

    Ok(())
}

/// Pretty-printed JSON document, written atomically.
pub fn write_json<P: AsRef<Path>, T: serde::Serialize>(
    path: P,
    data: &T,
) -> Result<(), InfrastructureError> {
    let content = serde_json::to_string_pretty(data)?;
    atomic_write(path, content)
}

/// Reads and deserializes a JSON document.
pub fn read_json<P: AsRef<Path>, T: serde::de::DeserializeOwned>(
    path: P,
) -> Result<T, InfrastructureError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_creates_file() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("manifest.json");

        atomic_write(&file_path, "{}")?;

        assert!(file_path.exists());
        assert_eq!(fs::read_to_string(file_path)?, "{}");
        Ok(())
    }

    #[test]
    fn test_atomic_write_overwrites_existing() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("map.json");

        atomic_write(&file_path, "first")?;
        atomic_write(&file_path, "second")?;

        assert_eq!(fs::read_to_string(file_path)?, "second");
        Ok(())
    }

    #[test]
    fn test_json_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("data.json");

        let mut data = BTreeMap::new();
        data.insert("rule:orig".to_string(), "TOKEN_00000001".to_string());

        write_json(&file_path, &data)?;
        let restored: BTreeMap<String, String> = read_json(&file_path)?;
        assert_eq!(restored, data);
        Ok(())
    }
}
