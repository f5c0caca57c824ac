use std::io;
use std::path::{Path, PathBuf};

use crate::deviceplugin::v1beta1::{Device, HEALTHY};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to stat device path `{path}`: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read device directory `{path}`: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Fixed pool of resource units plus the host device files backing them.
///
/// Built exactly once at startup. The unit-ID set never grows or shrinks for
/// the life of the process and the device directory is never re-scanned. The
/// device list is deliberately not per-unit: every allocation exposes the
/// full set regardless of how many units were requested.
#[derive(Debug)]
pub struct Inventory {
    pub units: Vec<Device>,
    pub device_paths: Vec<PathBuf>,
}

/// Builds the inventory: `count` units with IDs `<unit_id_prefix>-<index>`,
/// all initially healthy, plus one absolute device path per entry of
/// `scan_path`.
///
/// A missing `scan_path`, or one that is not a directory, is not an error:
/// the resource is still advertised, just with no device files to attach.
///
/// # Errors
///
/// - [`Error::Stat`] if `scan_path` cannot be stat'ed for a reason other
///   than not existing.
/// - [`Error::ReadDir`] if the directory exists but cannot be enumerated.
pub fn build(count: usize, unit_id_prefix: &str, scan_path: impl AsRef<Path>) -> Result<Inventory> {
    let units = (0..count)
        .map(|index| Device {
            id: format!("{unit_id_prefix}-{index}"),
            health: HEALTHY.to_owned(),
            topology: None,
        })
        .collect();

    let device_paths = scan_device_dir(scan_path.as_ref())?;

    Ok(Inventory {
        units,
        device_paths,
    })
}

fn scan_device_dir(path: &Path) -> Result<Vec<PathBuf>> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            log::info!("Device path `{}` does not exist", path.display());
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(Error::Stat {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if !metadata.is_dir() {
        log::info!("Device path `{}` is not a directory", path.display());
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(path).map_err(|source| Error::ReadDir {
        path: path.to_path_buf(),
        source,
    })?;
    let mut device_paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Error::ReadDir {
            path: path.to_path_buf(),
            source,
        })?;
        device_paths.push(path.join(entry.file_name()));
    }
    // read_dir yields entries in platform order.
    device_paths.sort();
    log::info!("InfiniBand devices found: {:?}", device_paths);

    Ok(device_paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_build_unit_ids_distinct_and_healthy() {
        let tempdir = tempfile::tempdir().unwrap();
        let inventory = build(4, "ib-plugin/infiniband", tempdir.path()).unwrap();

        assert_eq!(inventory.units.len(), 4);
        let ids: HashSet<&str> = inventory.units.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids.len(), 4);
        assert!(ids.contains("ib-plugin/infiniband-0"));
        assert!(ids.contains("ib-plugin/infiniband-3"));
        assert!(inventory.units.iter().all(|u| u.health == HEALTHY));
    }

    #[test]
    fn test_build_zero_units() {
        let tempdir = tempfile::tempdir().unwrap();
        let inventory = build(0, "ib-plugin/infiniband", tempdir.path()).unwrap();
        assert!(inventory.units.is_empty());
    }

    #[test]
    fn test_build_stable_ids() {
        let tempdir = tempfile::tempdir().unwrap();
        let first = build(3, "ib-plugin/infiniband", tempdir.path()).unwrap();
        let second = build(3, "ib-plugin/infiniband", tempdir.path()).unwrap();

        let first_ids: Vec<&str> = first.units.iter().map(|u| u.id.as_str()).collect();
        let second_ids: Vec<&str> = second.units.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn test_build_missing_device_dir() {
        let inventory = build(2, "ib-plugin/infiniband", "/definitely/does/not/exist").unwrap();
        assert_eq!(inventory.units.len(), 2);
        assert!(inventory.device_paths.is_empty());
    }

    #[test]
    fn test_build_device_path_not_a_directory() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let inventory = build(1, "ib-plugin/infiniband", file.path()).unwrap();
        assert!(inventory.device_paths.is_empty());
    }

    #[test]
    fn test_build_scans_device_files() {
        let tempdir = tempfile::tempdir().unwrap();
        std::fs::write(tempdir.path().join("mlx5_1"), b"").unwrap();
        std::fs::write(tempdir.path().join("mlx5_0"), b"").unwrap();

        let inventory = build(1, "ib-plugin/infiniband", tempdir.path()).unwrap();
        assert_eq!(
            inventory.device_paths,
            vec![
                tempdir.path().join("mlx5_0"),
                tempdir.path().join("mlx5_1"),
            ]
        );
    }
}
