//! Storage operations
//!
//! File system work behind LIST/NLST, MKD, RMD, DELE, RNFR/RNTO, SIZE and
//! MDTM. Real paths come from `storage::validation`; errors name the
//! virtual path the client used.

use log::{error, info};
use std::fs::{self, File, Metadata};
use std::io::{BufReader, Read};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::StorageError;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Civil date from days since the epoch (proleptic Gregorian).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

struct Timestamp {
    year: i64,
    month: u32,
    day: u32,
    hour: u64,
    minute: u64,
    second: u64,
}

fn timestamp(time: SystemTime) -> Timestamp {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    let rem = secs % 86_400;
    Timestamp {
        year,
        month,
        day,
        hour: rem / 3600,
        minute: rem % 3600 / 60,
        second: rem % 60,
    }
}

fn mode_string(metadata: &Metadata) -> String {
    let kind = if metadata.is_dir() {
        'd'
    } else if metadata.file_type().is_symlink() {
        'l'
    } else {
        '-'
    };
    let mode = metadata.permissions().mode();
    let mut text = String::with_capacity(10);
    text.push(kind);
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        text.push(if bits & 4 != 0 { 'r' } else { '-' });
        text.push(if bits & 2 != 0 { 'w' } else { '-' });
        text.push(if bits & 1 != 0 { 'x' } else { '-' });
    }
    text
}

fn long_entry(name: &str, metadata: &Metadata) -> String {
    let modified = timestamp(metadata.modified().unwrap_or(UNIX_EPOCH));
    format!(
        "{} {:>3} {:<8} {:<8} {:>10} {} {:>2} {:04} {}",
        mode_string(metadata),
        metadata.nlink(),
        metadata.uid(),
        metadata.gid(),
        metadata.len(),
        MONTHS[(modified.month - 1) as usize],
        modified.day,
        modified.year,
        name
    )
}

/// Lists a directory (or names a single file).
///
/// `long` gives one `ls -l` style line per entry, otherwise bare names.
pub fn list_directory(real: &Path, shown: &str, long: bool) -> Result<Vec<String>, StorageError> {
    let metadata = fs::metadata(real).map_err(|e| StorageError::from_io(shown, e))?;

    if !metadata.is_dir() {
        let name = real
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| shown.to_string());
        return Ok(vec![if long {
            long_entry(&name, &metadata)
        } else {
            name
        }]);
    }

    let entries = fs::read_dir(real).map_err(|e| {
        error!("Failed to list directory {} (real: {}): {}", shown, real.display(), e);
        StorageError::from_io(shown, e)
    })?;

    let mut listing: Vec<(String, Option<Metadata>)> = entries
        .flatten()
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            (name, entry.metadata().ok())
        })
        .collect();
    listing.sort_by(|a, b| a.0.cmp(&b.0));

    let lines: Vec<String> = listing
        .into_iter()
        .map(|(name, metadata)| match (long, metadata) {
            (true, Some(metadata)) => long_entry(&name, &metadata),
            _ => name,
        })
        .collect();

    info!("Listed directory {} - {} entries", shown, lines.len());
    Ok(lines)
}

pub fn make_directory(real: &Path, shown: &str) -> Result<(), StorageError> {
    fs::create_dir(real).map_err(|e| StorageError::from_io(shown, e))?;
    info!("Created directory {}", shown);
    Ok(())
}

pub fn remove_directory(real: &Path, shown: &str) -> Result<(), StorageError> {
    if !real.is_dir() {
        return Err(StorageError::NotADirectory(shown.to_string()));
    }
    fs::remove_dir(real).map_err(|e| StorageError::from_io(shown, e))?;
    info!("Removed directory {}", shown);
    Ok(())
}

pub fn delete_file(real: &Path, shown: &str) -> Result<(), StorageError> {
    let metadata = fs::symlink_metadata(real).map_err(|e| StorageError::from_io(shown, e))?;
    if metadata.is_dir() {
        return Err(StorageError::NotAPlainFile(shown.to_string()));
    }
    fs::remove_file(real).map_err(|e| StorageError::from_io(shown, e))?;
    info!("Deleted file {}", shown);
    Ok(())
}

pub fn rename_path(from: &Path, to: &Path, shown: &str) -> Result<(), StorageError> {
    fs::rename(from, to).map_err(|e| StorageError::from_io(shown, e))?;
    info!("Renamed {} -> {}", from.display(), to.display());
    Ok(())
}

/// Checks that `real` is a regular file and returns its metadata.
pub fn plain_file(real: &Path, shown: &str) -> Result<Metadata, StorageError> {
    let metadata = fs::metadata(real).map_err(|e| StorageError::from_io(shown, e))?;
    if !metadata.is_file() {
        return Err(StorageError::NotAPlainFile(shown.to_string()));
    }
    Ok(metadata)
}

/// Size as it would be transferred: in ASCII every newline gains a
/// carriage return.
pub fn transfer_size(real: &Path, shown: &str, ascii: bool) -> Result<u64, StorageError> {
    let metadata = plain_file(real, shown)?;
    if !ascii {
        return Ok(metadata.len());
    }

    let file = File::open(real).map_err(|e| StorageError::from_io(shown, e))?;
    let mut reader = BufReader::new(file);
    let mut buf = [0u8; 8192];
    let mut size = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| StorageError::from_io(shown, e))?;
        if n == 0 {
            break;
        }
        size += n as u64 + buf[..n].iter().filter(|b| **b == b'\n').count() as u64;
    }
    Ok(size)
}

/// Modification time as `YYYYMMDDHHMMSS` (UTC).
pub fn modification_time(real: &Path, shown: &str) -> Result<String, StorageError> {
    let metadata = plain_file(real, shown)?;
    let t = timestamp(metadata.modified().unwrap_or(UNIX_EPOCH));
    Ok(format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}",
        t.year, t.month, t.day, t.hour, t.minute, t.second
    ))
}

/// `path` itself if free, otherwise the first free `path.1` .. `path.99`.
pub fn unique_path(path: &Path) -> Option<PathBuf> {
    if !path.exists() {
        return Some(path.to_path_buf());
    }
    let base = path.as_os_str().to_string_lossy().into_owned();
    (1..100)
        .map(|n| PathBuf::from(format!("{}.{}", base, n)))
        .find(|candidate| !candidate.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_civil_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(11_016), (2000, 2, 29));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
    }

    #[test]
    fn test_timestamp_fields() {
        let t = timestamp(UNIX_EPOCH + Duration::from_secs(86_400 + 3_723));
        assert_eq!((t.year, t.month, t.day), (1970, 1, 2));
        assert_eq!((t.hour, t.minute, t.second), (1, 2, 3));
    }

    #[test]
    fn test_listing_and_sizes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), b"one\ntwo\n").unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();

        let names = list_directory(dir.path(), "/", false).unwrap();
        assert_eq!(names, vec!["a", "b.txt"]);

        let long = list_directory(dir.path(), "/", true).unwrap();
        assert!(long[0].starts_with('d'));
        assert!(long[1].starts_with('-'));
        assert!(long[1].ends_with(" b.txt"));

        let file = dir.path().join("b.txt");
        assert_eq!(transfer_size(&file, "/b.txt", false).unwrap(), 8);
        assert_eq!(transfer_size(&file, "/b.txt", true).unwrap(), 10);
        assert!(matches!(
            transfer_size(&dir.path().join("a"), "/a", false),
            Err(StorageError::NotAPlainFile(_))
        ));
        assert_eq!(modification_time(&file, "/b.txt").unwrap().len(), 14);
    }

    #[test]
    fn test_unique_path_skips_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        assert_eq!(unique_path(&path).unwrap(), path);

        fs::write(&path, b"x").unwrap();
        fs::write(dir.path().join("data.1"), b"x").unwrap();
        assert_eq!(unique_path(&path).unwrap(), dir.path().join("data.2"));
    }

    #[test]
    fn test_missing_paths_map_to_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = delete_file(&dir.path().join("nope"), "/nope").unwrap_err();
        assert!(matches!(err, StorageError::FileNotFound(_)));
        assert_eq!(err.to_string(), "/nope: No such file or directory");
    }
}
