//! Utility functions for sizes, paths and disk space

use crate::config::DiskSpaceConfig;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Format a byte count for humans, stepping by 1024 (B, KB, MB, GB, TB)
///
/// # Examples
///
/// ```
/// use media_dl::utils::format_bytes;
///
/// assert_eq!(format_bytes(512), "512.00 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// assert_eq!(format_bytes(25 * 1024 * 1024), "25.00 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} TB")
}

/// Path of the final artifact: `{dir}/{stem}.{extension}`
pub fn artifact_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    dir.join(format!("{stem}.{extension}"))
}

/// Sibling path used while an artifact is still being written (`{name}.part`)
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Ensure `dir` has room for an artifact of `size_bytes`
///
/// Required space is `size_bytes * size_multiplier + min_free_space`. Does nothing
/// when checking is disabled.
///
/// # Errors
///
/// [`Error::InsufficientSpace`] when the filesystem is too full, or
/// [`Error::DiskSpaceCheckFailed`] when free space cannot be determined.
pub fn ensure_free_space(dir: &Path, size_bytes: u64, config: &DiskSpaceConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let required = (size_bytes as f64 * config.size_multiplier) as u64;
    let required_with_buffer = required.saturating_add(config.min_free_space);

    let available = get_available_space(dir).map_err(|e| {
        Error::DiskSpaceCheckFailed(format!(
            "Failed to check disk space for '{}': {}",
            dir.display(),
            e
        ))
    })?;

    if available < required_with_buffer {
        return Err(Error::InsufficientSpace {
            required: required_with_buffer,
            available,
        });
    }

    Ok(())
}

/// Get available disk space for a given path
///
/// # Returns
///
/// Bytes available to unprivileged users on the filesystem holding `path`.
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid NUL-terminated string, stat is zero-initialized,
        // and the struct is only read after statvfs reports success.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            #[allow(clippy::unnecessary_cast)]
            Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is NUL-terminated and every out-pointer refers to a live u64.
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut total_bytes: u64 = 0;
            let mut total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut total_bytes as *mut u64 as *mut _,
                &mut total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }
            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = path;
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Disk space checking is not supported on this platform",
        ))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_steps_through_units() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.00 GB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024 * 1024), "3.00 TB");
    }

    #[test]
    fn partial_path_appends_suffix() {
        let path = Path::new("/tmp/out/My Video.mp4");
        assert_eq!(partial_path(path), PathBuf::from("/tmp/out/My Video.mp4.part"));
    }

    #[test]
    fn artifact_path_joins_stem_and_extension() {
        assert_eq!(
            artifact_path(Path::new("downloads"), "Clip", "webm"),
            PathBuf::from("downloads").join("Clip.webm")
        );
    }

    #[cfg(unix)]
    #[test]
    fn available_space_is_reported_for_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let available = get_available_space(dir.path()).unwrap();
        assert!(available > 0);
    }

    #[cfg(unix)]
    #[test]
    fn impossible_requirement_reports_insufficient_space() {
        let dir = tempfile::tempdir().unwrap();
        let config = DiskSpaceConfig {
            enabled: true,
            min_free_space: u64::MAX,
            size_multiplier: 1.0,
        };
        match ensure_free_space(dir.path(), 1, &config) {
            Err(Error::InsufficientSpace { required, .. }) => assert_eq!(required, u64::MAX),
            other => panic!("expected insufficient space, got {other:?}"),
        }
    }

    #[test]
    fn disabled_check_always_passes() {
        let config = DiskSpaceConfig {
            enabled: false,
            min_free_space: u64::MAX,
            size_multiplier: 10.0,
        };
        assert!(ensure_free_space(Path::new("/definitely/missing"), u64::MAX, &config).is_ok());
    }
}
