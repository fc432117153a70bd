use crate::error::{MetricsError, Result};

/// Resident set size of the current process in bytes.
///
/// Reads the resident page count from `/proc/self/statm` and scales it by the
/// system page size. Only Linux exposes this; other platforms get
/// [`MetricsError::PlatformUnsupported`].
pub fn current_resident_memory_bytes() -> Result<u64> {
    #[cfg(target_os = "linux")]
    {
        let statm = std::fs::read_to_string("/proc/self/statm")?;
        let pages = parse_resident_pages(&statm)?;
        pages
            .checked_mul(page_size())
            .ok_or_else(|| MetricsError::MalformedData(format!("resident pages overflow: {pages}")))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(MetricsError::PlatformUnsupported(
            std::env::consts::OS.to_string(),
        ))
    }
}

/// statm fields: size resident shared text lib data dt
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_resident_pages(statm: &str) -> Result<u64> {
    statm
        .split_whitespace()
        .nth(1)
        .and_then(|value| value.parse::<u64>().ok())
        .ok_or_else(|| MetricsError::MalformedData(format!("unexpected statm contents: {statm:?}")))
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Base page size in bytes, cached for the life of the process.
///
/// Taken as the smallest `KernelPageSize` in `/proc/self/smaps` so hugetlb
/// mappings don't inflate it. Falls back to 4 KiB when smaps is unavailable.
#[cfg(target_os = "linux")]
fn page_size() -> u64 {
    use once_cell::sync::OnceCell;
    use std::io::BufReader;

    static PAGE_SIZE: OnceCell<u64> = OnceCell::new();

    *PAGE_SIZE.get_or_init(|| {
        let smallest = std::fs::File::open("/proc/self/smaps")
            .ok()
            .and_then(|smaps| smallest_page_size(BufReader::new(smaps)));
        smallest.unwrap_or_else(|| {
            log::debug!("No KernelPageSize in /proc/self/smaps, assuming {DEFAULT_PAGE_SIZE} bytes");
            DEFAULT_PAGE_SIZE
        })
    })
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn smallest_page_size(smaps: impl std::io::BufRead) -> Option<u64> {
    smaps
        .lines()
        .map_while(|line| line.ok())
        .filter_map(|line| parse_kib_field(&line, "KernelPageSize:"))
        .filter(|kib| *kib > 0)
        .min()
        .map(|kib| kib * 1024)
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_kib_field(line: &str, field: &str) -> Option<u64> {
    line.strip_prefix(field)?
        .split_whitespace()
        .next()?
        .parse::<u64>()
        .ok()
}
