// Linux-specific counter reads: /proc/diskstats.

/// /proc/diskstats always counts 512-byte sectors, whatever the device block size.
const SECTOR_BYTES: u64 = 512;

/// Total (read, written) bytes across whole physical devices, or None when
/// /proc/diskstats is unreadable or lists no physical device.
pub(super) fn read_disk_bytes() -> Option<(u64, u64)> {
    #[cfg(target_os = "linux")]
    {
        let content = std::fs::read_to_string("/proc/diskstats").ok()?;
        parse_diskstats(&content)
    }
    #[cfg(not(target_os = "linux"))]
    None
}

pub(super) fn parse_diskstats(content: &str) -> Option<(u64, u64)> {
    let mut seen = false;
    let mut read = 0u64;
    let mut written = 0u64;
    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 14 || !is_physical_device(parts[2]) {
            continue;
        }
        // Fields 6 and 10: sectors read / sectors written.
        if let (Ok(r), Ok(w)) = (parts[5].parse::<u64>(), parts[9].parse::<u64>()) {
            read = read.saturating_add(r.saturating_mul(SECTOR_BYTES));
            written = written.saturating_add(w.saturating_mul(SECTOR_BYTES));
            seen = true;
        }
    }
    seen.then_some((read, written))
}

/// Whole devices only: partitions would double count their parent.
fn is_physical_device(name: &str) -> bool {
    if name.starts_with("loop") || name.starts_with("ram") || name.starts_with("dm-") {
        return false;
    }
    // nvme0n1 / mmcblk0 are devices, nvme0n1p1 / mmcblk0p1 partitions.
    if let Some(rest) = name.strip_prefix("nvme") {
        let after_ns = rest
            .find('n')
            .map(|i| rest[i + 1..].trim_start_matches(|c: char| c.is_ascii_digit()))
            .unwrap_or("");
        return !after_ns.starts_with('p');
    }
    if let Some(rest) = name.strip_prefix("mmcblk") {
        return !rest
            .trim_start_matches(|c: char| c.is_ascii_digit())
            .starts_with('p');
    }
    // sda, vdb, xvda: partitions end in a digit.
    name.chars()
        .last()
        .is_some_and(|c| c.is_ascii_alphabetic())
}
