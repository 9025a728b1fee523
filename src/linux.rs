//! Presentation helpers for sizes reported by the kernel

/// Shrink a count to at most four significant digits and a unit suffix
///
/// Used for both byte counts and inode counts, `df -h` style.
pub fn bytes_to_human_size(bytes: u64) -> String {
    let mut bytes = bytes as f64;
    let sizes = ["B", "K", "M", "G", "T"];
    let mut reductions = 0;
    while reductions < sizes.len() - 1 {
        if bytes > 1000.0 {
            bytes /= 1024.0;
            reductions += 1;
        } else {
            break;
        }
    }
    format!("{:>5.1}{}", bytes, sizes[reductions])
}

/// Like `bytes_to_human_size` but without the column padding, for prose
pub fn human_size(bytes: u64) -> String {
    bytes_to_human_size(bytes).trim_start().to_owned()
}

/// `human_size` for plain counts such as inodes, which have no byte suffix
pub fn human_count(count: u64) -> String {
    let size = human_size(count);
    match size.strip_suffix('B') {
        Some(plain) => plain.to_owned(),
        None => size,
    }
}
