//! Small pure helpers shared by the service and the backends.

const UNIT: i64 = 1024;
const UNIT_PREFIXES: &[u8] = b"KMGTPE";

/// Render a byte count using binary units, e.g. `1536` becomes `"1.5 KB"`.
pub fn format_bytes(bytes: i64) -> String {
    if bytes < UNIT {
        return format!("{} B", bytes);
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    format!(
        "{:.1} {}B",
        bytes as f64 / div as f64,
        UNIT_PREFIXES[exp] as char
    )
}

/// Suffix of the last path element starting at its final dot, or `""`.
///
/// `"photos/Cat.PNG"` yields `".PNG"`, `"archive.tar.gz"` yields `".gz"`,
/// `"dir.d/README"` yields `""`. Case is preserved.
pub fn file_extension(name: &str) -> &str {
    let base = name.rsplit('/').next().unwrap_or(name);
    match base.rfind('.') {
        Some(pos) => &base[pos..],
        None => "",
    }
}

/// Lower-cased extension used for listings and filtering.
pub fn normalized_extension(name: &str) -> String {
    file_extension(name).to_lowercase()
}
