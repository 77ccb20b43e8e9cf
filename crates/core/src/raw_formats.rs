//! Recognized RAW extensions and output file naming.
//!
//! Extension matching is case-insensitive and only looks at the final
//! extension of the base name, so `shoot/IMG_0001.CR2` and `img_0001.cr2`
//! are both accepted while `notes.cr2.txt` is not.

// ---------------------------------------------------------------------------
// Extension constants
// ---------------------------------------------------------------------------

/// Canon RAW (TIFF based).
pub const EXT_CR2: &str = "cr2";
/// Canon RAW v3 (ISO base media container).
pub const EXT_CR3: &str = "cr3";
/// Nikon RAW (TIFF based).
pub const EXT_NEF: &str = "nef";

/// All RAW extensions the service accepts (lowercase, without the dot).
pub const RAW_EXTENSIONS: &[&str] = &[EXT_CR2, EXT_CR3, EXT_NEF];

/// Extension given to every converted file.
pub const OUTPUT_EXTENSION: &str = "jpg";

// ---------------------------------------------------------------------------
// Name helpers
// ---------------------------------------------------------------------------

/// Strip any directory components (either separator) from an uploaded name.
pub fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Split a base name into `(stem, extension)` when it has a non-empty stem.
fn split_extension(base: &str) -> Option<(&str, &str)> {
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some((stem, ext))
}

/// Return the recognized RAW extension of `name`, normalized to lowercase.
pub fn raw_extension(name: &str) -> Option<&'static str> {
    let (_, ext) = split_extension(base_name(name))?;
    RAW_EXTENSIONS
        .iter()
        .copied()
        .find(|known| ext.eq_ignore_ascii_case(known))
}

/// Whether `name` carries one of the accepted RAW extensions.
pub fn is_raw_file(name: &str) -> bool {
    raw_extension(name).is_some()
}

/// Compute the archive entry name for a converted file.
///
/// The directory part is dropped and a trailing RAW extension is replaced by
/// `.jpg`. Names without a RAW extension get `.jpg` appended.
pub fn output_name(source_name: &str) -> String {
    let base = base_name(source_name);
    match split_extension(base) {
        Some((stem, _)) if is_raw_file(base) => format!("{stem}.{OUTPUT_EXTENSION}"),
        _ => format!("{base}.{OUTPUT_EXTENSION}"),
    }
}

/// Produce a name that is not yet in use by appending `-2`, `-3`, ...
/// before the extension.
pub fn disambiguate(name: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(name) {
        return name.to_string();
    }
    let (stem, ext) = split_extension(name).unwrap_or((name, ""));
    (2..)
        .map(|n| {
            if ext.is_empty() {
                format!("{stem}-{n}")
            } else {
                format!("{stem}-{n}.{ext}")
            }
        })
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| name.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
