//! Path algebra over flat blob and file-share keys.
//!
//! Blob storage has no directories: `/` inside a key is only a naming
//! convention.  A key ending in `/` is treated as a directory, anything else
//! as a leaf.  The helpers here work on string slices and never touch the
//! filesystem.
//!
//! Keys containing an empty segment (`"a//"`) address an entry whose name is
//! the empty string.  The functions do not guard against this; callers must
//! not rely on the result.

/// The conventional separator for blob and file keys.
pub const SEPARATOR: char = '/';

/// Returns true when `path` denotes a directory, i.e. ends with the separator.
pub fn is_directory(path: &str) -> bool {
    path.ends_with(SEPARATOR)
}

/// Index where the final segment of `path` starts, honouring directory keys.
fn last_segment_start(path: &str) -> usize {
    let body = path.strip_suffix(SEPARATOR).unwrap_or(path);
    body.rfind(SEPARATOR).map_or(0, |i| i + 1)
}

/// Parent directory of `path`, including its trailing separator.
///
/// `"abc/efg"` and `"abc/efg/"` both yield `"abc/"`; a key with no
/// separator (or the bare separator) yields `""`.
pub fn dirname(path: &str) -> &str {
    &path[..last_segment_start(path)]
}

/// Final segment of `path`.  Directory keys keep their trailing separator.
///
/// `"abc/efg"` yields `"efg"`, `"abc/efg/"` yields `"efg/"` and `"/"`
/// yields `"/"`.
pub fn basename(path: &str) -> &str {
    &path[last_segment_start(path)..]
}

/// Concatenate `base` with `segments` verbatim.
///
/// No separator is inserted and nothing is normalised: segments that need a
/// leading separator must carry it.
pub fn join(base: &str, segments: &[&str]) -> String {
    let capacity = base.len() + segments.iter().map(|s| s.len()).sum::<usize>();
    let mut joined = String::with_capacity(capacity);
    joined.push_str(base);
    for segment in segments {
        joined.push_str(segment);
    }
    joined
}

/// Remove exactly one trailing separator, if present.
pub fn trim_slash(path: &str) -> &str {
    path.strip_suffix(SEPARATOR).unwrap_or(path)
}

/// Ensure `path` ends with exactly one added separator (no-op if it already ends with one).
pub fn append_slash(path: &str) -> String {
    if is_directory(path) {
        path.to_string()
    } else {
        format!("{}{}", path, SEPARATOR)
    }
}

/// Normalising POSIX-style join.
///
/// Unlike [`join`], this collapses repeated separators, drops `.` segments
/// and resolves `..` against the segments before it.  A `..` with nothing
/// left to pop is dropped, so the result never climbs above the start of
/// `head`: `posix_join("c", "../../x")` is `"x"`.  A leading separator on
/// `tail` does not reset the path.  Trailing separators on `tail` are kept so
/// directory keys stay directory keys.
pub fn posix_join(head: &str, tail: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in head.split(SEPARATOR).chain(tail.split(SEPARATOR)) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }

    let mut joined = parts.join("/");
    if head.starts_with(SEPARATOR) {
        joined.insert(0, SEPARATOR);
    }
    let ends_dir = if tail.is_empty() {
        is_directory(head)
    } else {
        is_directory(tail)
    };
    if ends_dir && !joined.is_empty() && !is_directory(&joined) {
        joined.push(SEPARATOR);
    }
    joined
}
