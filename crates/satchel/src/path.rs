//! Name validation and path-segment helpers.
//!
//! A name is a `/`-prefixed UTF-8 path with one or more non-empty
//! segments. Directories are never stored; they exist only as shared
//! prefixes of entry names.

/// Characters that may not appear inside a path segment.
const FORBIDDEN: [char; 9] = ['/', '*', '?', '\\', ':', '"', '<', '>', '|'];

/// Check whether `name` is a valid entry name: a leading `/` followed by
/// `/`-separated segments, each non-empty, not made solely of `.`
/// characters, and free of the forbidden character set.
pub fn check_name(name: &str) -> bool {
    if !name.starts_with('/') || name.len() == 1 {
        return false;
    }
    name[1..].split('/').all(valid_segment)
}

fn valid_segment(seg: &str) -> bool {
    if seg.is_empty() {
        return false;
    }
    let mut dots = 0usize;
    let mut total = 0usize;
    for c in seg.chars() {
        total += 1;
        if FORBIDDEN.contains(&c) {
            return false;
        }
        if c == '.' {
            dots += 1;
        }
    }
    dots != total
}

/// First path segment after the leading `/`. Assumes a validated name.
pub fn first_segment(name: &str) -> &str {
    name[1..].split('/').next().unwrap_or("")
}

/// Normalize a listing root to a trailing-`/` prefix: `/a/b` and `/a/b/`
/// both become `/a/b/`, and `/` stays `/`.
pub fn dir_prefix(path: &str) -> String {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    format!("{}/", trimmed)
}

/// Split a name into its parent directory and basename, like the listing
/// side sees it: `/a/b/c` becomes (`/a/b`, `c`), `/c` becomes (`/`, `c`).
pub fn split_dir_base(name: &str) -> (&str, &str) {
    match name.rfind('/') {
        Some(0) => ("/", &name[1..]),
        Some(pos) => (&name[..pos], &name[pos + 1..]),
        None => ("/", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(check_name("/a"));
        assert!(check_name("/a/b.txt"));
        assert!(check_name("/tmp/log/1.log"));
        assert!(check_name("/.hidden.rc"));
        assert!(check_name("/目录/ファイル"));
    }

    #[test]
    fn test_invalid_names() {
        assert!(!check_name(""));
        assert!(!check_name("/"));
        assert!(!check_name("a/b"));
        assert!(!check_name("/a//b"));
        assert!(!check_name("/a/"));
        assert!(!check_name("/."));
        assert!(!check_name("/a/.."));
        assert!(!check_name("/a/b*"));
        assert!(!check_name("/a?b"));
        assert!(!check_name("/a\\b"));
        assert!(!check_name("/a:b"));
        assert!(!check_name("/a\"b"));
        assert!(!check_name("/<a>"));
        assert!(!check_name("/a|b"));
    }

    #[test]
    fn test_first_segment() {
        assert_eq!(first_segment("/docs/a.txt"), "docs");
        assert_eq!(first_segment("/zero"), "zero");
    }

    #[test]
    fn test_dir_prefix() {
        assert_eq!(dir_prefix("/"), "/");
        assert_eq!(dir_prefix("/a"), "/a/");
        assert_eq!(dir_prefix("/a/"), "/a/");
    }

    #[test]
    fn test_split_dir_base() {
        assert_eq!(split_dir_base("/a/b/c"), ("/a/b", "c"));
        assert_eq!(split_dir_base("/c"), ("/", "c"));
    }
}
