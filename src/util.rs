use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};

/// Allow only alphanumerics, dot, underscore, and dash in a path component.
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Sanitize every component of a path, preserving absolute/relative form.
pub fn sanitize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::Normal(part) => {
                out.push(sanitize_filename(&part.to_string_lossy()));
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// First 12 hex chars of SHA1(url). Stable per URL, so re-fetching the same
/// URL overwrites the same file instead of accumulating duplicates.
pub fn url_hash(url: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..12].to_string()
}

/// Truncate to a char boundary without panicking on multi-byte input.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_disallowed_chars() {
        assert_eq!(sanitize_filename("a b/c:d?.txt"), "a_b_c_d_.txt");
        assert_eq!(sanitize_filename("safe-name_1.html"), "safe-name_1.html");
    }

    #[test]
    fn sanitize_path_keeps_structure() {
        let p = sanitize_path(Path::new("results/what is rust?/file.html"));
        assert_eq!(p, PathBuf::from("results/what_is_rust_/file.html"));
    }

    #[test]
    fn url_hash_is_stable_and_short() {
        let a = url_hash("https://example.com/page");
        let b = url_hash("https://example.com/page");
        let c = url_hash("https://example.com/other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn truncate_chars_handles_multibyte() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
    }
}
