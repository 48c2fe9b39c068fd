//! Object path handling at the request boundary.
//!
//! Paths stay plain strings. The only normalization the backend needs is the
//! trailing separator that marks a directory request; without it a listing of an
//! existing directory comes back empty and a directory delete targets a file.

/// Path separator used by the backend.
pub const SEPARATOR: char = '/';

/// Mark `path` as a directory by appending a separator.
///
/// Appended unconditionally; the backend treats `dir//` like `dir/`.
pub fn as_directory(path: &str) -> String {
    let mut dir = String::with_capacity(path.len() + 1);
    dir.push_str(path);
    dir.push(SEPARATOR);
    dir
}

/// Percent-encode each segment of `path`, keeping separators.
///
/// A single leading separator is dropped so `a/b` and `/a/b` address the same object.
pub fn encode(path: &str) -> String {
    let path = path.strip_prefix(SEPARATOR).unwrap_or(path);
    path.split(SEPARATOR)
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Full request URL for `path` under `endpoint` (which carries no trailing slash).
pub fn url(endpoint: &str, path: &str) -> String {
    format!("{endpoint}/{}", encode(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_gets_trailing_separator() {
        assert_eq!(as_directory("dir"), "dir/");
        assert_eq!(as_directory("a/b"), "a/b/");
    }

    #[test]
    fn directory_append_is_unconditional() {
        assert_eq!(as_directory("dir/"), "dir//");
    }

    #[test]
    fn encode_keeps_separators() {
        assert_eq!(encode("dir/sub/file.txt"), "dir/sub/file.txt");
        assert_eq!(encode("dir/"), "dir/");
    }

    #[test]
    fn encode_escapes_segments() {
        assert_eq!(encode("my dir/a+b?.txt"), "my%20dir/a%2Bb%3F.txt");
    }

    #[test]
    fn leading_separator_dropped() {
        assert_eq!(encode("/a/b"), "a/b");
        assert_eq!(url("https://la.storage.example.com/zone", "/a/b"), url("https://la.storage.example.com/zone", "a/b"));
    }

    #[test]
    fn url_joins_endpoint() {
        assert_eq!(
            url("http://127.0.0.1:8080/zone", "dir/f"),
            "http://127.0.0.1:8080/zone/dir/f"
        );
    }
}
