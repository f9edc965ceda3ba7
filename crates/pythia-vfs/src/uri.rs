//! Document URI conversions.
//!
//! Rooted paths become regular `file:` URIs. Unrooted paths (scraped or
//! synthetic modules) are encoded under `file:///LOCAL-PATH/` with
//! backslashes normalised to `/`.

use std::path::{Path, PathBuf};

use lsp_types::Url;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use pythia_std::error::prelude::*;
use pythia_std::path::unix_slash;

/// The prefix under which unrooted paths are encoded.
pub const LOCAL_PATH_PREFIX: &str = "/LOCAL-PATH/";

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Converts a path to a document URI.
pub fn uri_from_path(path: &Path) -> Result<Url> {
    if path.is_absolute() {
        return Url::from_file_path(path)
            .map_err(|_| error_once!("invalid absolute path", path: path.display()));
    }
    let rel = unix_slash(path);
    let encoded = utf8_percent_encode(&rel, PATH_SEGMENT).to_string();
    Url::parse(&format!("file://{LOCAL_PATH_PREFIX}{encoded}")).context_ut("encode local path")
}

/// Recovers the path from a document URI, when it has one.
pub fn path_from_uri(uri: &Url) -> Option<PathBuf> {
    if uri.scheme() != "file" {
        return None;
    }
    if let Some(rest) = uri.path().strip_prefix(LOCAL_PATH_PREFIX) {
        let decoded = percent_encoding::percent_decode_str(rest)
            .decode_utf8()
            .ok()?;
        return Some(PathBuf::from(decoded.as_ref()));
    }
    uri.to_file_path().ok()
}

/// A URI for a module that has no backing file at all.
pub fn synthetic_uri(module_name: &str) -> Result<Url> {
    uri_from_path(Path::new(module_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rooted_path_round_trip() {
        let uri = uri_from_path(Path::new("/w/pkg/mod.py")).unwrap();
        assert_eq!(uri.as_str(), "file:///w/pkg/mod.py");
        assert_eq!(path_from_uri(&uri).unwrap(), PathBuf::from("/w/pkg/mod.py"));
    }

    #[test]
    fn test_unrooted_path_uses_local_path_scheme() {
        let uri = uri_from_path(Path::new("scraped/sys.py")).unwrap();
        assert_eq!(uri.as_str(), "file:///LOCAL-PATH/scraped/sys.py");
        assert_eq!(
            path_from_uri(&uri).unwrap(),
            PathBuf::from("scraped/sys.py")
        );
    }

    #[test]
    fn test_unrooted_path_with_spaces() {
        let uri = uri_from_path(Path::new("some dir/mod.py")).unwrap();
        assert_eq!(uri.as_str(), "file:///LOCAL-PATH/some%20dir/mod.py");
    }
}
