use encoding_rs::{Encoding, UTF_8};
use std::collections::BTreeSet;

use crate::config::split_list;

/// Extensions whose content is never indexed (archives, binaries, images,
/// office documents).
pub const DEFAULT_EXCLUDED_EXTENSIONS: &str = "7z arc arj bin bmp dll doc docx exe gif gz jar jpg \
     lib lzh odg odf odt pdf ppt png so swf xcf xls xlsx zip";

pub const DEFAULT_ENCODINGS: &str = "UTF-8 ISO-8859-1";

/// Which blobs get their content indexed and how their bytes are decoded.
#[derive(Debug, Clone)]
pub struct IndexPolicy {
    excluded_extensions: BTreeSet<String>,
    encodings: Vec<&'static Encoding>,
}

impl Default for IndexPolicy {
    fn default() -> Self {
        Self::new(
            &split_list(DEFAULT_EXCLUDED_EXTENSIONS),
            &split_list(DEFAULT_ENCODINGS),
        )
    }
}

impl IndexPolicy {
    /// Unknown encoding labels are logged and ignored.
    pub fn new(excluded_extensions: &[String], encodings: &[String]) -> Self {
        let excluded_extensions = excluded_extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        let encodings = encodings
            .iter()
            .filter_map(|label| {
                let encoding = Encoding::for_label(label.as_bytes());
                if encoding.is_none() {
                    tracing::warn!("Ignoring unknown blob encoding {label}");
                }
                encoding
            })
            .collect();
        Self {
            excluded_extensions,
            encodings,
        }
    }

    /// Reads `REPO_SEARCH_EXCLUDED_EXTENSIONS` and `REPO_SEARCH_BLOB_ENCODINGS`,
    /// falling back to the defaults for whichever is unset.
    pub fn from_env() -> Self {
        let extensions = std::env::var("REPO_SEARCH_EXCLUDED_EXTENSIONS")
            .unwrap_or_else(|_| DEFAULT_EXCLUDED_EXTENSIONS.to_string());
        let encodings = std::env::var("REPO_SEARCH_BLOB_ENCODINGS")
            .unwrap_or_else(|_| DEFAULT_ENCODINGS.to_string());
        Self::new(&split_list(&extensions), &split_list(&encodings))
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        extension(path).is_some_and(|ext| self.excluded_extensions.contains(&ext))
    }

    /// Decode blob bytes with the first encoding that accepts them.
    ///
    /// UTF-8 is always tried first. Content with NUL bytes is binary and
    /// yields `None`, as do bytes no configured encoding can map.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        if bytes.contains(&0) {
            return None;
        }
        if let Ok(text) = std::str::from_utf8(bytes) {
            return Some(text.strip_prefix('\u{feff}').unwrap_or(text).to_string());
        }
        self.encodings
            .iter()
            .filter(|e| **e != UTF_8)
            .find_map(|e| e.decode_without_bom_handling_and_without_replacement(bytes))
            .map(|text| text.into_owned())
    }
}

/// Lowercase extension of the file name in `path`, if it has one.
pub fn extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_excludes_binaries() {
        let policy = IndexPolicy::default();
        assert!(policy.is_excluded("dist/app.ZIP"));
        assert!(policy.is_excluded("img/logo.png"));
        assert!(!policy.is_excluded("src/main.rs"));
        assert!(!policy.is_excluded("Makefile"));
        assert!(!policy.is_excluded(".gitignore"));
    }

    #[test]
    fn test_custom_extensions() {
        let policy = IndexPolicy::new(&[".LOG".to_string()], &[]);
        assert!(policy.is_excluded("out/build.log"));
        assert!(!policy.is_excluded("a.zip"));
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("a/b/Main.Java"), Some("java".to_string()));
        assert_eq!(extension("a.dir/README"), None);
        assert_eq!(extension(".bashrc"), None);
        assert_eq!(extension("trailing."), None);
    }

    #[test]
    fn test_decode_prefers_utf8() {
        let policy = IndexPolicy::default();
        assert_eq!(policy.decode("grüße".as_bytes()).as_deref(), Some("grüße"));
        assert_eq!(
            policy.decode(b"\xef\xbb\xbfbom").as_deref(),
            Some("bom")
        );
    }

    #[test]
    fn test_decode_falls_back_to_configured_encodings() {
        let policy = IndexPolicy::default();
        // "café" in Latin-1
        assert_eq!(policy.decode(b"caf\xe9").as_deref(), Some("café"));

        let utf8_only = IndexPolicy::new(&[], &["UTF-8".to_string()]);
        assert_eq!(utf8_only.decode(b"caf\xe9"), None);
    }

    #[test]
    fn test_decode_rejects_binary() {
        assert_eq!(IndexPolicy::default().decode(b"\x00\x01\x02ELF"), None);
    }

    #[test]
    fn test_unknown_encoding_is_ignored() {
        let policy = IndexPolicy::new(&[], &["klingon".to_string(), "latin1".to_string()]);
        assert_eq!(policy.decode(b"na\xefve").as_deref(), Some("naïve"));
    }
}
