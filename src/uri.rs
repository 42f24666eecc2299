//! Resource URI codec.
//!
//! Files opened from the explorer are addressed by URIs of the form
//!
//! ```text
//! azurestorage:///<resourceBaseName>/<filePath>?resourceId=<fullResourceId>
//! ```
//!
//! The path is what editors display; the query carries the full resource
//! identifier needed to address storage calls.  Decoding trusts the query
//! parameter for the resource and the path for the in-resource file path.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::debug;

use crate::errors::{ExplorerError, Result};
use crate::paths;

/// Scheme used when none is configured.
pub const DEFAULT_SCHEME: &str = "azurestorage";

/// Query parameter holding the full resource identifier.
pub const RESOURCE_ID_PARAM: &str = "resourceId";

/// Query values: encode everything except unreserved characters.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Path: same as the query set but `/` stays literal.
const PATH_ENCODE_SET: &AsciiSet = &QUERY_ENCODE_SET.remove(b'/');

/// A decoded resource URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResourcePath {
    /// Opaque identifier of the container or share.
    pub resource_id: String,
    /// Full path of the entry inside the resource, without a leading `/`.
    pub file_path: String,
    /// Parent directory of `file_path`, without a trailing `/`.
    pub parent_dir_path: String,
    /// Last segment of `file_path`; directories keep their trailing `/`.
    pub base_name: String,
}

impl ParsedResourcePath {
    /// Build the record and derive the parent and base name from `file_path`.
    pub fn new(resource_id: impl Into<String>, file_path: impl Into<String>) -> Self {
        let file_path = file_path.into();
        let parent_dir_path = paths::trim_slash(paths::dirname(&file_path)).to_string();
        let base_name = paths::basename(&file_path).to_string();
        Self {
            resource_id: resource_id.into(),
            file_path,
            parent_dir_path,
            base_name,
        }
    }

    /// True for the resource root itself.
    pub fn is_root(&self) -> bool {
        self.file_path.is_empty()
    }
}

/// Encoder/decoder bound to one URI scheme.
#[derive(Debug, Clone)]
pub struct ResourceUriCodec {
    scheme: String,
}

impl Default for ResourceUriCodec {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEME)
    }
}

impl ResourceUriCodec {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Build the URI for `file_path` inside `resource_id`.
    ///
    /// `file_path` is normalised on its own first, so `..` segments stop at
    /// the resource root instead of consuming the resource's base name.
    pub fn encode(&self, resource_id: &str, file_path: &str) -> String {
        let file_path = paths::posix_join("", file_path);
        let display_path = paths::posix_join(resource_base_name(resource_id), &file_path);
        let display_path = display_path.trim_start_matches(paths::SEPARATOR);
        format!(
            "{}:///{}?{}={}",
            self.scheme,
            utf8_percent_encode(display_path, PATH_ENCODE_SET),
            RESOURCE_ID_PARAM,
            utf8_percent_encode(resource_id, QUERY_ENCODE_SET),
        )
    }

    /// Parse a URI produced by [`ResourceUriCodec::encode`].
    pub fn decode(&self, uri: &str) -> Result<ParsedResourcePath> {
        let (scheme, rest) = uri.split_once(':').ok_or_else(|| ExplorerError::InvalidUri {
            uri: uri.to_string(),
            reason: "no scheme".to_string(),
        })?;
        if !scheme.eq_ignore_ascii_case(&self.scheme) {
            return Err(ExplorerError::UnsupportedScheme {
                expected: self.scheme.clone(),
                found: scheme.to_string(),
            });
        }

        let rest = rest.split_once('#').map_or(rest, |(before, _)| before);
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        let path = path.strip_prefix("//").ok_or_else(|| ExplorerError::InvalidUri {
            uri: uri.to_string(),
            reason: "expected an empty authority".to_string(),
        })?;

        let resource_id = query_param(query, RESOURCE_ID_PARAM).ok_or_else(|| {
            ExplorerError::MissingResourceId {
                uri: uri.to_string(),
            }
        })?;

        let path = percent_decode_str(path).decode_utf8_lossy();
        let path = path.trim_start_matches(paths::SEPARATOR);
        let root = resource_base_name(&resource_id);
        let file_path = if root.is_empty() {
            path.to_string()
        } else {
            let (first, remainder) = path.split_once(paths::SEPARATOR).unwrap_or((path, ""));
            if first != root {
                return Err(ExplorerError::InvalidUri {
                    uri: uri.to_string(),
                    reason: format!("path is not rooted at resource '{}'", root),
                });
            }
            remainder.to_string()
        };

        debug!(resource_id = %resource_id, file_path = %file_path, "decoded resource uri");
        Ok(ParsedResourcePath::new(resource_id, file_path))
    }
}

/// Encode with the default scheme.
pub fn encode(resource_id: &str, file_path: &str) -> String {
    ResourceUriCodec::default().encode(resource_id, file_path)
}

/// Decode with the default scheme.
pub fn decode(uri: &str) -> Result<ParsedResourcePath> {
    ResourceUriCodec::default().decode(uri)
}

/// Last segment of a resource identifier, ignoring a trailing separator.
fn resource_base_name(resource_id: &str) -> &str {
    let trimmed = resource_id.trim_end_matches(paths::SEPARATOR);
    trimmed.rsplit(paths::SEPARATOR).next().unwrap_or(trimmed)
}

/// Find and percent-decode a single query parameter.
fn query_param(query: &str, name: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|part| part.split_once('='))
        .find(|(k, _)| percent_decode_str(k).decode_utf8_lossy() == name)
        .map(|(_, v)| percent_decode_str(v).decode_utf8_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESOURCE: &str = "/subscriptions/0000/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/acct/blobServices/default/containers/container1";

    #[test]
    fn test_encode_shape() {
        let uri = encode(RESOURCE, "a/b/blob");
        assert!(uri.starts_with("azurestorage:///container1/a/b/blob?resourceId="));
        assert!(uri.contains("%2Fsubscriptions%2F0000"));
    }

    #[test]
    fn test_round_trip() {
        let parsed = decode(&encode(RESOURCE, "a/b/blob")).unwrap();
        assert_eq!(parsed.resource_id, RESOURCE);
        assert_eq!(parsed.file_path, "a/b/blob");
        assert_eq!(parsed.parent_dir_path, "a/b");
        assert_eq!(parsed.base_name, "blob");
    }

    #[test]
    fn test_round_trip_normalizes_leading_separator() {
        let parsed = decode(&encode(RESOURCE, "/a//b/blob")).unwrap();
        assert_eq!(parsed.resource_id, RESOURCE);
        assert_eq!(parsed.file_path, "a/b/blob");
    }

    #[test]
    fn test_round_trip_parent_segments_stop_at_resource_root() {
        let uri = encode(RESOURCE, "../evil");
        assert!(uri.starts_with("azurestorage:///container1/evil?"));
        let parsed = decode(&uri).unwrap();
        assert_eq!(parsed.resource_id, RESOURCE);
        assert_eq!(parsed.file_path, "evil");

        let parsed = decode(&encode(RESOURCE, "a/../../b/c")).unwrap();
        assert_eq!(parsed.file_path, "b/c");
        assert_eq!(parsed.parent_dir_path, "b");

        let parsed = decode(&encode(RESOURCE, "../..")).unwrap();
        assert!(parsed.is_root());
    }

    #[test]
    fn test_round_trip_directory() {
        let parsed = decode(&encode(RESOURCE, "dir/sub/")).unwrap();
        assert_eq!(parsed.file_path, "dir/sub/");
        assert_eq!(parsed.parent_dir_path, "dir");
        assert_eq!(parsed.base_name, "sub/");
    }

    #[test]
    fn test_round_trip_special_characters() {
        let parsed = decode(&encode("/x/containers/c", "my file #1?.txt")).unwrap();
        assert_eq!(parsed.resource_id, "/x/containers/c");
        assert_eq!(parsed.file_path, "my file #1?.txt");
    }

    #[test]
    fn test_root() {
        let parsed = decode(&encode(RESOURCE, "")).unwrap();
        assert!(parsed.is_root());
        assert_eq!(parsed.parent_dir_path, "");
        assert_eq!(parsed.base_name, "");
    }

    #[test]
    fn test_parsed_path_invariant() {
        for p in ["a", "a/b", "a/b/c.txt", "a/b/"] {
            let parsed = ParsedResourcePath::new("r", p);
            let rebuilt = if parsed.parent_dir_path.is_empty() {
                parsed.base_name.clone()
            } else {
                format!("{}/{}", parsed.parent_dir_path, parsed.base_name)
            };
            assert_eq!(rebuilt, p);
        }
    }

    #[test]
    fn test_custom_scheme() {
        let codec = ResourceUriCodec::new("azurefile");
        let uri = codec.encode("/shares/share1", "docs/readme.md");
        assert!(uri.starts_with("azurefile:///share1/docs/readme.md?"));
        assert_eq!(codec.decode(&uri).unwrap().file_path, "docs/readme.md");
    }

    #[test]
    fn test_wrong_scheme() {
        let err = decode("file:///container1/a?resourceId=x").unwrap_err();
        assert_eq!(err.code(), "UnsupportedScheme");
    }

    #[test]
    fn test_missing_resource_id() {
        let err = decode("azurestorage:///container1/a").unwrap_err();
        assert_eq!(err.code(), "MissingResourceId");
    }

    #[test]
    fn test_path_not_under_resource() {
        let err = decode("azurestorage:///other/a?resourceId=%2Fc%2Fcontainer1").unwrap_err();
        assert_eq!(err.code(), "InvalidUri");
    }

    #[test]
    fn test_no_scheme() {
        assert_eq!(decode("no-scheme-here").unwrap_err().code(), "InvalidUri");
    }
}
