//! Parses a meta-file submission's bytes into `(target URI, field,
//! value)` tag triples. Grounded in `Blog.c`'s treatment of meta-files
//! as line-oriented tag sources for a target URI: the first non-blank
//! line is the target URI, followed by `field: value` lines until a
//! blank line or end of input.
//!
//! Unknown or malformed payloads silently produce zero tags rather than
//! failing the submission, per `spec.md` §4.4.

pub const META_FILE_MIME_TYPE: &str = "text/sln-meta+fieldvalue";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedTag {
    pub field: String,
    pub value: String,
}

pub struct MetaFileExtractor {
    mime_type: String,
    buffer: Vec<u8>,
}

impl MetaFileExtractor {
    pub fn new(mime_type: &str) -> Self {
        MetaFileExtractor {
            mime_type: mime_type.to_string(),
            buffer: Vec::new(),
        }
    }

    pub fn is_meta_file(&self) -> bool {
        self.mime_type == META_FILE_MIME_TYPE
    }

    pub fn write(&mut self, bytes: &[u8]) {
        if self.is_meta_file() {
            self.buffer.extend_from_slice(bytes);
        }
    }

    /// Returns `(target_uri, tags)`. `target_uri` is `None` for a
    /// malformed or unrecognized document, in which case `tags` is
    /// always empty.
    pub fn end(self) -> (Option<String>, Vec<ParsedTag>) {
        if !self.is_meta_file() {
            return (None, Vec::new());
        }
        let text = String::from_utf8_lossy(&self.buffer);
        let mut lines = text.lines();

        let Some(target) = lines.next().map(str::trim).filter(|l| !l.is_empty()) else {
            return (None, Vec::new());
        };
        if !target.contains("://") {
            return (None, Vec::new());
        }

        let mut tags = Vec::new();
        for line in lines {
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            tags.push(ParsedTag {
                field: field.trim().to_string(),
                value: value.trim().to_string(),
            });
        }
        (Some(target.to_string()), tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_target_and_tags() {
        let mut ext = MetaFileExtractor::new(META_FILE_MIME_TYPE);
        ext.write(b"hash://sha256/abcd\ntag: greeting\nauthor: alice\n");
        let (target, tags) = ext.end();
        assert_eq!(target.as_deref(), Some("hash://sha256/abcd"));
        assert_eq!(
            tags,
            vec![
                ParsedTag { field: "tag".into(), value: "greeting".into() },
                ParsedTag { field: "author".into(), value: "alice".into() },
            ]
        );
    }

    #[test]
    fn non_meta_mime_produces_no_tags() {
        let mut ext = MetaFileExtractor::new("text/plain");
        ext.write(b"hash://sha256/abcd\ntag: greeting\n");
        let (target, tags) = ext.end();
        assert_eq!(target, None);
        assert!(tags.is_empty());
    }

    #[test]
    fn malformed_first_line_yields_no_tags() {
        let mut ext = MetaFileExtractor::new(META_FILE_MIME_TYPE);
        ext.write(b"not a uri\ntag: x\n");
        let (target, tags) = ext.end();
        assert_eq!(target, None);
        assert!(tags.is_empty());
    }

    #[test]
    fn empty_input_yields_no_tags() {
        let ext = MetaFileExtractor::new(META_FILE_MIME_TYPE);
        let (target, tags) = ext.end();
        assert_eq!(target, None);
        assert!(tags.is_empty());
    }

    #[test]
    fn stops_at_blank_line() {
        let mut ext = MetaFileExtractor::new(META_FILE_MIME_TYPE);
        ext.write(b"hash://sha256/abcd\ntag: a\n\ntag: ignored\n");
        let (_, tags) = ext.end();
        assert_eq!(tags, vec![ParsedTag { field: "tag".into(), value: "a".into() }]);
    }
}
