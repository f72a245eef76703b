//! Builds the public URL the extraction service fetches an object from.

/// Path-style object URL: `{origin}/{bucket}/{key}`.
///
/// The bucket and key are concatenated exactly as received. Keys from S3
/// notifications are already in the form the storage provider addresses them
/// by, so nothing is escaped and nothing is validated; an empty key yields a
/// URL ending in `/`.
pub fn resolve(origin: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", origin, bucket, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://s3.amazonaws.com";

    #[test]
    fn joins_origin_bucket_and_key() {
        assert_eq!(resolve(ORIGIN, "b", "k"), "https://s3.amazonaws.com/b/k");
        assert_eq!(
            resolve(ORIGIN, "b1", "k1.pdf"),
            "https://s3.amazonaws.com/b1/k1.pdf"
        );
    }

    #[test]
    fn performs_no_escaping() {
        assert_eq!(
            resolve(ORIGIN, "docs", "uploads/org 1/r%C3%A9sum\u{e9}+v2.pdf"),
            "https://s3.amazonaws.com/docs/uploads/org 1/r%C3%A9sum\u{e9}+v2.pdf"
        );
    }

    #[test]
    fn empty_key_leaves_trailing_segment() {
        assert_eq!(resolve(ORIGIN, "b", ""), "https://s3.amazonaws.com/b/");
    }

    #[test]
    fn is_deterministic() {
        assert_eq!(resolve(ORIGIN, "b", "a/b/c"), resolve(ORIGIN, "b", "a/b/c"));
    }
}
