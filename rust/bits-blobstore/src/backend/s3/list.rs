//! Parsing of [ListObjectsV2] responses and S3 error documents.
//!
//! [ListObjectsV2]: https://docs.aws.amazon.com/AmazonS3/latest/API/API_ListObjectsV2.html

use serde::Deserialize;

use crate::BlobstoreError;

/// One page of a ListObjectsV2 listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPage {
    /// Object keys on this page
    pub keys: Vec<String>,
    /// Token for the next page, if the listing is truncated
    pub continuation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "ListBucketResult")]
struct ListBucketResult {
    #[serde(rename = "IsTruncated", default)]
    is_truncated: bool,
    #[serde(rename = "Contents", default)]
    contents: Vec<Contents>,
    #[serde(rename = "NextContinuationToken")]
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Contents {
    #[serde(rename = "Key")]
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Error")]
struct ErrorDocument {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message")]
    message: Option<String>,
}

/// The `Code: Message` of an S3 `<Error>` document, if `xml` is one.
pub fn error_message(xml: &str) -> Option<String> {
    let error = quick_xml::de::from_str::<ErrorDocument>(xml).ok()?;
    Some(format!("{}: {}", error.code, error.message.unwrap_or_default()))
}

/// Parse a ListObjectsV2 response body.
pub fn parse(xml: &str) -> Result<ListPage, BlobstoreError> {
    if let Some(message) = error_message(xml) {
        return Err(BlobstoreError::Backend(message));
    }

    // quick-xml ignores the root element name, so check for it explicitly.
    if !xml.contains("<ListBucketResult") {
        return Err(BlobstoreError::Backend(
            "Unexpected listing: missing ListBucketResult element".into(),
        ));
    }

    let result: ListBucketResult = quick_xml::de::from_str(xml)
        .map_err(|error| BlobstoreError::Backend(format!("Malformed listing: {error}")))?;

    Ok(ListPage {
        keys: result.contents.into_iter().map(|entry| entry.key).collect(),
        continuation: if result.is_truncated {
            result.next_continuation_token
        } else {
            None
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_parses_an_empty_listing() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <ListBucketResult>
                <IsTruncated>false</IsTruncated>
            </ListBucketResult>"#;

        assert_eq!(
            parse(xml).unwrap(),
            ListPage {
                keys: vec![],
                continuation: None
            }
        );
    }

    #[test]
    fn it_parses_keys() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <ListBucketResult>
                <IsTruncated>false</IsTruncated>
                <Contents>
                    <Key>ab/cd/abcd</Key>
                    <Size>100</Size>
                </Contents>
                <Contents>
                    <Key>ab/ce/abce</Key>
                    <Size>200</Size>
                </Contents>
            </ListBucketResult>"#;

        let page = parse(xml).unwrap();
        assert_eq!(page.keys, vec!["ab/cd/abcd", "ab/ce/abce"]);
        assert_eq!(page.continuation, None);
    }

    #[test]
    fn it_follows_truncation() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <ListBucketResult>
                <IsTruncated>true</IsTruncated>
                <NextContinuationToken>abc123</NextContinuationToken>
                <Contents>
                    <Key>key1</Key>
                </Contents>
            </ListBucketResult>"#;

        let page = parse(xml).unwrap();
        assert_eq!(page.keys, vec!["key1"]);
        assert_eq!(page.continuation, Some("abc123".to_string()));
    }

    #[test]
    fn it_rejects_unexpected_documents() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <WrongRootElement>
                <IsTruncated>false</IsTruncated>
            </WrongRootElement>"#;
        assert!(
            matches!(parse(xml), Err(BlobstoreError::Backend(ref message)) if message.contains("ListBucketResult"))
        );

        assert!(parse("this is not xml at all { json: maybe? }").is_err());
    }

    #[test]
    fn it_surfaces_error_documents() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <Error>
                <Code>NoSuchBucket</Code>
                <Message>The specified bucket does not exist</Message>
                <BucketName>nonexistent-bucket</BucketName>
                <RequestId>ABC123</RequestId>
            </Error>"#;

        assert_eq!(
            error_message(xml),
            Some("NoSuchBucket: The specified bucket does not exist".to_string())
        );
        assert!(
            matches!(parse(xml), Err(BlobstoreError::Backend(ref message)) if message.starts_with("NoSuchBucket"))
        );
    }
}
