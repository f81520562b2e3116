use crate::error::CloudError;

pub const GCS_SCHEME: &str = "gs://";

/// A bucket plus an optional object path, with any `gs://` scheme removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub object: Option<String>,
}

impl ObjectLocation {
    pub fn require_object(&self) -> Result<&str, CloudError> {
        self.object
            .as_deref()
            .filter(|object| !object.is_empty())
            .ok_or_else(|| {
                CloudError::Configuration("object_path must include the blob name".to_string())
            })
    }
}

/// Resolves `bucket` and `object` into a location.
///
/// A full `gs://bucket/object` URI in `object` overrides `bucket` entirely.
pub fn normalize(bucket: &str, object: Option<&str>) -> Result<ObjectLocation, CloudError> {
    let object = object.filter(|object| !object.is_empty());

    if let Some(uri) = object.and_then(|object| object.strip_prefix(GCS_SCHEME)) {
        let Some((bucket_part, object_part)) = uri.split_once('/') else {
            return Err(CloudError::MalformedInput(format!(
                "expected gs://<bucket>/<object>, got {GCS_SCHEME}{uri}"
            )));
        };
        return located(bucket_part, Some(object_part));
    }

    let bucket = bucket.strip_prefix(GCS_SCHEME).unwrap_or(bucket);
    located(bucket, object)
}

fn located(bucket: &str, object: Option<&str>) -> Result<ObjectLocation, CloudError> {
    if bucket.is_empty() {
        return Err(CloudError::MalformedInput("bucket name is empty".to_string()));
    }
    Ok(ObjectLocation {
        bucket: bucket.to_string(),
        object: object.map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_from_bucket() {
        let location = normalize("gs://aisports-news", None).expect("normalizes");
        assert_eq!(location.bucket, "aisports-news");
        assert_eq!(location.object, None);

        let location = normalize("aisports-news", Some("news_data/a.json")).expect("normalizes");
        assert_eq!(location.bucket, "aisports-news");
        assert_eq!(location.object.as_deref(), Some("news_data/a.json"));
    }

    #[test]
    fn object_uri_overrides_bucket_argument() {
        let location =
            normalize("other", Some("gs://mybucket/path/to/file.json")).expect("normalizes");
        assert_eq!(
            location,
            ObjectLocation {
                bucket: "mybucket".to_string(),
                object: Some("path/to/file.json".to_string()),
            }
        );
    }

    #[test]
    fn uri_without_separator_is_malformed() {
        let err = normalize("b", Some("gs://only-bucket")).expect_err("must fail");
        assert!(matches!(err, CloudError::MalformedInput(_)));
    }

    #[test]
    fn empty_bucket_is_rejected() {
        assert!(normalize("gs://", None).is_err());
        assert!(normalize("x", Some("gs:///object")).is_err());
    }

    #[test]
    fn missing_object_fails_require_object() {
        let location = normalize("bucket", Some("")).expect("normalizes");
        assert!(matches!(
            location.require_object(),
            Err(CloudError::Configuration(_))
        ));

        let location = normalize("bucket", Some("gs://bucket/")).expect("normalizes");
        assert!(location.require_object().is_err());
    }
}
