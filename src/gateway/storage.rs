use std::{fmt, path::Path, str::FromStr};

use bytes::Bytes;
use happylife_types::Collection;
use time::OffsetDateTime;
use url::Url;

use super::GatewayError;

/// Object storage buckets, one per media category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    About,
    Donations,
    Events,
    Blogs,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [Bucket::About, Bucket::Donations, Bucket::Events, Bucket::Blogs];

    pub fn name(self) -> &'static str {
        match self {
            Bucket::About => "about-images",
            Bucket::Donations => "donation-images",
            Bucket::Events => "event-images",
            Bucket::Blogs => "blog-images",
        }
    }

    /// Object name prefix for uploads into this bucket.
    pub fn prefix(self) -> &'static str {
        match self {
            Bucket::About => "about",
            Bucket::Donations => "donation",
            Bucket::Events => "event",
            Bucket::Blogs => "blog",
        }
    }

    pub fn for_collection(collection: Collection) -> Option<Self> {
        match collection {
            Collection::About => Some(Bucket::About),
            Collection::Donations => Some(Bucket::Donations),
            Collection::Events => Some(Bucket::Events),
            Collection::Blogs => Some(Bucket::Blogs),
            Collection::Messages => None,
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBucket(pub String);

impl fmt::Display for UnknownBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown bucket `{}`", self.0)
    }
}

impl std::error::Error for UnknownBucket {}

impl FromStr for Bucket {
    type Err = UnknownBucket;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Bucket::ALL
            .into_iter()
            .find(|bucket| bucket.name() == normalized || bucket.prefix() == normalized)
            .or_else(|| {
                normalized
                    .parse::<Collection>()
                    .ok()
                    .and_then(Bucket::for_collection)
            })
            .ok_or_else(|| UnknownBucket(value.to_string()))
    }
}

/// A file ready for upload, named `{prefix}-{unix_millis}.{ext}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bucket: Bucket,
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl StoredObject {
    pub fn new(bucket: Bucket, file_name: &str, bytes: Bytes, at: OffsetDateTime) -> Self {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .unwrap_or("bin")
            .to_ascii_lowercase();
        let millis = at.unix_timestamp_nanos() / 1_000_000;
        let content_type = mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Self {
            bucket,
            name: format!("{}-{millis}.{extension}", bucket.prefix()),
            content_type,
            bytes,
        }
    }

    /// Read a local file into an upload.
    pub async fn from_path(
        bucket: Bucket,
        path: &Path,
        at: OffsetDateTime,
    ) -> Result<Self, std::io::Error> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        Ok(Self::new(bucket, file_name, Bytes::from(bytes), at))
    }

    pub fn public_url(&self, base: &Url) -> Result<String, GatewayError> {
        base.join(&format!(
            "storage/v1/object/public/{}/{}",
            self.bucket.name(),
            self.name
        ))
        .map(String::from)
        .map_err(|err| GatewayError::decode(format!("invalid public url: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use time::macros::datetime;

    use super::*;

    #[test]
    fn object_names_use_prefix_millis_and_extension() {
        let object = StoredObject::new(
            Bucket::Donations,
            "Well Photo.JPG",
            Bytes::from_static(b"jpeg"),
            datetime!(2024-05-01 12:00:00.123 UTC),
        );
        assert_eq!(object.name, "donation-1714564800123.jpg");
        assert_eq!(object.content_type, "image/jpeg");
    }

    #[test]
    fn unknown_types_fall_back_to_octet_stream() {
        let object = StoredObject::new(
            Bucket::Blogs,
            "notes",
            Bytes::new(),
            datetime!(2024-05-01 0:00 UTC),
        );
        assert!(object.name.ends_with(".bin"));
        assert_eq!(object.content_type, "application/octet-stream");
    }

    #[test]
    fn public_url_points_at_public_object_path() {
        let object = StoredObject::new(
            Bucket::About,
            "team.png",
            Bytes::new(),
            datetime!(2024-05-01 0:00 UTC),
        );
        let base = Url::parse("https://project.supabase.co/").expect("base");
        assert_eq!(
            object.public_url(&base).expect("url"),
            format!(
                "https://project.supabase.co/storage/v1/object/public/about-images/{}",
                object.name
            )
        );
    }

    #[test]
    fn buckets_parse_from_names_and_collections() {
        assert_eq!("event-images".parse::<Bucket>(), Ok(Bucket::Events));
        assert_eq!("blogs".parse::<Bucket>(), Ok(Bucket::Blogs));
        assert!("messages".parse::<Bucket>().is_err());
    }

    #[tokio::test]
    async fn from_path_reads_file_contents() {
        let mut file = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .expect("temp file");
        file.write_all(b"\x89PNG").expect("write");

        let at = datetime!(2024-05-01 0:00 UTC);
        let object = StoredObject::from_path(Bucket::Events, file.path(), at)
            .await
            .expect("read upload");
        assert_eq!(object.bytes.as_ref(), b"\x89PNG");
        assert_eq!(object.content_type, "image/png");
        assert!(object.name.starts_with("event-"));
    }
}
