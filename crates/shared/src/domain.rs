use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(PhotoId);
id_newtype!(OwnerId);

/// Provider visibility flags, carried through untouched. The search layer
/// never filters on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Visibility {
    pub is_public: bool,
    pub is_friend: bool,
    pub is_family: bool,
}

/// One search result. `secret`, `server`, and `farm` are opaque tokens the
/// provider hands out purely so clients can assemble image URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    pub id: PhotoId,
    pub owner: OwnerId,
    pub secret: String,
    pub server: String,
    pub farm: u32,
    pub title: String,
    pub visibility: Visibility,
}

pub const DEFAULT_DOWNLOAD_STEM: &str = "flickr-image";

impl Photo {
    /// Grid-size image URL (`w` suffix).
    pub fn thumbnail_url(&self, image_host: &str) -> String {
        self.image_url(image_host, "w")
    }

    /// Full-size image URL (`b` suffix).
    pub fn original_url(&self, image_host: &str) -> String {
        self.image_url(image_host, "b")
    }

    fn image_url(&self, image_host: &str, size_suffix: &str) -> String {
        let host = image_host.trim_end_matches('/');
        format!(
            "{host}/{server}/{id}_{secret}_{size_suffix}.jpg",
            server = self.server,
            id = self.id,
            secret = self.secret
        )
    }

    /// Suggested file name for a locally saved copy of the full-size image:
    /// the title when present, a fixed stem otherwise, always tagged with the
    /// photo id so repeated downloads do not collide.
    pub fn download_filename(&self) -> String {
        let title = self.title.trim();
        let stem = if title.is_empty() {
            DEFAULT_DOWNLOAD_STEM
        } else {
            title
        };
        format!("{}-{}.jpg", sanitize_filename_stem(stem), self.id)
    }
}

fn sanitize_filename_stem(stem: &str) -> String {
    stem.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}
