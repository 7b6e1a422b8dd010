use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{OwnerId, Photo, PhotoId, Visibility};

/// Top-level reply from the photo-search endpoint. `stat` is `"ok"` on
/// success; failure replies keep HTTP 200 and carry the provider's own
/// `code`/`message` pair instead of a photo page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photos: Option<PhotoPage>,
    pub stat: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SearchEnvelope {
    pub fn is_ok(&self) -> bool {
        self.stat == "ok"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoPage {
    pub page: u32,
    pub pages: u32,
    pub perpage: u32,
    /// Total match count. Specified as a decimal string on the wire; some
    /// provider deployments send a bare number, so both forms are accepted.
    #[serde(deserialize_with = "string_or_number")]
    pub total: String,
    pub photo: Vec<PhotoRecord>,
}

impl PhotoPage {
    pub fn parse_total(&self) -> Result<u64, std::num::ParseIntError> {
        self.total.trim().parse::<u64>()
    }
}

/// One photo as serialized by the provider. Field names follow the wire
/// format; `is*` flags arrive as 0/1 numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub id: PhotoId,
    pub owner: OwnerId,
    pub secret: String,
    pub server: String,
    #[serde(default)]
    pub farm: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub ispublic: u8,
    #[serde(default)]
    pub isfriend: u8,
    #[serde(default)]
    pub isfamily: u8,
}

impl From<PhotoRecord> for Photo {
    fn from(record: PhotoRecord) -> Self {
        Photo {
            id: record.id,
            owner: record.owner,
            secret: record.secret,
            server: record.server,
            farm: record.farm,
            title: record.title,
            visibility: Visibility {
                is_public: record.ispublic != 0,
                is_friend: record.isfriend != 0,
                is_family: record.isfamily != 0,
            },
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TotalRepr {
        Text(String),
        Number(u64),
    }

    Ok(match TotalRepr::deserialize(deserializer)? {
        TotalRepr::Text(value) => value,
        TotalRepr::Number(value) => value.to_string(),
    })
}
