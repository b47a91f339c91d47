//! Marker entity and its remote record encoding.
//!
//! Remote records are flat JSON objects with the field names below. Records
//! written by older clients may miss fields or carry `null`s, so decoding
//! defaults every optional field and only rejects records without a usable
//! location.

use foundation::ids::{MarkerId, UserId};
use foundation::math::{Coordinate, CoordinateError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::remote::Document;

/// A persisted incident report.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: MarkerId,
    pub location: Coordinate,
    pub title: String,
    pub description: String,
    pub owner_id: UserId,
    pub created_at: String,
    pub image_url: Option<String>,
    pub address: Option<String>,
}

/// A marker that has not been persisted yet (no id).
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerInput {
    pub location: Coordinate,
    pub title: String,
    pub description: String,
    pub owner_id: UserId,
    pub created_at: String,
    pub image_url: Option<String>,
    pub address: Option<String>,
}

/// Fields an update may change. `None` leaves the remote field untouched.
///
/// Owner and location are fixed at creation and cannot be patched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<String>,
    /// `Some(None)` clears the image.
    pub image_url: Option<Option<String>>,
    /// `Some(None)` clears the address.
    pub address: Option<Option<String>>,
}

/// Wire shape of a marker record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkerRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    address: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    Malformed(String),
    MissingLocation,
    InvalidLocation(CoordinateError),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Malformed(msg) => write!(f, "malformed marker record: {msg}"),
            DecodeError::MissingLocation => write!(f, "marker record has no latitude/longitude"),
            DecodeError::InvalidLocation(e) => write!(f, "marker record location invalid: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

impl Marker {
    pub fn from_document(doc: &Document) -> Result<Self, DecodeError> {
        let record: MarkerRecord = serde_json::from_value(doc.fields.clone())
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;

        let (Some(lat), Some(lon)) = (record.latitude, record.longitude) else {
            return Err(DecodeError::MissingLocation);
        };
        let location = Coordinate::new(lat, lon).map_err(DecodeError::InvalidLocation)?;

        Ok(Self {
            id: MarkerId::new(doc.id.clone()),
            location,
            title: record.title.unwrap_or_default(),
            description: record.description.unwrap_or_default(),
            owner_id: UserId::new(record.user_id.unwrap_or_default()),
            created_at: record.time.unwrap_or_default(),
            image_url: non_empty(record.image_url),
            address: non_empty(record.address),
        })
    }

    pub fn apply(&mut self, patch: &MarkerPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(created_at) = &patch.created_at {
            self.created_at = created_at.clone();
        }
        if let Some(image_url) = &patch.image_url {
            self.image_url = non_empty(image_url.clone());
        }
        if let Some(address) = &patch.address {
            self.address = non_empty(address.clone());
        }
    }
}

impl MarkerInput {
    pub fn into_marker(self, id: MarkerId) -> Marker {
        Marker {
            id,
            location: self.location,
            title: self.title,
            description: self.description,
            owner_id: self.owner_id,
            created_at: self.created_at,
            image_url: non_empty(self.image_url),
            address: non_empty(self.address),
        }
    }

    /// Encodes the full record. Absent optional strings are written as `""`.
    pub fn to_fields(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(MarkerRecord {
            latitude: Some(self.location.latitude),
            longitude: Some(self.location.longitude),
            title: Some(self.title.clone()),
            description: Some(self.description.clone()),
            user_id: Some(self.owner_id.as_str().to_string()),
            time: Some(self.created_at.clone()),
            image_url: Some(self.image_url.clone().unwrap_or_default()),
            address: Some(self.address.clone().unwrap_or_default()),
        })
    }
}

impl MarkerPatch {
    pub fn is_empty(&self) -> bool {
        self == &MarkerPatch::default()
    }

    /// Encodes only the fields present in the patch.
    pub fn to_fields(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(MarkerRecord {
            title: self.title.clone(),
            description: self.description.clone(),
            time: self.created_at.clone(),
            image_url: self.image_url.clone().map(Option::unwrap_or_default),
            address: self.address.clone().map(Option::unwrap_or_default),
            ..MarkerRecord::default()
        })
    }
}
