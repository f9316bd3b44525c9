use crate::geo::{encode, validate_coordinates, STORAGE_PRECISION};
use crate::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record identifier, assigned by the store.
pub type RecordId = i64;

/// Lifecycle state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    /// Visible to reads and search
    Active,
    /// Soft-deleted
    Deleted,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "ACTIVE",
            RecordStatus::Deleted => "DELETED",
        }
    }
}

/// A geolocated business record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub owner_id: i64,
    pub name: String,
    pub category: String,
    pub phone: Option<String>,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Derived from (latitude, longitude) at storage precision
    pub geohash: String,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Build an active record from validated input.
    pub(crate) fn from_new(id: RecordId, input: NewRecord, now: DateTime<Utc>) -> Self {
        Self {
            id,
            geohash: encode(input.latitude, input.longitude, STORAGE_PRECISION),
            owner_id: input.owner_id,
            name: input.name,
            category: input.category,
            phone: input.phone,
            address: input.address,
            latitude: input.latitude,
            longitude: input.longitude,
            status: RecordStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }
}

/// Caller-supplied fields for create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub owner_id: i64,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl NewRecord {
    /// Check required text fields and coordinate ranges.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Blank("name"));
        }
        if self.category.trim().is_empty() {
            return Err(ValidationError::Blank("category"));
        }
        if self.address.trim().is_empty() {
            return Err(ValidationError::Blank("address"));
        }
        validate_coordinates(self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_input() -> NewRecord {
        NewRecord {
            owner_id: 1,
            name: "Cafe".into(),
            category: "cafe".into(),
            phone: None,
            address: "Gangnam-daero 396".into(),
            latitude: 37.4991,
            longitude: 127.0313,
        }
    }

    #[test]
    fn test_from_new_derives_geohash() {
        let record = Record::from_new(9, create_test_input(), Utc::now());
        assert_eq!(record.id, 9);
        assert_eq!(record.geohash, "wydm6dt2");
        assert!(record.is_active());
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_validate_blank_fields() {
        let mut input = create_test_input();
        input.name = "  ".into();
        assert_eq!(input.validate(), Err(ValidationError::Blank("name")));

        let mut input = create_test_input();
        input.address = String::new();
        assert_eq!(input.validate(), Err(ValidationError::Blank("address")));
    }

    #[test]
    fn test_validate_coordinates() {
        let mut input = create_test_input();
        input.longitude = 200.0;
        assert_eq!(input.validate(), Err(ValidationError::Longitude(200.0)));
        assert!(create_test_input().validate().is_ok());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&RecordStatus::Deleted).unwrap();
        assert_eq!(json, "\"DELETED\"");
        assert_eq!(RecordStatus::Active.as_str(), "ACTIVE");
    }
}
