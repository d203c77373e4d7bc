/**
 * Attendance Check-in Payload
 *
 * Shape of the `data` object for `entity_type = attendance`. The kiosk builds
 * it from a `CheckIn` action; the server parses and validates the same struct
 * before writing, so a malformed check-in is rejected consistently on both
 * sides.
 */
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::SharedError;

/// Kind of service a check-in belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    SundayService,
    MidweekService,
    PrayerMeeting,
    YouthService,
    ChildrenService,
    SpecialEvent,
}

/// How the check-in was captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckInMethod {
    Qr,
    Kiosk,
    Manual,
    Mobile,
}

/// `data` object of an attendance write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendancePayload {
    pub member_id: Option<String>,
    #[serde(default)]
    pub dependant_id: Option<String>,
    /// Calendar date of the service, no time component
    pub service_date: NaiveDate,
    pub service_type: ServiceType,
    pub check_in_time: DateTime<Utc>,
    pub method: CheckInMethod,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub client_uuid: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl AttendancePayload {
    /// Parse and validate a `data` object received from the wire
    pub fn from_value(value: &serde_json::Value) -> Result<Self, SharedError> {
        let payload: AttendancePayload = serde_json::from_value(value.clone())?;
        payload.validate()?;
        Ok(payload)
    }

    pub fn validate(&self) -> Result<(), SharedError> {
        let member = non_blank(self.member_id.as_deref());
        let dependant = non_blank(self.dependant_id.as_deref());
        if member.is_none() && dependant.is_none() {
            return Err(SharedError::validation(
                "member_id",
                "member_id or dependant_id is required",
            ));
        }
        if member.is_some() && dependant.is_some() {
            return Err(SharedError::validation(
                "dependant_id",
                "member_id and dependant_id are mutually exclusive",
            ));
        }
        if matches!(self.client_uuid.as_deref(), Some(token) if token.trim().is_empty()) {
            return Err(SharedError::validation("client_uuid", "client_uuid must not be blank"));
        }
        Ok(())
    }

    pub fn to_value(&self) -> Result<serde_json::Value, SharedError> {
        Ok(serde_json::to_value(self)?)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// A check-in action captured at the kiosk, before it is queued
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckIn {
    #[serde(default)]
    pub member_id: Option<String>,
    #[serde(default)]
    pub dependant_id: Option<String>,
    pub service_date: NaiveDate,
    pub service_type: ServiceType,
    pub method: CheckInMethod,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl CheckIn {
    /// Check-in for a member
    pub fn member(
        member_id: impl Into<String>,
        service_date: NaiveDate,
        service_type: ServiceType,
        method: CheckInMethod,
    ) -> Self {
        Self {
            member_id: Some(member_id.into()),
            dependant_id: None,
            service_date,
            service_type,
            method,
            metadata: serde_json::Map::new(),
        }
    }

    /// Check-in for a dependant (child) without a member record
    pub fn dependant(
        dependant_id: impl Into<String>,
        service_date: NaiveDate,
        service_type: ServiceType,
        method: CheckInMethod,
    ) -> Self {
        Self {
            member_id: None,
            dependant_id: Some(dependant_id.into()),
            service_date,
            service_type,
            method,
            metadata: serde_json::Map::new(),
        }
    }

    /// Stamp the idempotency token, actor and capture time
    pub fn into_payload(
        self,
        client_uuid: impl Into<String>,
        created_by: Option<String>,
        check_in_time: DateTime<Utc>,
    ) -> AttendancePayload {
        AttendancePayload {
            member_id: self.member_id,
            dependant_id: self.dependant_id,
            service_date: self.service_date,
            service_type: self.service_type,
            check_in_time,
            method: self.method,
            metadata: self.metadata,
            client_uuid: Some(client_uuid.into()),
            created_by,
        }
    }
}
