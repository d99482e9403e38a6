//! Typed errors for the computation core.

use thiserror::Error;

use crate::records::RecordType;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackError {
    #[error("track has no segments or no points")]
    EmptyTrack,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordsError {
    #[error("more than one {0} record stored for user {1}, sport {2}")]
    DuplicateRecord(RecordType, i64, i64),
    #[error("record {record_id} belongs to user {user_id}, sport {sport_id}")]
    ForeignRecord {
        record_id: i64,
        user_id: i64,
        sport_id: i64,
    },
}

#[derive(Error, Debug)]
pub enum GpxError {
    #[error("GPX XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("GPX file has no track")]
    NoTrack,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
