//! Logistics vessel query
//!
//! Reads the `ships` table and renders the plain-text report printed by the
//! `vessel-query` binary.

use std::fmt::Write as _;

#[cfg(feature = "postgres")]
use crate::database::DatabaseError;

pub const REPORT_HEADER: &str = "Logistics query complete:\n";

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Vessel {
    pub id: i32,
    pub name: String,
    pub longitude: f64,
    pub latitude: f64,
    pub status: String,
}

/// Every row of `ships`, in the order the database returns them.
#[cfg(feature = "postgres")]
pub async fn fetch_vessels(pool: &sqlx::PgPool) -> Result<Vec<Vessel>, DatabaseError> {
    sqlx::query_as::<_, Vessel>("SELECT id, name, longitude, latitude, status FROM ships")
        .fetch_all(pool)
        .await
        .map_err(|e| DatabaseError::Query(e.to_string()))
}

pub fn format_report(vessels: &[Vessel]) -> String {
    let mut report = String::from(REPORT_HEADER);
    for v in vessels {
        // Writing to a String cannot fail
        let _ = writeln!(
            report,
            "ID: {}, Name: {}, Longitude: {:.6}, Latitude: {:.6}, Status: {}",
            v.id, v.name, v.longitude, v.latitude, v.status
        );
    }
    report
}
