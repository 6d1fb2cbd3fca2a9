//! `k8s_openapi`'s `Time` wraps a `jiff::Timestamp`, not a `chrono::DateTime`
//! (see `k8s_openapi::apimachinery::pkg::apis::meta::v1::Time`). Every CRD
//! status field in this crate uses `chrono::DateTime<Utc>` directly via
//! serde, so the only place this conversion is needed is reading native
//! fields such as `metadata.creationTimestamp`.
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

pub fn k8s_time_to_utc(t: &Time) -> DateTime<Utc> {
    let ts = t.0;
    DateTime::from_timestamp(ts.as_second(), ts.subsec_nanosecond() as u32)
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::jiff::Timestamp;

    #[test]
    fn round_trips_through_second_precision() {
        let now = Utc::now();
        let ts = Timestamp::from_second(now.timestamp()).unwrap();
        let converted = k8s_time_to_utc(&Time(ts));
        assert_eq!(converted.timestamp(), now.timestamp());
    }
}
