//! `Time ::= CHOICE { utcTime UTCTime, generalTime GeneralizedTime }`

use std::time::SystemTime;

use der::{
    asn1::{GeneralizedTime, UtcTime},
    DateTime,
};
use x509_cert::time::Time;

use crate::errors::Result;

/// `time` as UTCTime for the years through 2049 and as GeneralizedTime
/// afterwards (RFC 5652 § 11.3).
pub fn time_of(time: SystemTime) -> Result<Time> {
    let datetime = DateTime::from_system_time(time)?;
    Ok(if datetime.year() <= 2049 {
        Time::UtcTime(UtcTime::from_date_time(datetime)?)
    } else {
        Time::GeneralTime(GeneralizedTime::from_date_time(datetime))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use der::{Decode, Encode};
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn year_range_selects_choice() {
        // 2020-01-01T00:00:00Z
        let recent = UNIX_EPOCH + Duration::from_secs(1_577_836_800);
        let time = time_of(recent).unwrap();
        assert!(matches!(time, Time::UtcTime(_)));
        let decoded = Time::from_der(&time.to_der().unwrap()).unwrap();
        assert_eq!(decoded.to_system_time(), recent);

        // 2050-01-01T00:00:00Z
        let later = UNIX_EPOCH + Duration::from_secs(2_524_608_000);
        let time = time_of(later).unwrap();
        assert!(matches!(time, Time::GeneralTime(_)));
        assert_eq!(time.to_system_time(), later);
    }
}
