//! Responses for the core control commands
use atat::atat_derive::AtatResp;
use heapless::String;

/// Module functionality +CFUN
///
/// `fun` is kept numeric, modules report values outside the settable set.
#[derive(Debug, Clone, AtatResp)]
pub struct ModuleFunctionality {
    #[at_arg(position = 0)]
    pub fun: u8,
}

/// Clock +CCLK
#[derive(Debug, Clone, AtatResp)]
pub struct Clock {
    /// `yy/MM/dd,hh:mm:ss±zz`, where `zz` is the offset in quarters of an hour
    #[at_arg(position = 0)]
    pub time: String<32>,
}

impl Clock {
    /// Seconds since the unix epoch, in UTC.
    ///
    /// Years before 2000 are reported by the module while it has no network
    /// time yet and yield `None`.
    pub fn unix_timestamp(&self) -> Option<i64> {
        parse_cclk(self.time.trim_matches('"'))
    }
}

fn field(s: &str, range: core::ops::Range<usize>) -> Option<u32> {
    s.get(range)?.parse().ok()
}

fn parse_cclk(s: &str) -> Option<i64> {
    let yy = field(s, 0..2)?;
    let month = field(s, 3..5)?;
    let day = field(s, 6..8)?;
    let hour = field(s, 9..11)?;
    let minute = field(s, 12..14)?;
    let second = field(s, 15..17)?;
    let quarters: i64 = match s.get(17..18)? {
        "+" => s.get(18..)?.parse().ok()?,
        "-" => -s.get(18..)?.parse::<i64>().ok()?,
        _ => return None,
    };

    if yy >= 70 || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    let days = days_from_civil(2000 + yy as i64, month, day);
    let local = days * 86_400 + hour as i64 * 3600 + minute as i64 * 60 + second as i64;
    Some(local - quarters * 15 * 60)
}

// Days since 1970-01-01 in the proleptic Gregorian calendar.
fn days_from_civil(y: i64, m: u32, d: u32) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (m as i64 + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(s: &str) -> Clock {
        Clock {
            time: String::try_from(s).unwrap(),
        }
    }

    #[test]
    fn utc_clock() {
        assert_eq!(
            clock("24/01/01,00:00:00+00").unix_timestamp(),
            Some(1_704_067_200)
        );
        assert_eq!(
            clock("\"24/03/01,12:30:15+00\"").unix_timestamp(),
            Some(1_709_296_215)
        );
    }

    #[test]
    fn timezone_offset() {
        // One hour ahead of UTC
        assert_eq!(
            clock("24/01/01,01:00:00+04").unix_timestamp(),
            Some(1_704_067_200)
        );
        assert_eq!(
            clock("23/12/31,23:00:00-04").unix_timestamp(),
            Some(1_704_067_200)
        );
    }

    #[test]
    fn clock_not_synced() {
        assert_eq!(clock("80/01/06,00:00:25+00").unix_timestamp(), None);
        assert_eq!(clock("garbage").unix_timestamp(), None);
    }
}
