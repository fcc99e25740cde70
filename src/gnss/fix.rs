//! RMC sentence location and field extraction.

use core::str::FromStr;

use chrono::NaiveTime;
use heapless::String;

use super::error::GnssError;

/// On-wire width of a coordinate field.
const COORD_LEN: usize = 12;

const KNOTS_TO_KMH: f32 = 1.852;

/// One decoded position report.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fix {
    /// Decimal UTC time of day, `hhmmss.ss`.
    pub time: f32,
    /// Fix status character: `'A'` valid, `'V'` receiver warning.
    pub validity: char,
    /// Latitude exactly as received, e.g. `4807.038`. The uplink URL embeds
    /// this text verbatim, so it is never normalized to a number.
    pub latitude: String<COORD_LEN>,
    /// Longitude exactly as received.
    pub longitude: String<COORD_LEN>,
    /// Speed over ground in km/h, converted from knots at parse.
    pub speed_kmh: f32,
    /// Course over ground in degrees.
    pub course: f32,
}

impl Fix {
    /// Interprets the decimal time-of-day as a wall-clock time.
    pub fn utc_time(&self) -> Option<NaiveTime> {
        let t = self.time as u32;
        NaiveTime::from_hms_opt(t / 10_000, t / 100 % 100, t % 100)
    }
}

/// Locates the RMC sentence in `raw` and extracts the fix fields.
///
/// The receiver streams newline-terminated sentences; everything before the
/// RMC tag and after its terminating newline is ignored. A buffer with no
/// RMC sentence at all is an explicit [`GnssError::NoFixSentence`], never a
/// partial fix.
pub fn parse_fix(raw: &[u8]) -> Result<Fix, GnssError> {
    let sentence = find_rmc(raw).ok_or(GnssError::NoFixSentence)?;

    let mut time = None;
    let mut validity = None;
    let mut latitude = None;
    let mut longitude = None;
    let mut speed_knots = None;
    let mut course = None;

    for (index, field) in sentence.split(|&b| b == b',').enumerate() {
        match index {
            1 => time = Some(parse_field::<f32>(field, "time")?),
            2 => validity = field.first().map(|&b| b as char),
            3 => latitude = Some(text_field(field, "latitude")?),
            5 => longitude = Some(text_field(field, "longitude")?),
            7 => speed_knots = Some(parse_field::<f32>(field, "speed")?),
            8 => course = Some(parse_field::<f32>(field, "course")?),
            _ => {}
        }
    }

    Ok(Fix {
        time: time.ok_or(GnssError::MissingField("time"))?,
        validity: validity.ok_or(GnssError::MissingField("validity"))?,
        latitude: latitude.ok_or(GnssError::MissingField("latitude"))?,
        longitude: longitude.ok_or(GnssError::MissingField("longitude"))?,
        speed_kmh: speed_knots.ok_or(GnssError::MissingField("speed"))? * KNOTS_TO_KMH,
        course: course.ok_or(GnssError::MissingField("course"))?,
    })
}

/// Finds the first RMC-tagged sentence and returns it up to (excluding) its
/// terminating newline.
fn find_rmc(raw: &[u8]) -> Option<&[u8]> {
    for tag in [b"GPRMC", b"GNRMC"] {
        if let Some(start) = find(raw, tag) {
            let rest = &raw[start..];
            let end = rest
                .iter()
                .position(|&b| b == b'\n')
                .unwrap_or(rest.len());
            return Some(&rest[..end]);
        }
    }
    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_field<T: FromStr>(data: &[u8], name: &'static str) -> Result<T, GnssError> {
    core::str::from_utf8(data)
        .map_err(|_| GnssError::BadNumber(name))?
        .trim()
        .parse::<T>()
        .map_err(|_| GnssError::BadNumber(name))
}

fn text_field(data: &[u8], name: &'static str) -> Result<String<COORD_LEN>, GnssError> {
    let text = core::str::from_utf8(data).map_err(|_| GnssError::MissingField(name))?;
    if text.is_empty() {
        return Err(GnssError::MissingField(name));
    }
    let mut out = String::new();
    out.push_str(text)
        .map_err(|_| GnssError::FieldTooLong(name))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENTENCE: &[u8] =
        b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n\
          $GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n\
          $GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,2.1*39\r\n";

    #[test]
    fn decodes_the_rmc_fields() {
        let fix = parse_fix(SENTENCE).unwrap();
        assert_eq!(fix.time, 123519.0);
        assert_eq!(fix.validity, 'A');
        assert_eq!(fix.latitude.as_str(), "4807.038");
        assert_eq!(fix.longitude.as_str(), "01131.000");
        assert!((fix.speed_kmh - 22.4 * 1.852).abs() < 1e-3);
        assert!((fix.course - 84.4).abs() < 1e-3);
    }

    #[test]
    fn converts_knots_to_kmh() {
        let fix = parse_fix(SENTENCE).unwrap();
        assert!((fix.speed_kmh - 41.4848).abs() < 1e-3);
    }

    #[test]
    fn interprets_the_decimal_time() {
        let fix = parse_fix(SENTENCE).unwrap();
        let time = fix.utc_time().unwrap();
        assert_eq!(time, NaiveTime::from_hms_opt(12, 35, 19).unwrap());
    }

    #[test]
    fn warning_state_still_decodes() {
        let sentence = b"$GNRMC,091201,V,5554.120,N,03733.480,E,005.0,010.0,060826,,*00\r\n";
        let fix = parse_fix(sentence).unwrap();
        assert_eq!(fix.validity, 'V');
    }

    #[test]
    fn no_rmc_sentence_is_an_explicit_error() {
        let sentence = b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";
        assert_eq!(parse_fix(sentence), Err(GnssError::NoFixSentence));
        assert_eq!(parse_fix(b""), Err(GnssError::NoFixSentence));
    }

    #[test]
    fn missing_validity_is_an_explicit_error() {
        let sentence = b"$GPRMC,123519,,4807.038,N,01131.000,E,022.4,084.4,230394,,*6A\r\n";
        assert_eq!(parse_fix(sentence), Err(GnssError::MissingField("validity")));
    }

    #[test]
    fn garbage_numeric_field_is_an_explicit_error() {
        let sentence = b"$GPRMC,123519,A,4807.038,N,01131.000,E,abc,084.4,230394,,*6A\r\n";
        assert_eq!(parse_fix(sentence), Err(GnssError::BadNumber("speed")));
    }

    #[test]
    fn ignores_bytes_around_the_sentence() {
        let mut noisy = heapless::Vec::<u8, 256>::new();
        noisy.extend_from_slice(b"\x00\x00garbage\r\n").unwrap();
        noisy.extend_from_slice(SENTENCE).unwrap();
        let fix = parse_fix(&noisy).unwrap();
        assert_eq!(fix.validity, 'A');
    }
}
