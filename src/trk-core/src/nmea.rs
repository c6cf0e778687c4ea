// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Byte-fed NMEA 0183 decoder for RMC and GGA sentences.
//!
//! Feed every byte from the receiver into [`NmeaDecoder::push_byte`]; it
//! returns a complete [`Fix`] whenever a sentence carrying a valid location
//! has just been finished. Date and time are sticky: the last value seen in
//! any accepted sentence is reported with each new location.

use tracing::trace;

use crate::fix::Fix;

/// Longest sentence kept, including `$` and checksum. NMEA caps at 82.
const MAX_SENTENCE_LEN: usize = 96;

#[derive(Debug, Default)]
pub struct NmeaDecoder {
    buf: Vec<u8>,
    in_sentence: bool,
    overlong: bool,
    date: u32,
    time: u32,
}

impl NmeaDecoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(MAX_SENTENCE_LEN),
            ..Default::default()
        }
    }

    /// Consume one byte. Returns the new fix when this byte completed a
    /// sentence that updated the location.
    pub fn push_byte(&mut self, byte: u8) -> Option<Fix> {
        match byte {
            b'$' => {
                self.buf.clear();
                self.buf.push(byte);
                self.in_sentence = true;
                self.overlong = false;
                None
            }
            b'\r' | b'\n' => {
                if !self.in_sentence {
                    return None;
                }
                self.in_sentence = false;
                if self.overlong {
                    trace!("Dropping overlong NMEA sentence");
                    return None;
                }
                // NMEA is ASCII; anything else is line noise.
                let Ok(line) = std::str::from_utf8(&self.buf) else {
                    trace!("Dropping NMEA sentence with non-UTF-8 bytes");
                    return None;
                };
                if !line.is_ascii() {
                    trace!("Dropping non-ASCII NMEA sentence");
                    return None;
                }
                let line = line.to_owned();
                self.parse_sentence(&line)
            }
            _ => {
                if self.in_sentence && !self.overlong {
                    if self.buf.len() < MAX_SENTENCE_LEN {
                        self.buf.push(byte);
                    } else {
                        self.overlong = true;
                    }
                }
                None
            }
        }
    }

    /// Consume a slice, returning the last fix it completed.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Option<Fix> {
        bytes.iter().fold(None, |last, b| self.push_byte(*b).or(last))
    }

    fn parse_sentence(&mut self, line: &str) -> Option<Fix> {
        if line.contains('*') && !checksum_ok(line) {
            trace!("NMEA checksum mismatch: {}", line);
            return None;
        }
        let body = line.trim_start_matches('$');
        let body = body.split('*').next().unwrap_or(body);
        let fields: Vec<&str> = body.split(',').collect();
        match fields.first().copied() {
            Some("GPRMC") | Some("GNRMC") => self.parse_rmc(&fields),
            Some("GPGGA") | Some("GNGGA") => self.parse_gga(&fields),
            _ => None,
        }
    }

    /// $GPRMC,HHMMSS.ss,A,LLLL.ll,a,YYYYY.yy,a,speed,course,DDMMYY,...
    fn parse_rmc(&mut self, f: &[&str]) -> Option<Fix> {
        if f.len() < 10 {
            return None;
        }
        if let Some(time) = parse_time(f[1]) {
            self.time = time;
        }
        if let Ok(date) = f[9].parse::<u32>() {
            self.date = date;
        }
        if f[2] != "A" {
            return None;
        }
        self.location_fix(f[3], f[4], f[5], f[6])
    }

    /// $GPGGA,HHMMSS.ss,LLLL.ll,a,YYYYY.yy,a,q,...
    fn parse_gga(&mut self, f: &[&str]) -> Option<Fix> {
        if f.len() < 7 {
            return None;
        }
        if let Some(time) = parse_time(f[1]) {
            self.time = time;
        }
        if f[6].is_empty() || f[6] == "0" {
            return None;
        }
        self.location_fix(f[2], f[3], f[4], f[5])
    }

    fn location_fix(&self, lat: &str, ns: &str, lon: &str, ew: &str) -> Option<Fix> {
        Some(Fix {
            latitude: to_degrees(lat, ns)?,
            longitude: to_degrees(lon, ew)?,
            date: self.date,
            time: self.time,
            valid: true,
        })
    }
}

/// Convert `DDDMM.mmmm` plus hemisphere into signed decimal degrees.
fn to_degrees(coord: &str, hemi: &str) -> Option<f64> {
    let dot = coord.find('.').unwrap_or(coord.len());
    if dot < 2 {
        return None;
    }
    let degrees: f64 = coord.get(..dot - 2)?.parse().ok()?;
    let minutes: f64 = coord.get(dot - 2..)?.parse().ok()?;
    let value = degrees + minutes / 60.0;
    match hemi {
        "N" | "E" => Some(value),
        "S" | "W" => Some(-value),
        _ => None,
    }
}

/// `HHMMSS[.ss]` to HHMMSSCC.
fn parse_time(field: &str) -> Option<u32> {
    let (whole, frac) = field.split_once('.').unwrap_or((field, ""));
    if whole.len() != 6 || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hhmmss: u32 = whole.parse().ok()?;
    let cc = match frac.len() {
        0 => 0,
        1 => frac.parse::<u32>().ok()? * 10,
        _ => frac.get(..2)?.parse::<u32>().ok()?,
    };
    Some(hhmmss * 100 + cc)
}

fn checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

fn checksum_ok(sentence: &str) -> bool {
    let inner = sentence.trim_start_matches('$');
    let Some((body, expected_hex)) = inner.split_once('*') else {
        return false;
    };
    match u8::from_str_radix(expected_hex.trim(), 16) {
        Ok(expected) => checksum(body) == expected,
        Err(_) => false,
    }
}

/// Wrap a sentence body (without `$`) with its checksum and CRLF.
pub fn frame_sentence(body: &str) -> String {
    format!("${}*{:02X}\r\n", body, checksum(body))
}

/// Encode a fix as a `GPRMC` sentence ready to put on the wire.
pub fn encode_rmc(fix: &Fix) -> String {
    let (lat, ns) = encode_coord(fix.latitude, 2, 'N', 'S');
    let (lon, ew) = encode_coord(fix.longitude, 3, 'E', 'W');
    let t = fix.time;
    let body = format!(
        "GPRMC,{:02}{:02}{:02}.{:02},{},{},{},{},{},0.0,0.0,{:06},,",
        t / 1_000_000,
        (t / 10_000) % 100,
        (t / 100) % 100,
        t % 100,
        if fix.valid { 'A' } else { 'V' },
        lat,
        ns,
        lon,
        ew,
        fix.date
    );
    frame_sentence(&body)
}

fn encode_coord(value: f64, deg_width: usize, pos: char, neg: char) -> (String, char) {
    let hemi = if value < 0.0 { neg } else { pos };
    // Work in 1e-4 minute units so rounding never yields 60 minutes.
    let total = (value.abs() * 600_000.0).round() as u64;
    let degrees = total / 600_000;
    let minutes = (total % 600_000) as f64 / 10_000.0;
    (
        format!("{:0width$}{:07.4}", degrees, minutes, width = deg_width),
        hemi,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(decoder: &mut NmeaDecoder, line: &str) -> Option<Fix> {
        decoder.push_bytes(line.as_bytes())
    }

    #[test]
    fn test_parse_rmc() {
        let mut decoder = NmeaDecoder::new();
        let fix = feed(
            &mut decoder,
            "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n",
        )
        .unwrap();
        assert!((fix.latitude - 48.1173).abs() < 1e-9);
        assert!((fix.longitude - 11.516_666_666).abs() < 1e-6);
        assert_eq!(fix.date, 230394);
        assert_eq!(fix.time, 12351900);
        assert!(fix.valid);
    }

    #[test]
    fn test_parse_gga_keeps_last_date() {
        let mut decoder = NmeaDecoder::new();
        feed(
            &mut decoder,
            "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n",
        );
        let fix = feed(
            &mut decoder,
            "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n",
        )
        .unwrap();
        assert_eq!(fix.date, 230394);
        assert!((fix.latitude - 48.1173).abs() < 1e-9);
    }

    #[test]
    fn test_void_rmc_still_updates_time() {
        let mut decoder = NmeaDecoder::new();
        let line = frame_sentence("GPRMC,081500.25,V,,,,,,,160126,,");
        assert!(feed(&mut decoder, &line).is_none());
        let fix = feed(
            &mut decoder,
            &frame_sentence("GPGGA,,5213.7820,N,02100.7320,E,1,05,1.2,100.0,M,0.0,M,,"),
        )
        .unwrap();
        assert_eq!(fix.time, 8150025);
        assert_eq!(fix.date, 160126);
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let mut decoder = NmeaDecoder::new();
        let line = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6B\r\n";
        assert!(feed(&mut decoder, line).is_none());
    }

    #[test]
    fn test_southern_western_hemispheres() {
        let mut decoder = NmeaDecoder::new();
        let line = frame_sentence("GPRMC,000000,A,3352.1280,S,07037.5000,W,0.0,0.0,010126,,");
        let fix = feed(&mut decoder, &line).unwrap();
        assert!((fix.latitude + 33.868_8).abs() < 1e-6);
        assert!((fix.longitude + 70.625).abs() < 1e-6);
    }

    #[test]
    fn test_overlong_sentence_dropped() {
        let mut decoder = NmeaDecoder::new();
        let junk = format!("$GPRMC,{}\r\n", "9".repeat(200));
        assert!(feed(&mut decoder, &junk).is_none());
        // Decoder recovers on the next sentence.
        let fix = feed(
            &mut decoder,
            "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n",
        );
        assert!(fix.is_some());
    }

    #[test]
    fn test_non_ascii_noise_is_dropped() {
        let mut decoder = NmeaDecoder::new();
        let noisy: [&[u8]; 4] = [
            b"$GPRMC,123519,A,\xff.5,N,01131.000,E,022.4,084.4,230394,003.1,W\r\n",
            b"$GPRMC,123519.\xff,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W\r\n",
            b"$GPRMC,123519,A,4807.038,N,\xc3\xa9131.000,E,022.4,084.4,230394,,W\r\n",
            b"$GPGGA,123519.\xe2\x82\xac,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,\r\n",
        ];
        for line in noisy {
            assert!(decoder.push_bytes(line).is_none());
        }
        // Sticky time was not touched by the noisy lines.
        let fix = feed(
            &mut decoder,
            "$GPGGA,,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,\r\n",
        )
        .unwrap();
        assert_eq!(fix.time, 0);
    }

    #[test]
    fn test_short_fields_do_not_panic() {
        assert_eq!(to_degrees("5.", "N"), None);
        assert_eq!(to_degrees("", "N"), None);
        assert_eq!(parse_time("12345a"), None);
        assert_eq!(parse_time("123519.5"), Some(12351950));
    }

    #[test]
    fn test_sentence_split_across_pushes() {
        let mut decoder = NmeaDecoder::new();
        assert!(feed(&mut decoder, "$GPRMC,123519,A,4807.038,N,011").is_none());
        assert!(feed(&mut decoder, "31.000,E,022.4,084.4,230394,003.1,W*6A\r\n").is_some());
    }

    #[test]
    fn test_encode_rmc_decodes_back() {
        let original = Fix {
            latitude: 52.2297,
            longitude: -21.0122,
            date: 160126,
            time: 12345600,
            valid: true,
        };
        let line = encode_rmc(&original);
        assert!(line.starts_with("$GPRMC,123456.00,A,5213.7820,N,02100.7320,W,"));
        let fix = feed(&mut NmeaDecoder::new(), &line).unwrap();
        assert!((fix.latitude - original.latitude).abs() < 1e-6);
        assert!((fix.longitude - original.longitude).abs() < 1e-6);
        assert_eq!(fix.date, original.date);
        assert_eq!(fix.time, original.time);
    }
}
