//! Hardware serial numbers of branded boxes
//!
//! A box serial is `TT`, an eight digit manufacturing date and ten
//! alphanumerics, for example `TT20240115AB12CD34EF`. Boxes must be
//! whitelisted before their reports are accepted.

const BOX_PREFIX: &str = "TT";
const DATE_LEN: usize = 8;
const SUFFIX_LEN: usize = 10;

/// Whether `serial` has the shape of a box serial number
pub fn is_box_serial(serial: &str) -> bool {
    let Some(rest) = serial.strip_prefix(BOX_PREFIX) else {
        return false;
    };
    if rest.len() != DATE_LEN + SUFFIX_LEN || !rest.is_ascii() {
        return false;
    }
    let (date, suffix) = rest.split_at(DATE_LEN);
    date.bytes().all(|b| b.is_ascii_digit()) && suffix.bytes().all(|b| b.is_ascii_alphanumeric())
}
