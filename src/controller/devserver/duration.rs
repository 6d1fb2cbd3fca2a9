//! Parser for the `timeToLive` grammar (spec.md §4.2 step 3, §9):
//! `(<integer><unit>)+`, units in `{d, h, m, s}`, summed, no floats, signs,
//! or whitespace.
use chrono::Duration;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid duration {0:?}: expected one or more `<integer><unit>` tokens with unit in d/h/m/s")]
pub struct InvalidDuration(pub String);

pub fn parse(input: &str) -> Result<Duration, InvalidDuration> {
    if input.is_empty() {
        return Err(InvalidDuration(input.to_owned()));
    }

    let mut total = Duration::zero();
    let mut rest = input;
    let mut consumed_any = false;

    while !rest.is_empty() {
        let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits_len == 0 {
            return Err(InvalidDuration(input.to_owned()));
        }
        let (digits, after_digits) = rest.split_at(digits_len);
        let value: i64 = digits.parse().map_err(|_| InvalidDuration(input.to_owned()))?;

        let mut chars = after_digits.chars();
        let unit = chars.next().ok_or_else(|| InvalidDuration(input.to_owned()))?;
        let seconds_per_unit = match unit {
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            _ => return Err(InvalidDuration(input.to_owned())),
        };
        total = total
            .checked_add(&Duration::seconds(value * seconds_per_unit))
            .ok_or_else(|| InvalidDuration(input.to_owned()))?;
        consumed_any = true;
        rest = chars.as_str();
    }

    if consumed_any {
        Ok(total)
    } else {
        Err(InvalidDuration(input.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_unit() {
        assert_eq!(parse("30m").unwrap(), Duration::minutes(30));
        assert_eq!(parse("1d").unwrap(), Duration::days(1));
        assert_eq!(parse("0s").unwrap(), Duration::zero());
    }

    #[test]
    fn sums_repeated_units() {
        assert_eq!(parse("2h30m").unwrap(), Duration::hours(2) + Duration::minutes(30));
        assert_eq!(parse("1d12h").unwrap(), Duration::days(1) + Duration::hours(12));
    }

    #[test]
    fn rejects_floats_signs_and_whitespace() {
        assert!(parse("1.5h").is_err());
        assert!(parse("-30m").is_err());
        assert!(parse("30 m").is_err());
        assert!(parse("").is_err());
        assert!(parse("m30").is_err());
        assert!(parse("30").is_err());
        assert!(parse("30x").is_err());
    }
}
