// ✂️ Line tokenizer
// POS exports quote thousands-separated numbers ("1,234"), so a plain
// split(',') would tear numeric cells apart.

use csv::{ReaderBuilder, StringRecord, Trim};

/// Split one report line into trimmed fields, honoring quoted commas.
///
/// Fails soft: an unterminated quote (or any reader error) yields an empty
/// vector so the caller skips the line as noise.
pub fn split_line(line: &str) -> Vec<String> {
    if has_unterminated_quote(line) {
        return Vec::new();
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(line.as_bytes());

    let mut record = StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => record.iter().map(|field| field.to_string()).collect(),
        _ => Vec::new(),
    }
}

/// A quote is only special at the start of a field (`Cake 8" round` is
/// plain text). Inside a quoted field `""` is an escaped quote and any
/// other quote closes it.
fn has_unterminated_quote(line: &str) -> bool {
    let mut chars = line.chars().peekable();
    let mut field_start = true;
    let mut quoted = false;

    while let Some(c) = chars.next() {
        if quoted {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                } else {
                    quoted = false;
                }
            }
            continue;
        }
        match c {
            '"' if field_start => {
                quoted = true;
                field_start = false;
            }
            ',' => field_start = true,
            _ => field_start = false,
        }
    }

    quoted
}

/// Parse a report cell into a number.
///
/// Thousands separators are stripped; blanks and junk coerce to `0.0`.
pub fn parse_number(value: &str) -> f64 {
    let cleaned: String = value.trim().chars().filter(|c| *c != ',').collect();
    match cleaned.parse::<f64>() {
        Ok(n) if n.is_finite() => n,
        _ => 0.0,
    }
}

/// `true` when every field after the first is blank.
pub fn rest_is_blank(parts: &[String]) -> bool {
    parts.iter().skip(1).all(|p| p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_line() {
        assert_eq!(split_line("a,b,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_split_quoted_comma_is_one_field() {
        let parts = split_line("Espresso,\"1,234\",,\"56,789.50\"");
        assert_eq!(parts, vec!["Espresso", "1,234", "", "56,789.50"]);
    }

    #[test]
    fn test_split_trims_fields() {
        assert_eq!(split_line("  TABLE  , 12 ,"), vec!["TABLE", "12", ""]);
    }

    #[test]
    fn test_split_escaped_quote() {
        let parts = split_line("\"Say \"\"hi\"\"\",2");
        assert_eq!(parts, vec!["Say \"hi\"", "2"]);
    }

    #[test]
    fn test_split_unterminated_quote_is_empty() {
        assert!(split_line("Latte,\"1,234,5").is_empty());
    }

    #[test]
    fn test_split_inch_mark_inside_field() {
        let parts = split_line("Cake 8\" round,2,30,,10,33,20,,67");
        assert_eq!(
            parts,
            vec!["Cake 8\" round", "2", "30", "", "10", "33", "20", "", "67"]
        );
    }

    #[test]
    fn test_split_quote_after_comma_opens_field() {
        assert!(split_line("Cake 8\" round,\"1,234").is_empty());
        assert_eq!(
            split_line("Cake 8\" round,\"1,234\""),
            vec!["Cake 8\" round", "1,234"]
        );
    }

    #[test]
    fn test_split_empty_line() {
        assert!(split_line("").is_empty());
    }

    #[test]
    fn test_parse_number_thousands() {
        assert_eq!(parse_number("1,234.5"), 1234.5);
        assert_eq!(parse_number(" -12 "), -12.0);
    }

    #[test]
    fn test_parse_number_junk_is_zero() {
        assert_eq!(parse_number(""), 0.0);
        assert_eq!(parse_number("n/a"), 0.0);
        assert_eq!(parse_number("NaN"), 0.0);
        assert_eq!(parse_number("inf"), 0.0);
    }

    #[test]
    fn test_rest_is_blank() {
        let marker = split_line("FOOD,,,,");
        assert!(rest_is_blank(&marker));
        let data = split_line("Latte,2,,");
        assert!(!rest_is_blank(&data));
    }
}
