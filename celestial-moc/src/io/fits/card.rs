//! 80-byte header cards and 2880-byte blocks.

use crate::error::{MocError, Result};

pub const CARD_SIZE: usize = 80;
pub const BLOCK_SIZE: usize = 2880;

/// Longest string value that fits a card once quoted: 80 − `KEYWORD = ''`.
pub const MAX_VALUE_LEN: usize = 68;

#[derive(Debug, Clone, PartialEq)]
pub enum CardValue {
    Logical(bool),
    Integer(i64),
    Str(String),
    /// Any other value (reals, complex), kept as written.
    Other(String),
}

impl CardValue {
    /// Value as it would read in a properties table.
    pub fn to_text(&self) -> String {
        match self {
            CardValue::Logical(true) => "T".to_string(),
            CardValue::Logical(false) => "F".to_string(),
            CardValue::Integer(i) => i.to_string(),
            CardValue::Str(s) | CardValue::Other(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub keyword: String,
    pub value: Option<CardValue>,
}

impl Card {
    /// Parse one 80-byte card. Only printable ASCII is accepted.
    pub fn parse(raw: &[u8]) -> Result<Card> {
        if raw.len() != CARD_SIZE {
            return Err(MocError::format(format!(
                "header card is {} bytes, expected {CARD_SIZE}",
                raw.len()
            )));
        }
        if let Some(pos) = raw.iter().position(|b| !(0x20..=0x7e).contains(b)) {
            return Err(MocError::format(format!(
                "non-printable byte 0x{:02x} in header card at column {}",
                raw[pos],
                pos + 1
            )));
        }
        // Printable ASCII is valid UTF-8.
        let text = std::str::from_utf8(raw).map_err(|_| MocError::format("header card is not ASCII"))?;
        let keyword = text[..8].trim_end().to_string();
        let value = if &text[8..10] == "= " {
            Some(parse_value(&text[10..])?)
        } else {
            None
        };
        Ok(Card { keyword, value })
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Some(CardValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match &self.value {
            Some(CardValue::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &self.value {
            Some(CardValue::Logical(b)) => Some(*b),
            _ => None,
        }
    }
}

fn parse_value(field: &str) -> Result<CardValue> {
    let field = field.trim_start();
    if let Some(quoted) = field.strip_prefix('\'') {
        let mut out = String::new();
        let mut chars = quoted.chars().peekable();
        loop {
            match chars.next() {
                Some('\'') if chars.peek() == Some(&'\'') => {
                    chars.next();
                    out.push('\'');
                }
                Some('\'') => return Ok(CardValue::Str(out.trim_end().to_string())),
                Some(c) => out.push(c),
                None => return Err(MocError::format("unterminated string value in header card")),
            }
        }
    }
    let text = field.split('/').next().unwrap_or("").trim();
    Ok(match text {
        "T" => CardValue::Logical(true),
        "F" => CardValue::Logical(false),
        _ => match text.parse::<i64>() {
            Ok(i) => CardValue::Integer(i),
            Err(_) => CardValue::Other(text.to_string()),
        },
    })
}

/// Quote doubling for string values.
pub fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

/// Keywords are 1 to 8 characters of `A-Z 0-9 _ -`.
pub fn check_keyword(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > 8 {
        return Err(MocError::invalid_property(key, "keywords are 1 to 8 characters"));
    }
    if !key
        .bytes()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
    {
        return Err(MocError::invalid_property(
            key,
            "keywords use only A-Z, 0-9, '_' and '-'",
        ));
    }
    Ok(())
}

/// A string value must survive a write/read cycle unchanged.
pub fn check_value(key: &str, value: &str) -> Result<()> {
    if !value.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
        return Err(MocError::invalid_property(key, "values must be printable ASCII"));
    }
    if value.ends_with(' ') {
        return Err(MocError::invalid_property(
            key,
            "trailing spaces are not preserved in header values",
        ));
    }
    if escape(value).len() > MAX_VALUE_LEN {
        return Err(MocError::invalid_property(
            key,
            "value does not fit in one header card",
        ));
    }
    Ok(())
}

/// Accumulates cards, then pads the header to whole blocks.
#[derive(Debug, Default)]
pub struct HeaderWriter {
    bytes: Vec<u8>,
}

impl HeaderWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, card: String) {
        let mut raw = card.into_bytes();
        raw.resize(CARD_SIZE, b' ');
        self.bytes.extend_from_slice(&raw);
    }

    pub fn logical(&mut self, key: &str, value: bool) -> &mut Self {
        self.push(format!("{key:<8}= {:>20}", if value { "T" } else { "F" }));
        self
    }

    pub fn integer(&mut self, key: &str, value: i64) -> &mut Self {
        self.push(format!("{key:<8}= {value:>20}"));
        self
    }

    pub fn string(&mut self, key: &str, value: &str) -> Result<&mut Self> {
        check_value(key, value)?;
        self.push(format!("{key:<8}= '{:<8}'", escape(value)));
        Ok(self)
    }

    /// Terminate with `END` and pad with spaces to a block boundary.
    pub fn finish(mut self) -> Vec<u8> {
        self.push("END".to_string());
        pad_to_block(&mut self.bytes, b' ');
        self.bytes
    }
}

pub fn pad_to_block(bytes: &mut Vec<u8>, fill: u8) {
    let rem = bytes.len() % BLOCK_SIZE;
    if rem != 0 {
        bytes.resize(bytes.len() + BLOCK_SIZE - rem, fill);
    }
}

/// Read cards from `offset` up to `END`. Returns the cards and the offset of
/// the first block after the header.
pub fn read_header(bytes: &[u8], offset: usize) -> Result<(Vec<Card>, usize)> {
    let mut cards = Vec::new();
    let mut pos = offset;
    while pos + CARD_SIZE <= bytes.len() {
        let card = Card::parse(&bytes[pos..pos + CARD_SIZE])?;
        pos += CARD_SIZE;
        if card.keyword == "END" {
            let end = pos.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
            return Ok((cards, end));
        }
        cards.push(card);
    }
    Err(MocError::format("header has no END card"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(text: &str) -> Vec<u8> {
        let mut raw = text.as_bytes().to_vec();
        raw.resize(CARD_SIZE, b' ');
        raw
    }

    #[test]
    fn parses_value_types() {
        let c = Card::parse(&card("NAXIS2  =                   42 / rows")).unwrap();
        assert_eq!(c.keyword, "NAXIS2");
        assert_eq!(c.as_int(), Some(42));

        let c = Card::parse(&card("SIMPLE  =                    T")).unwrap();
        assert_eq!(c.as_bool(), Some(true));

        let c = Card::parse(&card("MOCTOOL = 'it''s a / tool'  / comment")).unwrap();
        assert_eq!(c.as_str(), Some("it's a / tool"));

        let c = Card::parse(&card("EQUINOX =               2000.0")).unwrap();
        assert_eq!(c.value, Some(CardValue::Other("2000.0".into())));

        let c = Card::parse(&card("COMMENT   anything goes")).unwrap();
        assert_eq!(c.keyword, "COMMENT");
        assert_eq!(c.value, None);
    }

    #[test]
    fn rejects_bad_cards() {
        assert!(Card::parse(b"SHORT").is_err());
        let mut raw = card("MOCTOOL = 'x'");
        raw[20] = 0x07;
        assert!(Card::parse(&raw).is_err());
        assert!(Card::parse(&card("MOCTOOL = 'open")).is_err());
    }

    #[test]
    fn writer_formats_fixed_columns() {
        let mut w = HeaderWriter::new();
        w.logical("SIMPLE", true).integer("NAXIS", 0);
        w.string("ORDERING", "NUNIQ").unwrap();
        let bytes = w.finish();
        assert_eq!(bytes.len(), BLOCK_SIZE);
        assert_eq!(&bytes[..30], b"SIMPLE  =                    T");
        assert_eq!(&bytes[80..110], b"NAXIS   =                    0");
        assert_eq!(&bytes[160..180], b"ORDERING= 'NUNIQ   '");
        assert_eq!(&bytes[240..243], b"END");
        assert!(bytes[243..].iter().all(|&b| b == b' '));
    }

    #[test]
    fn string_values_round_trip() {
        for value in ["", "a", "O'Brien", "x".repeat(68).as_str(), "  lead"] {
            let mut w = HeaderWriter::new();
            w.string("MOCID", value).unwrap();
            let bytes = w.finish();
            let (cards, end) = read_header(&bytes, 0).unwrap();
            assert_eq!(end, BLOCK_SIZE);
            assert_eq!(cards[0].as_str(), Some(value));
        }
    }

    #[test]
    fn value_checks() {
        assert!(check_value("K", &"x".repeat(69)).is_err());
        assert!(check_value("K", &"'".repeat(35)).is_err());
        assert!(check_value("K", &"'".repeat(34)).is_ok());
        assert!(check_value("K", "trailing ").is_err());
        assert!(check_value("K", "tab\there").is_err());
        assert!(check_keyword("MOC_ID-2").is_ok());
        assert!(check_keyword("mocid").is_err());
        assert!(check_keyword("TOOLONGKEY").is_err());
        assert!(check_keyword("").is_err());
    }

    #[test]
    fn missing_end_is_an_error() {
        let mut bytes = card("SIMPLE  =                    T");
        bytes.resize(BLOCK_SIZE, b' ');
        assert!(read_header(&bytes, 0).is_err());
    }
}
