//! Symbol normalization and watchlist parsing shared between server and client.
//!
//! A-share codes are spelled many ways by callers: `600519`, `sh600519`, `SH600519`,
//! `600519.SH` or `sh.600519`. Every spelling is reduced to the bare six-digit code so
//! equivalent inputs hit the same cache entry.

use std::io::BufRead;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::QuoteError;

/// Exchange an A-share code is listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Market {
    /// Shanghai Stock Exchange.
    SH,
    /// Shenzhen Stock Exchange.
    SZ,
    /// Beijing Stock Exchange.
    BJ,
}

impl Market {
    /// Infer the exchange from a canonical code by its leading digit.
    pub fn for_code(code: &str) -> Market {
        match code.as_bytes().first() {
            Some(b'5' | b'6' | b'9') => Market::SH,
            Some(b'4' | b'8') => Market::BJ,
            _ => Market::SZ,
        }
    }

    /// Numeric market id used by the East Money `secid` parameter.
    pub fn secid_prefix(self) -> u8 {
        match self {
            Market::SH => 1,
            Market::SZ | Market::BJ => 0,
        }
    }
}

/// Reduce any accepted spelling of a symbol to its canonical code.
///
/// Market prefixes (`sh`, `sz`, `bj`, optionally followed by `.`) and suffixes (`.SH`,
/// `.SZ`, `.BJ`) are stripped case-insensitively. Codes made of digits are returned as-is;
/// anything else is upper-cased so lookups stay case-insensitive.
pub fn normalize_symbol(raw: &str) -> Result<String, QuoteError> {
    let trimmed = raw.trim();
    let mut code = trimmed;

    if code.len() > 2 && code.is_char_boundary(2) {
        let (head, tail) = code.split_at(2);
        if head.parse::<Market>().is_ok() {
            let tail = tail.strip_prefix('.').unwrap_or(tail);
            if tail.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                code = tail;
            }
        }
    }

    if let Some((head, suffix)) = code.rsplit_once('.') {
        if suffix.parse::<Market>().is_ok() {
            code = head;
        }
    }

    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(QuoteError::InvalidSymbol(raw.to_string()));
    }
    Ok(code.to_ascii_uppercase())
}

/// Split free-form text into symbols separated by commas, whitespace or new lines.
pub fn split_symbols(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|s| !s.is_empty())
}

/// Trait providing watchlist parsing from any buffered reader.
pub trait SymbolParser {
    /// Parses normalized symbols from a buffered reader.
    ///
    /// Lines starting with `#` are comments. Duplicate spellings of the same code are
    /// collapsed, keeping the first occurrence. Returns an error on the first symbol that
    /// cannot be normalized.
    fn parse_watchlist<R: BufRead>(reader: R) -> Result<Vec<String>, QuoteError>;
}

/// Marker type implementing [`SymbolParser`] for plain-text watchlists.
pub struct Watchlist;

impl SymbolParser for Watchlist {
    fn parse_watchlist<R: BufRead>(reader: R) -> Result<Vec<String>, QuoteError> {
        let mut symbols: Vec<String> = Vec::new();

        for line_result in reader.lines() {
            let line = line_result.map_err(QuoteError::Io)?;
            let trimmed_line = line.trim();
            if trimmed_line.is_empty() || trimmed_line.starts_with('#') {
                continue;
            }

            for raw in split_symbols(trimmed_line) {
                match normalize_symbol(raw) {
                    Ok(code) => {
                        if !symbols.contains(&code) {
                            symbols.push(code);
                        }
                    }
                    Err(e) => return Err(QuoteError::ParseWatchlist(e.to_string())),
                }
            }
        }
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn strips_market_prefixes_and_suffixes() {
        for raw in ["600519", "sh600519", "SH600519", "600519.SH", "sh.600519", " 600519 "] {
            assert_eq!(normalize_symbol(raw).unwrap(), "600519", "input {raw:?}");
        }
        assert_eq!(normalize_symbol("sz000001").unwrap(), "000001");
        assert_eq!(normalize_symbol("830799.bj").unwrap(), "830799");
    }

    #[test]
    fn keeps_non_prefixed_tickers() {
        // "SHOP" starts with a market prefix but is not followed by digits.
        assert_eq!(normalize_symbol("shop").unwrap(), "SHOP");
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!(matches!(normalize_symbol("  "), Err(QuoteError::InvalidSymbol(_))));
        assert!(matches!(normalize_symbol("60/0519"), Err(QuoteError::InvalidSymbol(_))));
    }

    #[test]
    fn infers_market_from_code() {
        assert_eq!(Market::for_code("600519"), Market::SH);
        assert_eq!(Market::for_code("000001"), Market::SZ);
        assert_eq!(Market::for_code("300750"), Market::SZ);
        assert_eq!(Market::for_code("830799"), Market::BJ);
        assert_eq!(Market::SH.secid_prefix(), 1);
        assert_eq!(Market::BJ.secid_prefix(), 0);
    }

    #[test]
    fn parses_watchlist_with_mixed_separators() {
        let text = "# core\nsh600519, 000001\n\n300750 sz000001\n";
        let symbols = Watchlist::parse_watchlist(Cursor::new(text)).unwrap();
        assert_eq!(symbols, vec!["600519", "000001", "300750"]);
    }

    #[test]
    fn watchlist_reports_bad_entries() {
        let err = Watchlist::parse_watchlist(Cursor::new("600519\n??\n")).unwrap_err();
        assert!(matches!(err, QuoteError::ParseWatchlist(_)));
    }
}
