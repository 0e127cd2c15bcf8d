use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Bech32 public key: `npub1` plus 58 data characters.
static TOKEN_IN_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(npub1[a-z0-9]{58})\b").unwrap());

static TOKEN_WHOLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^npub1[a-z0-9]{58}$").unwrap());

/// A case-normalized identity token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn parse(raw: &str) -> Option<Token> {
        TOKEN_WHOLE
            .is_match(raw)
            .then(|| Token(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `len` characters followed by an ellipsis.
    pub fn short(&self, len: usize) -> String {
        let prefix: String = self.0.chars().take(len).collect();
        format!("{prefix}...")
    }

    pub fn viewer_url(&self, viewer_base_url: &str) -> String {
        format!("{viewer_base_url}{}", self.0)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns the first token mentioned in `text`, if any.
pub fn find_token(text: &str) -> Option<Token> {
    TOKEN_IN_TEXT
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| Token(m.as_str().to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "npub19yw2tq8lz3w9v0hjm6ckp4ahk5f7tcyxwqul3d9lc7x0mvw7rn0sq4jm2k";

    #[test]
    fn finds_first_token_and_lowercases_it() {
        let text = format!("hola! mi clave es {} y tambien npub1other", KEY.to_uppercase());
        assert_eq!(find_token(&text).unwrap().as_str(), KEY);
    }

    #[test]
    fn ignores_truncated_or_embedded_tokens() {
        assert!(find_token("npub19yw2tq8lz3w9").is_none());
        assert!(find_token(&format!("x{KEY}")).is_none());
        assert!(find_token(&format!("{KEY}abc")).is_none());
    }

    #[test]
    fn parse_requires_whole_token() {
        assert!(Token::parse(KEY).is_some());
        assert!(Token::parse(&format!(" {KEY}")).is_none());
        assert!(Token::parse("npub1").is_none());
    }

    #[test]
    fn short_form() {
        let token = Token::parse(KEY).unwrap();
        assert_eq!(token.short(16), "npub19yw2tq8lz3w...");
        assert_eq!(token.viewer_url("https://njump.me/"), format!("https://njump.me/{KEY}"));
    }
}
