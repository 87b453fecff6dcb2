//! Character cursor shared by the selector and expression parsers.

use crate::error::ParseError;

pub(crate) const WHITESPACE: &[char] = &[' ', '\t', '\r', '\n'];

pub(crate) fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub(crate) fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub(crate) struct Scanner<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub(crate) fn peek_is(&self, f: impl Fn(char) -> bool) -> bool {
        self.peek().is_some_and(f)
    }

    pub(crate) fn is_eof(&self) -> bool {
        self.pos >= self.source.len()
    }

    pub(crate) fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Consume `text` if the input continues with it.
    pub(crate) fn eat(&mut self, text: &str) -> bool {
        if self.rest().starts_with(text) {
            self.pos += text.len();
            true
        } else {
            false
        }
    }

    /// Syntax error at the cursor.
    pub(crate) fn error(&self, expected: &[&str]) -> ParseError {
        ParseError::syntax(self.pos, expected, self.peek())
    }

    pub(crate) fn invalid_at(&self, offset: usize, expected: impl Into<String>) -> ParseError {
        let found = self.source.get(offset..).and_then(|s| s.chars().next());
        ParseError::invalid_grammar(offset, expected, found)
    }

    pub(crate) fn expect(&mut self, c: char) -> Result<(), ParseError> {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(self.error(&[&c.to_string()]))
        }
    }

    pub(crate) fn skip_whitespace(&mut self) -> usize {
        let start = self.pos;
        while self.peek_is(|c| WHITESPACE.contains(&c)) {
            self.pos += 1;
        }
        self.pos - start
    }

    /// At least one whitespace character.
    pub(crate) fn expect_whitespace(&mut self) -> Result<(), ParseError> {
        if self.skip_whitespace() == 0 {
            return Err(self.error(&["whitespace"]));
        }
        Ok(())
    }

    /// Longest-first lookup in an operator table.
    pub(crate) fn operator<T: Copy>(&mut self, table: &[T], key: impl Fn(T) -> &'static str) -> Option<T> {
        let found = table.iter().copied().find(|op| self.rest().starts_with(key(*op)))?;
        self.pos += key(found).len();
        Some(found)
    }

    /// Class name: `*`, or name characters with single interior dots.
    /// Returns an empty string when no name starts here.
    pub(crate) fn name(&mut self) -> Result<String, ParseError> {
        if self.eat("*") {
            return Ok("*".to_string());
        }
        let start = self.pos;
        if !self.peek_is(is_name_char) {
            return Ok(String::new());
        }
        while let Some(c) = self.peek() {
            if is_name_char(c) {
                self.pos += 1;
            } else if c == '.' {
                self.pos += 1;
                if !self.peek_is(is_name_char) {
                    return Err(self.error(&["[0-9a-zA-Z_]"]));
                }
            } else {
                break;
            }
        }
        Ok(self.source[start..self.pos].to_string())
    }

    pub(crate) fn identifier(&mut self) -> Result<String, ParseError> {
        if !self.peek_is(is_identifier_start) {
            return Err(self.error(&["[a-zA-Z_]"]));
        }
        let start = self.pos;
        while self.peek_is(is_name_char) {
            self.pos += 1;
        }
        Ok(self.source[start..self.pos].to_string())
    }

    pub(crate) fn integer(&mut self) -> Result<i64, ParseError> {
        let start = self.pos;
        while self.peek_is(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error(&["0-9"]));
        }
        self.source[start..self.pos]
            .parse::<i64>()
            .map_err(|_| self.invalid_at(start, "integer in range"))
    }

    /// Keyword that is not the prefix of a longer identifier.
    pub(crate) fn keyword(&mut self, word: &str) -> bool {
        let rest = self.rest();
        let Some(after) = rest.strip_prefix(word) else {
            return false;
        };
        if after.chars().next().map_or(true, |c| !is_name_char(c)) {
            self.pos += word.len();
            true
        } else {
            false
        }
    }

    /// Quoted string with escapes. The cursor must be on the opening quote.
    pub(crate) fn string(&mut self) -> Result<String, ParseError> {
        let quote = match self.peek() {
            Some(c @ ('\'' | '"' | '`')) => c,
            _ => return Err(self.error(&["'", "\"", "`"])),
        };
        self.pos += 1;
        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(self.error(&[&quote.to_string()]));
            };
            if c == quote {
                self.pos += 1;
                return Ok(out);
            }
            if u32::from(c) < 0x20 {
                return Err(self.error(&["printable character"]));
            }
            self.pos += c.len_utf8();
            if c != '\\' {
                out.push(c);
                continue;
            }
            let escaped = match self.bump() {
                None => return Err(self.error(&["escape character"])),
                Some(e) => e,
            };
            match escaped {
                '\\' | '\'' | '"' | '`' => out.push(escaped),
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                'b' => out.push('\u{8}'),
                'x' => out.push(self.hex_escape(2)?),
                'u' => out.push(self.hex_escape(4)?),
                _ => {
                    self.pos -= escaped.len_utf8();
                    return Err(self.error(&["\\", "'", "\"", "`", "n", "r", "t", "b", "x", "u"]));
                }
            }
        }
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char, ParseError> {
        let start = self.pos;
        for _ in 0..digits {
            if !self.peek_is(|c| c.is_ascii_hexdigit()) {
                return Err(self.error(&["0-9a-fA-F"]));
            }
            self.pos += 1;
        }
        let code = u32::from_str_radix(&self.source[start..self.pos], 16)
            .map_err(|_| self.invalid_at(start, "hex escape"))?;
        char::from_u32(code).ok_or_else(|| self.invalid_at(start, "unicode scalar value"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorKind;

    #[test]
    fn string_escapes() {
        let mut s = Scanner::new(r#"'a\'b\"c\`\n\t\x41中'"#);
        assert_eq!(s.string().unwrap(), "a'b\"c`\n\tA中");
        assert!(s.is_eof());

        let mut s = Scanner::new(r#""\r\b\u0041\u4e2D\\""#);
        assert_eq!(s.string().unwrap(), "\r\u{8}A中\\");
        assert!(s.is_eof());
    }

    #[test]
    fn string_backtick_quotes() {
        let mut s = Scanner::new(r#"`it's "ok"`"#);
        assert_eq!(s.string().unwrap(), "it's \"ok\"");
        assert!(s.is_eof());
    }

    #[test]
    fn string_rejects_surrogate_escape() {
        let mut s = Scanner::new(r"'\uD800'");
        let err = s.string().unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidGrammar);
        assert_eq!(err.offset, 3);

        let mut s = Scanner::new(r"'\u12G4'");
        let err = s.string().unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Syntax);
        assert_eq!(err.offset, 5);
    }

    #[test]
    fn string_rejects_raw_control_char() {
        let mut s = Scanner::new("'a\u{1}'");
        let err = s.string().unwrap_err();
        assert_eq!(err.offset, 2);
    }

    #[test]
    fn string_rejects_unknown_escape() {
        let mut s = Scanner::new(r"'\q'");
        let err = s.string().unwrap_err();
        assert_eq!(err.offset, 2);
        assert_eq!(err.found, Some('q'));
    }

    #[test]
    fn unterminated_string() {
        let mut s = Scanner::new("\"abc");
        let err = s.string().unwrap_err();
        assert_eq!(err.found, None);
        assert_eq!(err.expected, vec!["\"".to_string()]);
    }

    #[test]
    fn name_allows_interior_dots() {
        let mut s = Scanner::new("android.widget.Button[");
        assert_eq!(s.name().unwrap(), "android.widget.Button");
        assert_eq!(s.peek(), Some('['));

        let mut s = Scanner::new("a..b");
        assert!(s.name().is_err());

        let mut s = Scanner::new("[x]");
        assert_eq!(s.name().unwrap(), "");
    }

    #[test]
    fn keyword_needs_boundary() {
        let mut s = Scanner::new("trueish");
        assert!(!s.keyword("true"));
        let mut s = Scanner::new("true]");
        assert!(s.keyword("true"));
        assert_eq!(s.peek(), Some(']'));
    }

    #[test]
    fn integer_overflow_is_invalid_grammar() {
        let mut s = Scanner::new("99999999999999999999");
        assert_eq!(s.integer().unwrap_err().kind, ParseErrorKind::InvalidGrammar);
    }
}
