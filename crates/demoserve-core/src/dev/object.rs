//! Reader for the object literal exported by a `.js` config file.
//!
//! Config files are never executed. The reader accepts the static subset of
//! JavaScript needed to write configuration:
//!
//! ```js
//! // comments are fine
//! export default defineConfig({
//!   plugins: ['vue', { name: 'vue-devtools', options: { launchEditor: 'code' } }],
//!   server: { port: 5174, strictPort: true, },
//! })
//! ```
//!
//! Unquoted keys, single/double/backtick strings (no `${}`), trailing commas,
//! numbers, `true`/`false`/`null`/`undefined`. Anything else (function calls,
//! arrow functions, identifiers) is an error with a line and column.

use serde_json::{Map, Number, Value};
use std::fmt;

/// Error produced while reading a config object literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {}, column {})", self.message, self.line, self.column)
    }
}

impl std::error::Error for ObjectError {}

/// Parse the object literal after `export default` into a JSON value.
///
/// `export default defineConfig({ ... })` is accepted as well.
pub fn parse_default_export(source: &str) -> Result<Value, ObjectError> {
    let mut reader = Reader::new(source);
    reader.seek_default_export()?;
    reader.skip_trivia();

    let wrapped = reader.eat_word("defineConfig");
    if wrapped {
        reader.skip_trivia();
        reader.expect('(')?;
    }

    reader.skip_trivia();
    if reader.peek() != Some('{') {
        return Err(reader.error("`export default` must be followed by an object literal"));
    }
    let value = reader.value()?;

    if wrapped {
        reader.skip_trivia();
        reader.expect(')')?;
    }
    Ok(value)
}

struct Reader {
    chars: Vec<char>,
    pos: usize,
}

impl Reader {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn error(&self, message: impl Into<String>) -> ObjectError {
        let consumed = &self.chars[..self.pos.min(self.chars.len())];
        let line = consumed.iter().filter(|&&c| c == '\n').count() + 1;
        let column = consumed.iter().rev().take_while(|&&c| c != '\n').count() + 1;
        ObjectError {
            message: message.into(),
            line,
            column,
        }
    }

    fn expect(&mut self, want: char) -> Result<(), ObjectError> {
        match self.peek() {
            Some(ch) if ch == want => {
                self.pos += 1;
                Ok(())
            }
            Some(ch) => Err(self.error(format!("expected '{want}', found '{ch}'"))),
            None => Err(self.error(format!("expected '{want}', found end of input"))),
        }
    }

    /// Skip whitespace and comments.
    fn skip_trivia(&mut self) {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => self.pos += 1,
                (Some('/'), Some('/')) => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                (Some('/'), Some('*')) => {
                    self.pos += 2;
                    while self.peek().is_some() && !(self.peek() == Some('*') && self.peek_at(1) == Some('/')) {
                        self.pos += 1;
                    }
                    self.pos = (self.pos + 2).min(self.chars.len());
                }
                _ => return,
            }
        }
    }

    /// Consume `word` if it appears here as a whole identifier.
    fn eat_word(&mut self, word: &str) -> bool {
        let len = word.chars().count();
        let matches = word.chars().enumerate().all(|(i, c)| self.peek_at(i) == Some(c));
        if matches && !self.peek_at(len).is_some_and(is_ident_char) {
            self.pos += len;
            true
        } else {
            false
        }
    }

    /// Move to just after `export default`, skipping comments and strings.
    fn seek_default_export(&mut self) -> Result<(), ObjectError> {
        loop {
            self.skip_trivia();
            match self.peek() {
                None => return Err(self.error("no `export default` found in config file")),
                Some('"' | '\'' | '`') => {
                    self.string()?;
                }
                Some(c) if is_ident_start(c) => {
                    let at_word_start = self.pos == 0 || !is_ident_char(self.chars[self.pos - 1]);
                    if at_word_start && self.eat_word("export") {
                        self.skip_trivia();
                        if self.eat_word("default") {
                            return Ok(());
                        }
                    } else {
                        while self.peek().is_some_and(is_ident_char) {
                            self.pos += 1;
                        }
                    }
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn value(&mut self) -> Result<Value, ObjectError> {
        self.skip_trivia();
        match self.peek() {
            Some('{') => self.object(),
            Some('[') => self.array(),
            Some('"' | '\'' | '`') => self.string().map(Value::String),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(c) if is_ident_start(c) => self.keyword(),
            Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn object(&mut self) -> Result<Value, ObjectError> {
        self.expect('{')?;
        let mut map = Map::new();

        loop {
            self.skip_trivia();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }

            let key = self.key()?;
            self.skip_trivia();
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);

            self.skip_trivia();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {}
                Some(c) => return Err(self.error(format!("expected ',' or '}}', found '{c}'"))),
                None => return Err(self.error("unterminated object")),
            }
        }
    }

    fn array(&mut self) -> Result<Value, ObjectError> {
        self.expect('[')?;
        let mut items = Vec::new();

        loop {
            self.skip_trivia();
            if self.peek() == Some(']') {
                self.pos += 1;
                return Ok(Value::Array(items));
            }

            items.push(self.value()?);

            self.skip_trivia();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(']') => {}
                Some(c) => return Err(self.error(format!("expected ',' or ']', found '{c}'"))),
                None => return Err(self.error("unterminated array")),
            }
        }
    }

    fn key(&mut self) -> Result<String, ObjectError> {
        match self.peek() {
            Some('"' | '\'' | '`') => self.string(),
            Some(c) if is_ident_start(c) || c.is_ascii_digit() => {
                let start = self.pos;
                while self.peek().is_some_and(is_ident_char) {
                    self.pos += 1;
                }
                Ok(self.chars[start..self.pos].iter().collect())
            }
            Some(c) => Err(self.error(format!("expected object key, found '{c}'"))),
            None => Err(self.error("expected object key, found end of input")),
        }
    }

    fn string(&mut self) -> Result<String, ObjectError> {
        let Some(quote) = self.bump() else {
            return Err(self.error("expected string"));
        };
        let mut out = String::new();

        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(out),
                Some('$') if quote == '`' && self.peek() == Some('{') => {
                    return Err(self.error("template interpolation is not supported"));
                }
                Some('\n') if quote != '`' => return Err(self.error("unterminated string")),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some('\n') => {}
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated escape")),
                },
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn number(&mut self) -> Result<Value, ObjectError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_'))
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|&&c| c != '_')
            .collect();
        let text = text.strip_prefix('+').unwrap_or(&text);

        if let Ok(n) = text.parse::<i64>() {
            return Ok(Value::Number(n.into()));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| self.error(format!("invalid number '{text}'")))
    }

    fn keyword(&mut self) -> Result<Value, ObjectError> {
        if self.eat_word("true") {
            Ok(Value::Bool(true))
        } else if self.eat_word("false") {
            Ok(Value::Bool(false))
        } else if self.eat_word("null") || self.eat_word("undefined") {
            Ok(Value::Null)
        } else {
            let start = self.pos;
            let word: String = self.chars[start..]
                .iter()
                .take_while(|&&c| is_ident_char(c))
                .collect();
            Err(self.error(format!(
                "'{word}' cannot be evaluated statically; use a literal value"
            )))
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A bare object literal, without the `export default` wrapper.
    fn parse_object_literal(source: &str) -> Result<Value, ObjectError> {
        let mut reader = Reader::new(source);
        let value = reader.value()?;
        reader.skip_trivia();
        if let Some(ch) = reader.peek() {
            return Err(reader.error(format!("unexpected trailing '{ch}'")));
        }
        Ok(value)
    }

    #[test]
    fn test_parse_demo_shaped_config() {
        let source = r#"
            /**
             * header comment mentioning export default { nope }
             */
            import { defineConfig } from 'vite'

            // https://vitejs.dev/config/
            export default defineConfig({
              plugins: ['vue', "vue-devtools"],
              clearScreen: false,
              root: './src/components/_demo/',
              build: { minify: false },
              server: {
                port: 5174,
                strictPort: true,
                fs: { strict: false },
                proxy: {
                  '/site-api': {
                    target: 'http://localhost/',
                    changeOrigin: true,
                    rewrite: { from: '^/site-api', to: '' },
                  },
                },
              },
            })
        "#;

        let value = parse_default_export(source).unwrap();
        assert_eq!(value["plugins"], json!(["vue", "vue-devtools"]));
        assert_eq!(value["clearScreen"], false);
        assert_eq!(value["server"]["port"], 5174);
        assert_eq!(
            value["server"]["proxy"]["/site-api"]["rewrite"]["from"],
            "^/site-api"
        );
    }

    #[test]
    fn test_plain_export_default_with_semicolon() {
        let value = parse_default_export("export default { a: 1, b: -2.5, c: null };").unwrap();
        assert_eq!(value, json!({"a": 1, "b": -2.5, "c": null}));
    }

    #[test]
    fn test_strings_and_escapes() {
        let value = parse_object_literal(r#"{ a: 'it\'s', b: "x\ny", `c`: `tpl` }"#).unwrap();
        assert_eq!(value["a"], "it's");
        assert_eq!(value["b"], "x\ny");
        assert_eq!(value["c"], "tpl");
    }

    #[test]
    fn test_undefined_becomes_null() {
        let value = parse_object_literal("{ open: undefined }").unwrap();
        assert_eq!(value["open"], Value::Null);
    }

    #[test]
    fn test_function_values_are_rejected_with_position() {
        let source = "export default {\n  plugins: [vue()],\n}";
        let err = parse_default_export(source).unwrap_err();
        assert!(err.message.contains("'vue'"), "{err}");
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 13);
    }

    #[test]
    fn test_template_interpolation_rejected() {
        assert!(parse_object_literal("{ a: `${x}` }").is_err());
    }

    #[test]
    fn test_missing_export_default() {
        let err = parse_default_export("const config = {};").unwrap_err();
        assert!(err.message.contains("export default"));
    }

    #[test]
    fn test_export_default_in_string_is_ignored() {
        let source = "const s = 'export default { x: 1 }';\nexport default { y: 2 }";
        assert_eq!(parse_default_export(source).unwrap(), json!({"y": 2}));
    }

    #[test]
    fn test_unterminated_object() {
        assert!(parse_object_literal("{ a: 1, ").is_err());
        assert!(parse_object_literal("{ a: 1 } extra").is_err());
    }
}
