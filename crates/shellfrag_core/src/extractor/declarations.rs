//! Structural (AST-mode) command discovery.

use std::iter::Peekable;
use std::str::CharIndices;

use super::{CommandExtractor, ExtractionError, push_unique};

const DECLARATION_KEYWORDS: &[&str] = &["function", "filter", "workflow"];
const SCOPE_PREFIXES: &[&str] = &["global:", "script:", "local:", "private:"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind<'a> {
    Word(&'a str),
    OpenBrace,
    CloseBrace,
    /// Newline or `;`: a new statement may start after it.
    Boundary,
    Other,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: TokenKind<'a>,
    line: usize,
}

/// Finds `function`, `filter` and `workflow` declarations.
///
/// The fragment is tokenized first, so declarations inside comments, strings
/// and here-strings are ignored, and a declaration keyword only counts at the
/// start of a statement. Malformed fragments (unterminated strings or
/// comments, unbalanced braces, a keyword followed by a body but no name)
/// are rejected. A keyword used as a hashtable key is an ordinary word.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclarationScanner;

impl DeclarationScanner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExtractor for DeclarationScanner {
    fn extract(&self, content: &str) -> Result<Vec<String>, ExtractionError> {
        let tokens = Lexer::new(content).tokenize()?;

        let mut names = Vec::new();
        let mut open_braces: Vec<usize> = Vec::new();
        let mut at_statement_start = true;
        let mut iter = tokens.iter().peekable();

        while let Some(token) = iter.next() {
            match token.kind {
                TokenKind::Boundary => at_statement_start = true,
                TokenKind::OpenBrace => {
                    open_braces.push(token.line);
                    at_statement_start = true;
                }
                TokenKind::CloseBrace => {
                    if open_braces.pop().is_none() {
                        return Err(ExtractionError::syntax(token.line, "unexpected '}'"));
                    }
                    at_statement_start = true;
                }
                TokenKind::Word(word) => {
                    if at_statement_start && is_declaration_keyword(word) {
                        match iter.peek().map(|next| next.kind) {
                            Some(TokenKind::Word(name)) => {
                                let name = strip_scope(name);
                                if name.is_empty() {
                                    return Err(missing_name(token.line, word));
                                }
                                iter.next();
                                push_unique(&mut names, name);
                            }
                            // `function { }` has a body but no name.
                            Some(TokenKind::OpenBrace) | None => {
                                return Err(missing_name(token.line, word));
                            }
                            // A hashtable key or argument such as `Filter = '*.ps1'`.
                            Some(_) => {}
                        }
                    }
                    at_statement_start = false;
                }
                TokenKind::Other => at_statement_start = false,
            }
        }

        if let Some(line) = open_braces.pop() {
            return Err(ExtractionError::syntax(line, "missing closing '}'"));
        }

        Ok(names)
    }
}

fn missing_name(line: usize, keyword: &str) -> ExtractionError {
    ExtractionError::syntax(line, format!("missing name after '{}'", keyword))
}

fn is_declaration_keyword(word: &str) -> bool {
    DECLARATION_KEYWORDS
        .iter()
        .any(|keyword| keyword.eq_ignore_ascii_case(word))
}

fn strip_scope(name: &str) -> &str {
    for prefix in SCOPE_PREFIXES {
        if name
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        {
            return &name[prefix.len()..];
        }
    }
    name
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.' | '\\' | '$' | '?' | '!')
}

struct Lexer<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
            line: 1,
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    /// Consumes one char, keeping the line count.
    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn tokenize(mut self) -> Result<Vec<Token<'a>>, ExtractionError> {
        let mut tokens = Vec::new();

        while let Some((start, c)) = self.chars.next() {
            let line = self.line;
            let kind = match c {
                '\n' => {
                    self.line += 1;
                    TokenKind::Boundary
                }
                ';' => TokenKind::Boundary,
                '{' => TokenKind::OpenBrace,
                '}' => TokenKind::CloseBrace,
                c if c.is_whitespace() => continue,
                '#' => {
                    self.skip_line_comment();
                    continue;
                }
                '<' if self.peek_char() == Some('#') => {
                    self.bump();
                    self.skip_block_comment(line)?;
                    continue;
                }
                '`' => {
                    // Escaped char or line continuation.
                    self.bump();
                    continue;
                }
                '\'' => {
                    self.skip_single_quoted(line)?;
                    TokenKind::Other
                }
                '"' => {
                    self.skip_double_quoted(line)?;
                    TokenKind::Other
                }
                '@' if matches!(self.peek_char(), Some('\'' | '"')) => {
                    let quote = self.bump().unwrap_or('\'');
                    if self.at_line_end() {
                        self.skip_here_string(quote, line)?;
                    } else if quote == '\'' {
                        self.skip_single_quoted(line)?;
                    } else {
                        self.skip_double_quoted(line)?;
                    }
                    TokenKind::Other
                }
                '$' if self.peek_char() == Some('{') => {
                    self.skip_braced_variable(line)?;
                    TokenKind::Other
                }
                c if is_word_char(c) => TokenKind::Word(self.word(start, c)),
                _ => TokenKind::Other,
            };
            tokens.push(Token { kind, line });
        }

        Ok(tokens)
    }

    fn word(&mut self, start: usize, first: char) -> &'a str {
        let mut end = start + first.len_utf8();
        while let Some(&(i, c)) = self.chars.peek() {
            if !is_word_char(c) {
                break;
            }
            end = i + c.len_utf8();
            self.chars.next();
        }
        let src = self.src;
        &src[start..end]
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek_char() {
            if c == '\n' {
                break;
            }
            self.chars.next();
        }
    }

    fn skip_block_comment(&mut self, start_line: usize) -> Result<(), ExtractionError> {
        while let Some(c) = self.bump() {
            if c == '#' && self.peek_char() == Some('>') {
                self.bump();
                return Ok(());
            }
        }
        Err(ExtractionError::syntax(
            start_line,
            "unterminated block comment",
        ))
    }

    fn skip_single_quoted(&mut self, start_line: usize) -> Result<(), ExtractionError> {
        while let Some(c) = self.bump() {
            if c == '\'' {
                if self.peek_char() == Some('\'') {
                    self.bump();
                    continue;
                }
                return Ok(());
            }
        }
        Err(ExtractionError::syntax(start_line, "unterminated string"))
    }

    fn skip_double_quoted(&mut self, start_line: usize) -> Result<(), ExtractionError> {
        while let Some(c) = self.bump() {
            match c {
                '`' => {
                    self.bump();
                }
                '"' => {
                    if self.peek_char() == Some('"') {
                        self.bump();
                        continue;
                    }
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(ExtractionError::syntax(start_line, "unterminated string"))
    }

    /// True if only horizontal whitespace remains before the next newline.
    fn at_line_end(&mut self) -> bool {
        let src = self.src;
        let rest = match self.chars.peek() {
            Some(&(i, _)) => &src[i..],
            None => "",
        };
        rest.split('\n')
            .next()
            .is_some_and(|first| first.trim().is_empty())
    }

    fn skip_here_string(&mut self, quote: char, start_line: usize) -> Result<(), ExtractionError> {
        // Skip the rest of the opening line.
        while let Some(c) = self.bump() {
            if c == '\n' {
                break;
            }
        }

        let mut at_line_start = true;
        while let Some(c) = self.bump() {
            if at_line_start && c == quote && self.peek_char() == Some('@') {
                self.bump();
                return Ok(());
            }
            at_line_start = c == '\n';
        }

        Err(ExtractionError::syntax(start_line, "unterminated here-string"))
    }

    fn skip_braced_variable(&mut self, start_line: usize) -> Result<(), ExtractionError> {
        while let Some(c) = self.bump() {
            if c == '}' {
                return Ok(());
            }
        }
        Err(ExtractionError::syntax(start_line, "unterminated variable name"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn scan(content: &str) -> Result<Vec<String>, ExtractionError> {
        DeclarationScanner::new().extract(content)
    }

    #[test]
    fn test_functions_in_order() {
        let content = r#"
function Set-Foo {
    param($Value)
    $script:foo = $Value
}

function Get-Bar { $script:foo }
"#;
        assert_eq!(scan(content).unwrap(), vec!["Set-Foo", "Get-Bar"]);
    }

    #[test]
    fn test_filter_and_workflow() {
        let content = "filter Select-Odd { if ($_ % 2) { $_ } }\nworkflow Invoke-Flow { }\n";
        assert_eq!(scan(content).unwrap(), vec!["Select-Odd", "Invoke-Flow"]);
    }

    #[rstest]
    #[case("function global:Set-Foo { }", "Set-Foo")]
    #[case("function Script:Get-Bar { }", "Get-Bar")]
    #[case("FUNCTION Invoke-Loud { }", "Invoke-Loud")]
    #[case("function Test-Params($a, $b) { }", "Test-Params")]
    fn test_declaration_forms(#[case] content: &str, #[case] expected: &str) {
        assert_eq!(scan(content).unwrap(), vec![expected.to_string()]);
    }

    #[test]
    fn test_nested_functions() {
        let content = "function Outer {\n    function Inner { }\n    Inner\n}\n";
        assert_eq!(scan(content).unwrap(), vec!["Outer", "Inner"]);
    }

    #[test]
    fn test_ignores_comments() {
        let content = r#"
# function Commented-Out { }
<#
function In-Block { }
#>
function Real-One { } # function Trailing { }
"#;
        assert_eq!(scan(content).unwrap(), vec!["Real-One"]);
    }

    #[test]
    fn test_ignores_strings() {
        let content = r#"
$a = 'function Single { }'
$b = "function Double { } with `" escape"
$c = 'it''s function Doubled { }'
function Real-One { }
"#;
        assert_eq!(scan(content).unwrap(), vec!["Real-One"]);
    }

    #[test]
    fn test_ignores_here_strings() {
        let content = "$doc = @'\nfunction In-Here { }\n'@\n$x = @\"\nfunction In-Expandable { }\n\"@\nfunction After-Here { }\n";
        assert_eq!(scan(content).unwrap(), vec!["After-Here"]);
    }

    #[test]
    fn test_keyword_must_start_statement() {
        let content = "Write-Host function Not-A-Declaration\nfunction Yes { }\n";
        assert_eq!(scan(content).unwrap(), vec!["Yes"]);
    }

    #[test]
    fn test_semicolon_starts_statement() {
        assert_eq!(
            scan("$x = 1; function After-Semicolon { }").unwrap(),
            vec!["After-Semicolon"]
        );
    }

    #[test]
    fn test_braced_variable_is_not_a_block() {
        assert_eq!(
            scan("${my var} = 1\nfunction Ok { }\n").unwrap(),
            vec!["Ok"]
        );
    }

    #[rstest]
    #[case::splatted_filter(
        "function Get-Ps1 {\n    $params = @{\n        Path = $PSScriptRoot\n        Filter = '*.ps1'\n    }\n    Get-ChildItem @params\n}\n"
    )]
    #[case::inline_keys("function Get-Ps1 { $h = @{ function = 1; workflow = 2 } }\n")]
    fn test_keyword_as_ordinary_word(#[case] content: &str) {
        assert_eq!(scan(content).unwrap(), vec!["Get-Ps1"]);
    }

    #[test]
    fn test_duplicates_ignore_case() {
        let content = "function Set-Foo { }\nfunction set-foo { }\n";
        assert_eq!(scan(content).unwrap(), vec!["Set-Foo"]);
    }

    #[test]
    fn test_empty_fragment() {
        assert!(scan("").unwrap().is_empty());
        assert!(scan("# only a comment\n").unwrap().is_empty());
    }

    #[rstest]
    #[case::unterminated_string("$a = 'oops\nfunction X { }\n", 1)]
    #[case::unterminated_block_comment("\n<# never closed\nfunction X { }\n", 2)]
    #[case::unterminated_here_string("$a = @'\nfunction X { }\n", 1)]
    #[case::missing_close_brace("function X {\n  if ($true) {\n}\n", 1)]
    #[case::unexpected_close_brace("function X { }\n}\n", 2)]
    #[case::missing_name("function {\n}\n", 1)]
    #[case::keyword_at_end("$x = 1\nfilter", 2)]
    fn test_syntax_errors(#[case] content: &str, #[case] line: usize) {
        match scan(content) {
            Err(ExtractionError::Syntax { line: actual, .. }) => assert_eq!(actual, line),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }
}
