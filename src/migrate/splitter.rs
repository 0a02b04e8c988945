//! SQL-aware statement splitting.
//!
//! Splits migration bodies on top-level `;` with a small state machine that
//! tracks single-quoted strings (doubled-quote escape), double-quoted
//! identifiers, PostgreSQL dollar-quoted bodies (`$tag$…$tag$`), line
//! comments and block comments. Semicolons inside any of these states do
//! not split.

/// Splits SQL text into trimmed, non-empty statements.
pub fn split_statements(sql: &str) -> Vec<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = State::Normal;
    let mut index = 0;

    while index < chars.len() {
        let ch = chars[index];
        match &state {
            State::Normal => match ch {
                ';' => {
                    push_statement(&mut statements, &mut current);
                    index += 1;
                    continue;
                }
                '\'' => state = State::SingleQuote,
                '"' => state = State::DoubleQuote,
                '-' if chars.get(index + 1) == Some(&'-') => state = State::LineComment,
                '/' if chars.get(index + 1) == Some(&'*') => state = State::BlockComment,
                '$' => {
                    if let Some(tag) = dollar_tag(&chars, index) {
                        current.push_str(&tag);
                        index += tag.chars().count();
                        state = State::DollarQuote(tag);
                        continue;
                    }
                }
                _ => {}
            },
            State::SingleQuote => {
                if ch == '\'' {
                    // A doubled quote is an escaped quote, not a close.
                    if chars.get(index + 1) == Some(&'\'') {
                        current.push('\'');
                        current.push('\'');
                        index += 2;
                        continue;
                    }
                    state = State::Normal;
                }
            }
            State::DoubleQuote => {
                if ch == '"' {
                    if chars.get(index + 1) == Some(&'"') {
                        current.push('"');
                        current.push('"');
                        index += 2;
                        continue;
                    }
                    state = State::Normal;
                }
            }
            State::DollarQuote(tag) => {
                if ch == '$' && matches_at(&chars, index, tag) {
                    current.push_str(tag);
                    index += tag.chars().count();
                    state = State::Normal;
                    continue;
                }
            }
            State::LineComment => {
                if ch == '\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment => {
                if ch == '*' && chars.get(index + 1) == Some(&'/') {
                    current.push('*');
                    current.push('/');
                    index += 2;
                    state = State::Normal;
                    continue;
                }
            }
        }
        current.push(ch);
        index += 1;
    }

    push_statement(&mut statements, &mut current);
    statements
}

enum State {
    Normal,
    SingleQuote,
    DoubleQuote,
    DollarQuote(String),
    LineComment,
    BlockComment,
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
    current.clear();
}

/// Reads a `$tag$` opener starting at `start` (which points at `$`).
fn dollar_tag(chars: &[char], start: usize) -> Option<String> {
    let mut tag = String::from('$');
    let mut index = start + 1;
    while index < chars.len() {
        let ch = chars[index];
        if ch == '$' {
            tag.push('$');
            return Some(tag);
        }
        if ch.is_alphanumeric() || ch == '_' {
            tag.push(ch);
            index += 1;
        } else {
            return None;
        }
    }
    None
}

fn matches_at(chars: &[char], start: usize, tag: &str) -> bool {
    let tag_chars: Vec<char> = tag.chars().collect();
    chars.len() >= start + tag_chars.len()
        && chars[start..start + tag_chars.len()] == tag_chars[..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_top_level_semicolons() {
        let statements = split_statements("CREATE TABLE a(id INT); CREATE TABLE b(id INT);");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "CREATE TABLE a(id INT)");
    }

    #[test]
    fn semicolons_in_strings_do_not_split() {
        let statements = split_statements("INSERT INTO t VALUES ('a;b'); SELECT 1");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "INSERT INTO t VALUES ('a;b')");
    }

    #[test]
    fn doubled_quote_escape() {
        let statements = split_statements("INSERT INTO t VALUES ('it''s; fine'); SELECT 1");
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("it''s; fine"));
    }

    #[test]
    fn quoted_identifiers() {
        let statements = split_statements("SELECT \"a;b\" FROM t; SELECT 2");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "SELECT \"a;b\" FROM t");
    }

    #[test]
    fn dollar_quoted_bodies() {
        let sql = "CREATE FUNCTION f() RETURNS void AS $fn$ BEGIN SELECT 1; END; $fn$ LANGUAGE plpgsql; SELECT 3";
        let statements = split_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("BEGIN SELECT 1; END;"));
    }

    #[test]
    fn anonymous_dollar_quotes() {
        let sql = "DO $$ BEGIN NULL; END $$; SELECT 1";
        let statements = split_statements(sql);
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn comments_hide_semicolons() {
        let sql = "SELECT 1 -- trailing; comment\n; /* block; comment */ SELECT 2;";
        let statements = split_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("-- trailing; comment"));
        assert!(statements[1].contains("/* block; comment */"));
    }

    #[test]
    fn trailing_statement_without_semicolon() {
        let statements = split_statements("SELECT 1; SELECT 2");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1], "SELECT 2");
    }

    #[test]
    fn empty_input() {
        assert!(split_statements("  \n ").is_empty());
    }
}
