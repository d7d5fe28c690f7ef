// ── pwsafe3 / autotype ───────────────────────────────────────────────────────
//
// Parses an auto-type keystroke script into a token stream (§4.7). The
// escape language is entirely this format's own — distinct from e.g. a
// KeePass `{PLACEHOLDER}` syntax — so the state machine below is authored
// directly from the format's escape table rather than adapted from an
// existing parser.

use crate::entry::Entry;

/// One unit of an auto-type token stream: a literal keystroke to send, or a
/// symbolic action/placeholder to be expanded by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Key(String),
    Command(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Default,
    Escape,
    CreditCard,
    MandatoryNumber(NumberKind),
    OptionalNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumberKind {
    Delay,
    Wait,
    WaitThousands,
}

/// Unbound tokenizer: escape commands are emitted as `Command(name)` without
/// expansion against any entry's fields. Use `tokenize` for the bound form.
pub fn tokenize_unbound(text: &str) -> Vec<Token> {
    if text.is_empty() {
        return vec![
            Token::Command("UserName".into()),
            Token::Key("{Tab}".into()),
            Token::Command("Password".into()),
            Token::Key("{Tab}".into()),
            Token::Key("{Enter}".into()),
        ];
    }

    let mut tokens = Vec::new();
    let mut state = State::Default;
    let mut digits = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Default => {
                if c == '\\' {
                    state = State::Escape;
                } else {
                    tokens.push(Token::Key(c.to_string()));
                }
            }
            State::Escape => match c {
                'u' => {
                    tokens.push(Token::Command("UserName".into()));
                    state = State::Default;
                }
                'p' => {
                    tokens.push(Token::Command("Password".into()));
                    state = State::Default;
                }
                '2' => {
                    tokens.push(Token::Command("TwoFactorCode".into()));
                    state = State::Default;
                }
                'g' => {
                    tokens.push(Token::Command("Group".into()));
                    state = State::Default;
                }
                'i' => {
                    tokens.push(Token::Command("Title".into()));
                    state = State::Default;
                }
                'l' => {
                    tokens.push(Token::Command("Url".into()));
                    state = State::Default;
                }
                'm' => {
                    tokens.push(Token::Command("Email".into()));
                    state = State::Default;
                }
                'z' => {
                    tokens.push(Token::Command("Legacy".into()));
                    state = State::Default;
                }
                'b' => {
                    tokens.push(Token::Key("{Backspace}".into()));
                    state = State::Default;
                }
                't' => {
                    tokens.push(Token::Key("{Tab}".into()));
                    state = State::Default;
                }
                's' => {
                    tokens.push(Token::Key("+{Tab}".into()));
                    state = State::Default;
                }
                'n' => {
                    tokens.push(Token::Key("{Enter}".into()));
                    state = State::Default;
                }
                'c' => {
                    state = State::CreditCard;
                }
                'd' => {
                    digits.clear();
                    state = State::MandatoryNumber(NumberKind::Delay);
                }
                'w' => {
                    digits.clear();
                    state = State::MandatoryNumber(NumberKind::Wait);
                }
                'W' => {
                    digits.clear();
                    state = State::MandatoryNumber(NumberKind::WaitThousands);
                }
                'o' => {
                    digits.clear();
                    state = State::OptionalNumber;
                }
                other => {
                    tokens.push(Token::Key(other.to_string()));
                    state = State::Default;
                }
            },
            State::CreditCard => {
                match c {
                    'n' => tokens.push(Token::Command("CreditCardNumber".into())),
                    'e' => tokens.push(Token::Command("CreditCardExpiration".into())),
                    'v' => tokens.push(Token::Command("CreditCardVerification".into())),
                    'p' => tokens.push(Token::Command("CreditCardPin".into())),
                    other => {
                        tokens.push(Token::Key('c'.to_string()));
                        tokens.push(Token::Key(other.to_string()));
                    }
                }
                state = State::Default;
            }
            State::MandatoryNumber(kind) => {
                if c.is_ascii_digit() {
                    digits.push(c);
                    state = collect_digits(kind, &mut digits, &mut chars, &mut tokens, state);
                } else {
                    // First char after the escape wasn't a digit: fall back
                    // to literal tokens for the command letter and this char.
                    let letter = match kind {
                        NumberKind::Delay => 'd',
                        NumberKind::Wait => 'w',
                        NumberKind::WaitThousands => 'W',
                    };
                    tokens.push(Token::Key(letter.to_string()));
                    tokens.push(Token::Key(c.to_string()));
                    state = State::Default;
                }
            }
            State::OptionalNumber => {
                digits.push(c);
                state = collect_optional_digits(&mut digits, &mut chars, &mut tokens);
            }
        }
    }

    // Input ended mid-escape: flush whatever the pending state implies
    // rather than silently dropping it. Each of these states is only still
    // pending at loop exit if no further character arrived to resolve it
    // (a resolving character always drives the state back to `Default`
    // before the loop can end), so the fallbacks below never need to emit
    // a "next character" that was never there.
    match state {
        State::Default => {}
        State::Escape => tokens.push(Token::Key("\\".into())),
        State::CreditCard => tokens.push(Token::Key("c".into())),
        State::MandatoryNumber(kind) => {
            let letter = match kind {
                NumberKind::Delay => 'd',
                NumberKind::Wait => 'w',
                NumberKind::WaitThousands => 'W',
            };
            tokens.push(Token::Key(letter.to_string()));
        }
        State::OptionalNumber => tokens.push(Token::Command("Notes".into())),
    }

    tokens
}

fn collect_digits(
    kind: NumberKind,
    digits: &mut String,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    tokens: &mut Vec<Token>,
    _state: State,
) -> State {
    while digits.len() < 3 {
        match chars.peek() {
            Some(c) if c.is_ascii_digit() => {
                digits.push(*c);
                chars.next();
            }
            _ => break,
        }
    }
    let n: u32 = digits.parse().unwrap_or(0);
    match kind {
        NumberKind::Delay => tokens.push(Token::Command(format!("Delay:{n}"))),
        NumberKind::Wait => tokens.push(Token::Command(format!("Wait:{n}"))),
        NumberKind::WaitThousands => tokens.push(Token::Command(format!("Wait:{}", n * 1000))),
    }
    State::Default
}

fn collect_optional_digits(
    digits: &mut String,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    tokens: &mut Vec<Token>,
) -> State {
    while digits.len() < 3 {
        match chars.peek() {
            Some(c) if c.is_ascii_digit() => {
                digits.push(*c);
                chars.next();
            }
            _ => break,
        }
    }
    if digits.is_empty() {
        tokens.push(Token::Command("Notes".into()));
    } else {
        tokens.push(Token::Command(format!("Notes:{digits}")));
    }
    State::Default
}

/// Expands a single non-whitespace character into its send-keys form:
/// meta-characters become bracketed literals, a few control characters map
/// to their named key, everything else passes through unchanged.
fn expand_char(c: char, out: &mut Vec<Token>) {
    match c {
        '+' | '^' | '%' | '~' | '(' | ')' | '{' | '}' | '[' | ']' => {
            out.push(Token::Key(format!("{{{c}}}")));
        }
        '\u{8}' => out.push(Token::Key("{Backspace}".into())),
        '\n' | '\r' => out.push(Token::Key("{Enter}".into())),
        '\t' => out.push(Token::Key("{Tab}".into())),
        other => out.push(Token::Key(other.to_string())),
    }
}

fn expand_text(text: &str, out: &mut Vec<Token>) {
    for c in text.chars() {
        expand_char(c, out);
    }
}

/// Bound tokenizer: expands field-reference commands against `entry`'s
/// records into per-character `Key` tokens, and resolves `Notes`/`Notes:n`.
pub fn tokenize(text: &str, entry: &Entry) -> Vec<Token> {
    let mut out = Vec::new();
    for token in tokenize_unbound(text) {
        match token {
            Token::Command(name) if name == "UserName" => expand_text(entry.username(), &mut out),
            Token::Command(name) if name == "Password" => expand_text(entry.password(), &mut out),
            Token::Command(name) if name == "Group" => expand_text(entry.group(), &mut out),
            Token::Command(name) if name == "Title" => expand_text(entry.title(), &mut out),
            Token::Command(name) if name == "Url" => expand_text(entry.url(), &mut out),
            Token::Command(name) if name == "Email" => expand_text(entry.email(), &mut out),
            Token::Command(name) if name == "CreditCardNumber" => {
                expand_text(entry.credit_card_number(), &mut out)
            }
            Token::Command(name) if name == "CreditCardExpiration" => {
                expand_text(entry.credit_card_expiration(), &mut out)
            }
            Token::Command(name) if name == "CreditCardVerification" => {
                expand_text(entry.credit_card_verification_value(), &mut out)
            }
            Token::Command(name) if name == "CreditCardPin" => {
                expand_text(entry.credit_card_pin(), &mut out)
            }
            Token::Command(name) if name == "Notes" => {
                let normalized = entry.notes().replace("\r\n", "\n").replace('\r', "\n");
                expand_text(&normalized, &mut out);
            }
            Token::Command(name) if name.starts_with("Notes:") => {
                let normalized = entry.notes().replace("\r\n", "\n").replace('\r', "\n");
                let index: Option<usize> = name["Notes:".len()..].parse().ok();
                if let Some(n) = index.filter(|n| *n >= 1) {
                    if let Some(line) = normalized.lines().nth(n - 1) {
                        expand_text(line, &mut out);
                    }
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_the_default_sequence() {
        assert_eq!(
            tokenize_unbound(""),
            vec![
                Token::Command("UserName".into()),
                Token::Key("{Tab}".into()),
                Token::Command("Password".into()),
                Token::Key("{Tab}".into()),
                Token::Key("{Enter}".into()),
            ]
        );
    }

    #[test]
    fn bound_tokenize_expands_fields() {
        let mut entry = Entry::new();
        entry.set_username("x").unwrap();
        entry.set_password("y").unwrap();
        let tokens = tokenize("\\u\\t\\p\\n", &entry);
        assert_eq!(
            tokens,
            vec![
                Token::Key("x".into()),
                Token::Key("{Tab}".into()),
                Token::Key("y".into()),
                Token::Key("{Enter}".into()),
            ]
        );
    }

    #[test]
    fn trailing_backslash_is_literal() {
        assert_eq!(tokenize_unbound("a\\"), vec![Token::Key("a".into()), Token::Key("\\".into())]);
    }

    #[test]
    fn trailing_credit_card_escape_falls_back_to_literal() {
        assert_eq!(tokenize_unbound("\\c"), vec![Token::Key("c".into())]);
    }

    #[test]
    fn trailing_mandatory_number_escape_falls_back_to_literal() {
        assert_eq!(tokenize_unbound("\\d"), vec![Token::Key("d".into())]);
        assert_eq!(tokenize_unbound("\\w"), vec![Token::Key("w".into())]);
        assert_eq!(tokenize_unbound("\\W"), vec![Token::Key("W".into())]);
    }

    #[test]
    fn credit_card_escape() {
        assert_eq!(
            tokenize_unbound("\\cn"),
            vec![Token::Command("CreditCardNumber".into())]
        );
    }

    #[test]
    fn credit_card_unknown_suffix_falls_back_to_literal() {
        assert_eq!(
            tokenize_unbound("\\cx"),
            vec![Token::Key("c".into()), Token::Key("x".into())]
        );
    }

    #[test]
    fn mandatory_number_collects_up_to_three_digits() {
        assert_eq!(
            tokenize_unbound("\\d250"),
            vec![Token::Command("Delay:250".into())]
        );
    }

    #[test]
    fn mandatory_number_without_leading_digit_falls_back() {
        assert_eq!(
            tokenize_unbound("\\dx"),
            vec![Token::Key("d".into()), Token::Key("x".into())]
        );
    }

    #[test]
    fn wait_thousands_multiplies() {
        assert_eq!(
            tokenize_unbound("\\W3"),
            vec![Token::Command("Wait:3000".into())]
        );
    }

    #[test]
    fn optional_number_with_no_digits_is_bare_notes() {
        assert_eq!(tokenize_unbound("\\o"), vec![Token::Command("Notes".into())]);
    }

    #[test]
    fn optional_number_with_digits_indexes_notes() {
        assert_eq!(
            tokenize_unbound("\\o2"),
            vec![Token::Command("Notes:2".into())]
        );
    }

    #[test]
    fn notes_line_selection_is_one_indexed() {
        let mut entry = Entry::new();
        entry.set_notes("first\nsecond\nthird").unwrap();
        let tokens = tokenize("\\o2", &entry);
        assert_eq!(
            tokens,
            vec![
                Token::Key("s".into()),
                Token::Key("e".into()),
                Token::Key("c".into()),
                Token::Key("o".into()),
                Token::Key("n".into()),
                Token::Key("d".into()),
            ]
        );
    }

    #[test]
    fn notes_out_of_range_produces_nothing() {
        let mut entry = Entry::new();
        entry.set_notes("only one line").unwrap();
        let tokens = tokenize("\\o9", &entry);
        assert!(tokens.is_empty());
    }

    #[test]
    fn meta_characters_are_bracketed() {
        let mut entry = Entry::new();
        entry.set_username("a+b").unwrap();
        let tokens = tokenize("\\u", &entry);
        assert_eq!(
            tokens,
            vec![
                Token::Key("a".into()),
                Token::Key("{+}".into()),
                Token::Key("b".into()),
            ]
        );
    }
}
