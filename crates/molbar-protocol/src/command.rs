//! Text command grammar.
//!
//! Every transport speaks newline-terminated lines with case-sensitive
//! keywords:
//!
//! ```text
//! ADD <ATOM> <quantity>
//! DELIVER <NAME> <quantity>
//! DELIVER <WORD1> <WORD2> <quantity>
//! GEN <DRINK_NAME>
//! EXIT | quit
//! ```
//!
//! The grammar is transport-scoped: a stream session may only `ADD`, the
//! datagram endpoint may only `DELIVER`, and the console may only `GEN`.
//! [`parse_for`] enforces that scoping on top of [`parse_line`].

use std::fmt;

use molbar_core::Atom;
use thiserror::Error;

/// Longest line accepted from any transport, in bytes.
pub const MAX_LINE_LEN: usize = 256;

// ============================================================================
// Transport
// ============================================================================

/// The kind of source a line arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Connection-oriented stream client (TCP or Unix stream)
    Stream,
    /// Connectionless datagram client (UDP or Unix datagram)
    Datagram,
    /// Operator console on stdin
    Console,
}

impl Transport {
    /// Returns true if `command` is part of this transport's grammar.
    pub fn allows(&self, command: &Command) -> bool {
        matches!(
            (self, command),
            (Self::Stream, Command::Add { .. })
                | (Self::Stream, Command::Exit)
                | (Self::Datagram, Command::Deliver { .. })
                | (Self::Console, Command::Gen { .. })
                | (Self::Console, Command::Exit)
        )
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stream => "stream",
            Self::Datagram => "datagram",
            Self::Console => "console",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Command
// ============================================================================

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Credit `quantity` atoms to the inventory.
    Add { atom: Atom, quantity: u64 },

    /// Withdraw `quantity` molecules.
    ///
    /// The name is kept verbatim so an unknown molecule can still be named
    /// in the reply; the recipe lookup decides whether it exists.
    Deliver { molecule: String, quantity: u64 },

    /// Mix one serving of a drink.
    Gen { drink: String },

    /// End the session (`EXIT` or `quit`).
    Exit,
}

impl Command {
    /// Keyword used in diagnostics.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Add { .. } => "ADD",
            Self::Deliver { .. } => "DELIVER",
            Self::Gen { .. } => "GEN",
            Self::Exit => "EXIT",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add { atom, quantity } => write!(f, "ADD {atom} {quantity}"),
            Self::Deliver { molecule, quantity } => write!(f, "DELIVER {molecule} {quantity}"),
            Self::Gen { drink } => write!(f, "GEN {drink}"),
            Self::Exit => f.write_str("EXIT"),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Reasons a line is rejected. None of them are transport-level errors;
/// the caller logs a diagnostic and the session continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Malformed {command} command, usage: {usage}")]
    Malformed {
        command: &'static str,
        usage: &'static str,
    },

    #[error("Unknown atom type: {0}")]
    UnknownAtom(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Quantity must be positive, got {0}")]
    NonPositiveQuantity(String),

    #[error("{command} is not accepted on the {transport} transport")]
    NotAllowed {
        command: &'static str,
        transport: Transport,
    },

    #[error("Line too long: {len} bytes (max: {max})")]
    TooLong { len: usize, max: usize },
}

const ADD_USAGE: &str = "ADD <ATOM> <quantity>";
const DELIVER_USAGE: &str = "DELIVER <MOLECULE> <quantity>";
const GEN_USAGE: &str = "GEN <DRINK>";

// ============================================================================
// Parsing
// ============================================================================

/// Parses one line without transport scoping.
///
/// A trailing `\n` or `\r\n` is ignored.
pub fn parse_line(line: &str) -> Result<Command, ParseError> {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.len() > MAX_LINE_LEN {
        return Err(ParseError::TooLong {
            len: line.len(),
            max: MAX_LINE_LEN,
        });
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (keyword, args) = match tokens.split_first() {
        Some((keyword, args)) => (*keyword, args),
        None => return Err(ParseError::Empty),
    };

    match keyword {
        "ADD" => parse_add(args),
        "DELIVER" => parse_deliver(args),
        "GEN" => parse_gen(args),
        "EXIT" | "quit" if args.is_empty() => Ok(Command::Exit),
        other => Err(ParseError::UnknownCommand(other.to_string())),
    }
}

/// Parses one line and checks it belongs to `transport`'s grammar.
pub fn parse_for(transport: Transport, line: &str) -> Result<Command, ParseError> {
    let command = parse_line(line)?;
    if transport.allows(&command) {
        Ok(command)
    } else {
        Err(ParseError::NotAllowed {
            command: command.keyword(),
            transport,
        })
    }
}

fn parse_add(args: &[&str]) -> Result<Command, ParseError> {
    match args {
        [atom, quantity] => {
            let atom =
                Atom::from_name(atom).ok_or_else(|| ParseError::UnknownAtom(atom.to_string()))?;
            let quantity = parse_quantity(quantity)?;
            Ok(Command::Add { atom, quantity })
        }
        _ => Err(ParseError::Malformed {
            command: "ADD",
            usage: ADD_USAGE,
        }),
    }
}

fn parse_deliver(args: &[&str]) -> Result<Command, ParseError> {
    // Longest form first: two-word molecule names.
    let (molecule, quantity) = match args {
        [first, second, quantity] => (format!("{first} {second}"), quantity),
        [name, quantity] => (name.to_string(), quantity),
        _ => {
            return Err(ParseError::Malformed {
                command: "DELIVER",
                usage: DELIVER_USAGE,
            })
        }
    };

    let quantity = parse_quantity(quantity)?;
    Ok(Command::Deliver { molecule, quantity })
}

fn parse_gen(args: &[&str]) -> Result<Command, ParseError> {
    if args.is_empty() {
        return Err(ParseError::Malformed {
            command: "GEN",
            usage: GEN_USAGE,
        });
    }
    Ok(Command::Gen {
        drink: args.join(" "),
    })
}

fn parse_quantity(token: &str) -> Result<u64, ParseError> {
    match token.parse::<u64>() {
        Ok(0) => Err(ParseError::NonPositiveQuantity(token.to_string())),
        Ok(quantity) => Ok(quantity),
        Err(_) if token.parse::<i64>().is_ok() => {
            Err(ParseError::NonPositiveQuantity(token.to_string()))
        }
        Err(_) => Err(ParseError::InvalidQuantity(token.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add() {
        assert_eq!(
            parse_line("ADD CARBON 5\n").unwrap(),
            Command::Add {
                atom: Atom::Carbon,
                quantity: 5
            }
        );
    }

    #[test]
    fn test_add_rejects_unknown_atom_and_bad_quantities() {
        assert_eq!(
            parse_line("ADD HELIUM 5"),
            Err(ParseError::UnknownAtom("HELIUM".to_string()))
        );
        assert_eq!(
            parse_line("ADD OXYGEN 0"),
            Err(ParseError::NonPositiveQuantity("0".to_string()))
        );
        assert_eq!(
            parse_line("ADD OXYGEN -3"),
            Err(ParseError::NonPositiveQuantity("-3".to_string()))
        );
        assert_eq!(
            parse_line("ADD OXYGEN lots"),
            Err(ParseError::InvalidQuantity("lots".to_string()))
        );
        assert!(matches!(
            parse_line("ADD OXYGEN"),
            Err(ParseError::Malformed { command: "ADD", .. })
        ));
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert_eq!(
            parse_line("add CARBON 1"),
            Err(ParseError::UnknownCommand("add".to_string()))
        );
        assert_eq!(
            parse_line("ADD carbon 1"),
            Err(ParseError::UnknownAtom("carbon".to_string()))
        );
    }

    #[test]
    fn test_parse_deliver_single_word() {
        assert_eq!(
            parse_line("DELIVER WATER 3").unwrap(),
            Command::Deliver {
                molecule: "WATER".to_string(),
                quantity: 3
            }
        );
    }

    #[test]
    fn test_parse_deliver_two_words() {
        assert_eq!(
            parse_line("DELIVER CARBON DIOXIDE 2\r\n").unwrap(),
            Command::Deliver {
                molecule: "CARBON DIOXIDE".to_string(),
                quantity: 2
            }
        );
    }

    #[test]
    fn test_deliver_longer_names_are_unrepresentable() {
        assert!(matches!(
            parse_line("DELIVER VERY LONG NAME 2"),
            Err(ParseError::Malformed {
                command: "DELIVER",
                ..
            })
        ));
        assert!(matches!(
            parse_line("DELIVER WATER"),
            Err(ParseError::Malformed { .. })
        ));
    }

    #[test]
    fn test_deliver_keeps_unknown_names() {
        // Recipe lookup, not the parser, rejects unknown molecules
        assert_eq!(
            parse_line("DELIVER PLUTONIUM 1").unwrap(),
            Command::Deliver {
                molecule: "PLUTONIUM".to_string(),
                quantity: 1
            }
        );
    }

    #[test]
    fn test_parse_gen_takes_rest_of_line() {
        assert_eq!(
            parse_line("GEN SOFT DRINK\n").unwrap(),
            Command::Gen {
                drink: "SOFT DRINK".to_string()
            }
        );
        assert!(matches!(
            parse_line("GEN"),
            Err(ParseError::Malformed { command: "GEN", .. })
        ));
    }

    #[test]
    fn test_exit_tokens() {
        assert_eq!(parse_line("EXIT").unwrap(), Command::Exit);
        assert_eq!(parse_line("quit\n").unwrap(), Command::Exit);
        assert!(parse_line("EXIT now").is_err());
        assert!(parse_line("QUIT").is_err());
    }

    #[test]
    fn test_empty_and_oversized_lines() {
        assert_eq!(parse_line("\n"), Err(ParseError::Empty));
        assert_eq!(parse_line("   "), Err(ParseError::Empty));
        let long = format!("ADD CARBON {}", "1".repeat(MAX_LINE_LEN));
        assert!(matches!(parse_line(&long), Err(ParseError::TooLong { .. })));
    }

    #[test]
    fn test_grammar_is_transport_scoped() {
        assert!(parse_for(Transport::Stream, "ADD HYDROGEN 2").is_ok());
        assert!(parse_for(Transport::Stream, "EXIT").is_ok());
        assert_eq!(
            parse_for(Transport::Stream, "DELIVER WATER 1"),
            Err(ParseError::NotAllowed {
                command: "DELIVER",
                transport: Transport::Stream
            })
        );

        assert!(parse_for(Transport::Datagram, "DELIVER WATER 1").is_ok());
        assert!(parse_for(Transport::Datagram, "ADD CARBON 1").is_err());
        assert!(parse_for(Transport::Datagram, "GEN VODKA").is_err());
        assert!(parse_for(Transport::Datagram, "EXIT").is_err());

        assert!(parse_for(Transport::Console, "GEN VODKA").is_ok());
        assert!(parse_for(Transport::Console, "quit").is_ok());
        assert!(parse_for(Transport::Console, "ADD CARBON 1").is_err());
    }

    #[test]
    fn test_not_allowed_display() {
        let err = ParseError::NotAllowed {
            command: "GEN",
            transport: Transport::Datagram,
        };
        assert_eq!(err.to_string(), "GEN is not accepted on the datagram transport");
    }
}
