//! Line codec: parses a raw wire line into a typed [`Command`], and renders
//! commands back into wire lines (used to announce ourselves, to forward a
//! `Transfer`'s `Deliver` to the target neighbour, and to store/replay
//! `Defer`red commands).
//!
//! Wire format: ASCII, newline-terminated, colon-delimited
//! fields. A line with zero colons is a bare verb; every verb has a fixed
//! arity enforced by exact field count.

/// Maximum line length accepted from a peer, matching the source's 256-byte
/// read buffer. A line at or beyond this length terminates the session.
pub const MAX_LINE_LEN: usize = 256;

/// A single parsed command from the wire. `Defer`'s inner command is kept as
/// the raw line it would appear as on the wire (without the `Defer:key:`
/// prefix) so it can be re-fed through [`parse_line`] verbatim on `Execute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `IM:port:name` — introduction.
    Im { port: u32, name: String },
    /// `Connect:port` — ask this depot to dial the given port.
    Connect { port: u32 },
    /// `Deliver:qty:good` — add qty to local inventory.
    Deliver { qty: i64, good: String },
    /// `Withdraw:qty:good` — subtract qty from local inventory.
    Withdraw { qty: i64, good: String },
    /// `Transfer:qty:good:target` — withdraw locally, deliver to neighbour.
    Transfer {
        qty: i64,
        good: String,
        target: String,
    },
    /// `Defer:key:verb:args...` — store an inner command under `key`.
    Defer { key: i64, inner_line: String },
    /// `Execute:key` — replay all not-completed commands stored under `key`.
    Execute { key: i64 },
}

/// Checks the character restrictions shared by good names, depot names, and
/// neighbour names: non-empty, and free of space, newline,
/// carriage return, and colon.
pub fn is_valid_token(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(|c| matches!(c, ' ' | '\n' | '\r' | ':'))
}

/// Parses a field as a strictly-positive integer with no extraneous
/// characters — used for both `qty` and `port` fields, which share the same
/// validation contract.
fn parse_positive(s: &str) -> Option<i64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<i64>().ok().filter(|&n| n > 0)
}

/// Parses one line of input (with or without a trailing newline) into a
/// [`Command`]. Returns `None` for anything that fails validation: an
/// unrecognized verb, wrong arity, an unparsable or non-positive integer
/// field, or a name/good field violating [`is_valid_token`]. These are all
/// silently-discarded protocol errors, not failures the caller needs to
/// distinguish between.
pub fn parse_line(line: &str) -> Option<Command> {
    let line = line.trim_end_matches(['\n', '\r']);
    let fields: Vec<&str> = line.split(':').collect();

    match fields.as_slice() {
        ["IM", port, name] => {
            let port = parse_positive(port)? as u32;
            if !is_valid_token(name) {
                return None;
            }
            Some(Command::Im {
                port,
                name: name.to_string(),
            })
        }
        ["Connect", port] => {
            let port = parse_positive(port)? as u32;
            Some(Command::Connect { port })
        }
        ["Deliver", qty, good] => {
            let qty = parse_positive(qty)?;
            if !is_valid_token(good) {
                return None;
            }
            Some(Command::Deliver {
                qty,
                good: good.to_string(),
            })
        }
        ["Withdraw", qty, good] => {
            let qty = parse_positive(qty)?;
            if !is_valid_token(good) {
                return None;
            }
            Some(Command::Withdraw {
                qty,
                good: good.to_string(),
            })
        }
        ["Transfer", qty, good, target] => {
            let qty = parse_positive(qty)?;
            if !is_valid_token(good) || !is_valid_token(target) {
                return None;
            }
            Some(Command::Transfer {
                qty,
                good: good.to_string(),
                target: target.to_string(),
            })
        }
        ["Defer", key, rest @ ..] if !rest.is_empty() => {
            let key = parse_positive(key)?;
            Some(Command::Defer {
                key,
                inner_line: rest.join(":"),
            })
        }
        ["Execute", key] => {
            let key = parse_positive(key)?;
            Some(Command::Execute { key })
        }
        _ => None,
    }
}

/// Renders an outbound `Deliver` line for the wire, as sent to a neighbour's
/// send-channel after a `Transfer`.
pub fn deliver_line(qty: i64, good: &str) -> String {
    format!("Deliver:{qty}:{good}\n")
}

/// Renders the introduction line this depot sends at the start of every
/// session.
pub fn im_line(port: u32, name: &str) -> String {
    format!("IM:{port}:{name}\n")
}
