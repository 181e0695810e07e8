//! Actions: the operator's command grammar
//!
//! One whitespace-separated line describes one control point. Worker
//! operands are zero-based indices, splitter names are bare identifiers,
//! splitter values are single tokens.

use crate::worker::WorkerId;

/// A parsed operator action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Call { worker: WorkerId },
    Spawn { worker: WorkerId },
    Return { worker: WorkerId },
    Steal { thief: WorkerId, victim: WorkerId },
    Sync { worker: WorkerId },
    Push { worker: WorkerId, splitter: String },
    Set { worker: WorkerId, splitter: String, value: String },
    Pop { worker: WorkerId, splitter: String },
    Access { worker: WorkerId, splitter: String },
    Undo,
    Help,
}

/// Error for action strings that do not match the grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unable to parse action")]
pub struct ParseError;

fn worker(token: Option<&str>) -> Result<WorkerId, ParseError> {
    token
        .and_then(|t| t.parse::<usize>().ok())
        .map(WorkerId)
        .ok_or(ParseError)
}

fn name(token: Option<&str>) -> Result<String, ParseError> {
    match token {
        Some(t) if t.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') => {
            Ok(t.to_owned())
        }
        _ => Err(ParseError),
    }
}

fn value(token: Option<&str>) -> Result<String, ParseError> {
    token.map(str::to_owned).ok_or(ParseError)
}

/// Parse one action line
pub fn parse_action(line: &str) -> Result<Action, ParseError> {
    let mut tokens = line.split_whitespace();
    let action = match tokens.next().ok_or(ParseError)? {
        "call" => Action::Call {
            worker: worker(tokens.next())?,
        },
        "spawn" => Action::Spawn {
            worker: worker(tokens.next())?,
        },
        "return" => Action::Return {
            worker: worker(tokens.next())?,
        },
        "steal" => Action::Steal {
            thief: worker(tokens.next())?,
            victim: worker(tokens.next())?,
        },
        "sync" => Action::Sync {
            worker: worker(tokens.next())?,
        },
        "push" => Action::Push {
            worker: worker(tokens.next())?,
            splitter: name(tokens.next())?,
        },
        "set" => Action::Set {
            worker: worker(tokens.next())?,
            splitter: name(tokens.next())?,
            value: value(tokens.next())?,
        },
        "pop" => Action::Pop {
            worker: worker(tokens.next())?,
            splitter: name(tokens.next())?,
        },
        "access" => Action::Access {
            worker: worker(tokens.next())?,
            splitter: name(tokens.next())?,
        },
        "undo" => Action::Undo,
        "help" => Action::Help,
        _ => return Err(ParseError),
    };
    if tokens.next().is_some() {
        return Err(ParseError);
    }
    Ok(action)
}
