//! Line protocol spoken between the board server and its clients.
//!
//! Every command is one line of text. The keyword is matched without regard
//! to case; colors and messages are kept exactly as the client sent them.
//! Parsing validates everything that only depends on the configuration
//! (coordinate syntax, color membership) so that [`Command`] values are ready
//! to run against the [`Board`].

use std::fmt;

use anyhow::{Context, Result, anyhow, bail};
use thiserror::Error;

use crate::{
    board::{Board, PinOutcome, PostOutcome, UnpinOutcome},
    config::BoardConfig,
};

pub const PROTOCOL_TAG: &str = "NBB/1.0";

/// Text to send back to the client plus whether the session ends after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    text: String,
    close_after_write: bool,
}

impl Response {
    pub fn ok(line: impl Into<String>) -> Self {
        Self {
            text: terminate(line.into()),
            close_after_write: false,
        }
    }

    pub fn ok_and_close(line: impl Into<String>) -> Self {
        Self {
            text: terminate(line.into()),
            close_after_write: true,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn close_after_write(&self) -> bool {
        self.close_after_write
    }
}

fn terminate(mut line: String) -> String {
    if !line.ends_with('\n') {
        line.push('\n');
    }
    line
}

/// The closed set of errors a client can be told about.
///
/// `Display` yields the human-readable message; [`ProtocolError::to_response`]
/// wraps it in the `ERROR [code] [NAME] [message]` line.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("This format does not align with expected standard of {0}.")]
    InvalidFormat(&'static str),

    #[error(
        "Coordinates are outside the valid board upper or lower bounds, or the object extends beyond"
    )]
    OutOfBounds,

    #[error("Coordinates must be non-negative integers in the expected format.")]
    InvalidCoordinates,

    #[error("This color is not supported by the server.")]
    UnsupportedColor,

    #[error("A note already exists at this exact position (complete overlap is not allowed).")]
    CompleteOverlap,

    #[error("No note exists at the given coordinate or there is existing conflict")]
    NoNoteAtCoordinate,

    #[error("No pin exists at the given coordinate.")]
    PinNotFound,
}

impl ProtocolError {
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::InvalidFormat(_) => "01",
            ProtocolError::OutOfBounds => "02",
            ProtocolError::InvalidCoordinates => "03",
            ProtocolError::UnsupportedColor => "04",
            ProtocolError::CompleteOverlap => "05",
            ProtocolError::NoNoteAtCoordinate => "06",
            ProtocolError::PinNotFound => "07",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProtocolError::InvalidFormat(_) => "INVALID_FORMAT",
            ProtocolError::OutOfBounds => "OUT_OF_BOUNDS",
            ProtocolError::InvalidCoordinates => "INVALID_COORDINATES",
            ProtocolError::UnsupportedColor => "UNSUPPORTED_COLOR",
            ProtocolError::CompleteOverlap => "COMPLETE_OVERLAP",
            ProtocolError::NoNoteAtCoordinate => "NO_NOTE_AT_COORDINATE",
            ProtocolError::PinNotFound => "PIN_NOT_FOUND",
        }
    }

    pub fn to_response(&self) -> Response {
        Response::ok(format!("ERROR [{}] [{}] [{}]", self.code(), self.name(), self))
    }
}

impl From<ProtocolError> for Response {
    fn from(error: ProtocolError) -> Self {
        error.to_response()
    }
}

/// Greeting advertised to every client before any command is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub board_width: u32,
    pub board_height: u32,
    pub note_width: u32,
    pub note_height: u32,
    pub colors: Vec<String>,
}

impl Handshake {
    pub fn from_config(config: &BoardConfig) -> Self {
        Self {
            board_width: config.board_width(),
            board_height: config.board_height(),
            note_width: config.note_width(),
            note_height: config.note_height(),
            colors: config.colors().to_vec(),
        }
    }

    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        if parts.next() != Some("HELLO") {
            bail!("expected HELLO greeting, got '{}'", line.trim());
        }
        match parts.next() {
            Some(PROTOCOL_TAG) => {}
            Some(other) => bail!("unsupported protocol '{other}', expected {PROTOCOL_TAG}"),
            None => bail!("greeting is missing the protocol tag"),
        }

        let mut dimension = |name: &str| -> Result<u32> {
            let token = parts
                .next()
                .ok_or_else(|| anyhow!("greeting is missing the {name}"))?;
            token
                .parse()
                .with_context(|| format!("invalid {name} '{token}' in greeting"))
        };
        let board_width = dimension("board width")?;
        let board_height = dimension("board height")?;
        let note_width = dimension("note width")?;
        let note_height = dimension("note height")?;

        let colors: Vec<String> = parts.map(str::to_string).collect();
        if colors.is_empty() {
            bail!("greeting lists no colors");
        }

        Ok(Self {
            board_width,
            board_height,
            note_width,
            note_height,
            colors,
        })
    }
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HELLO {PROTOCOL_TAG} {} {} {} {} {}",
            self.board_width,
            self.board_height,
            self.note_width,
            self.note_height,
            self.colors.join(" ")
        )
    }
}

/// The single newline-terminated line sent when a client connects.
pub fn handshake(config: &BoardConfig) -> String {
    format!("{}\n", Handshake::from_config(config))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Post {
        x: u32,
        y: u32,
        color: String,
        message: String,
    },
    GetAll,
    GetPins,
    GetByColor(String),
    GetContains {
        x: u32,
        y: u32,
    },
    Pin {
        x: u32,
        y: u32,
    },
    Unpin {
        x: u32,
        y: u32,
    },
    Shake,
    Clear,
    Disconnect,
}

impl Command {
    /// Parses one raw line, as received and without its terminator.
    pub fn parse(raw: &str, config: &BoardConfig) -> Result<Self, ProtocolError> {
        let tokens: Vec<&str> = raw.split_whitespace().collect();
        let Some(keyword) = tokens.first() else {
            return Err(ProtocolError::InvalidFormat("<COMMAND>"));
        };

        match keyword.to_ascii_uppercase().as_str() {
            "POST" => parse_post(raw, &tokens, config),
            "GET" => parse_get(&tokens, config),
            "PIN" => {
                let (x, y) = parse_point_args(&tokens, "PIN")?;
                Ok(Command::Pin { x, y })
            }
            "UNPIN" => {
                let (x, y) = parse_point_args(&tokens, "UNPIN")?;
                Ok(Command::Unpin { x, y })
            }
            "SHAKE" => expect_bare(&tokens, "SHAKE", Command::Shake),
            "CLEAR" => expect_bare(&tokens, "CLEAR", Command::Clear),
            "DISCONNECT" => expect_bare(&tokens, "DISCONNECT", Command::Disconnect),
            _ => Err(ProtocolError::InvalidFormat("<COMMAND>")),
        }
    }

    /// Runs the command against the board and formats the reply.
    pub async fn execute(self, board: &Board) -> Result<Response, ProtocolError> {
        match self {
            Command::Post {
                x,
                y,
                color,
                message,
            } => match board.post(x, y, &color, &message).await {
                PostOutcome::Posted => Ok(Response::ok("OK POSTED")),
                PostOutcome::OutOfBounds => Err(ProtocolError::OutOfBounds),
                PostOutcome::CompleteOverlap => Err(ProtocolError::CompleteOverlap),
            },
            Command::GetAll => Ok(Response::ok(board.all_notes().await.to_string())),
            Command::GetPins => Ok(Response::ok(board.all_pins().await.to_string())),
            Command::GetByColor(color) => Ok(Response::ok(
                board.notes_by_color(&color).await.to_string(),
            )),
            Command::GetContains { x, y } => {
                ensure_on_board(board, x, y)?;
                Ok(Response::ok(board.notes_at(x, y).await.to_string()))
            }
            Command::Pin { x, y } => {
                ensure_on_board(board, x, y)?;
                match board.pin(x, y).await {
                    PinOutcome::Pinned => Ok(Response::ok("OK PINNED")),
                    PinOutcome::NoNoteAtCoordinate => Err(ProtocolError::NoNoteAtCoordinate),
                }
            }
            Command::Unpin { x, y } => {
                ensure_on_board(board, x, y)?;
                match board.unpin(x, y).await {
                    UnpinOutcome::Unpinned => Ok(Response::ok("OK UNPINNED")),
                    UnpinOutcome::PinNotFound => Err(ProtocolError::PinNotFound),
                }
            }
            Command::Shake => {
                let removed = board.shake().await;
                Ok(Response::ok(format!("OK SHAKEN {removed}")))
            }
            Command::Clear => {
                board.clear().await;
                Ok(Response::ok("OK CLEARED"))
            }
            Command::Disconnect => Ok(Response::ok_and_close("OK DISCONNECTING")),
        }
    }
}

/// Interprets one client line. Protocol failures become `ERROR` replies;
/// nothing here ends the session except `DISCONNECT`.
pub async fn handle_line(raw: &str, board: &Board, config: &BoardConfig) -> Response {
    let outcome = match Command::parse(raw, config) {
        Ok(command) => command.execute(board).await,
        Err(error) => Err(error),
    };
    outcome.unwrap_or_else(Response::from)
}

fn parse_post(raw: &str, tokens: &[&str], config: &BoardConfig) -> Result<Command, ProtocolError> {
    if tokens.len() < 5 {
        return Err(ProtocolError::InvalidFormat("POST"));
    }

    let (x, y) = parse_point(tokens[1], tokens[2])?;

    let color = tokens[3];
    if !config.supports_color(color) {
        return Err(ProtocolError::UnsupportedColor);
    }

    let start = token_offset(raw, 4).ok_or(ProtocolError::InvalidFormat("POST"))?;
    Ok(Command::Post {
        x,
        y,
        color: color.to_string(),
        message: raw[start..].trim().to_string(),
    })
}

fn parse_get(tokens: &[&str], config: &BoardConfig) -> Result<Command, ProtocolError> {
    let Some(arg) = tokens.get(1) else {
        return Ok(Command::GetAll);
    };

    if arg.eq_ignore_ascii_case("pins") && tokens.len() == 2 {
        return Ok(Command::GetPins);
    }

    if let Some(color) = strip_prefix_ignore_case(arg, "color=") {
        if tokens.len() != 2 {
            return Err(ProtocolError::InvalidFormat("GET"));
        }
        if !config.supports_color(color) {
            return Err(ProtocolError::UnsupportedColor);
        }
        return Ok(Command::GetByColor(color.to_string()));
    }

    if let Some(point) = strip_prefix_ignore_case(arg, "contains=") {
        // contains=<x>,<y> or contains=<x> <y>
        let (xs, ys) = match (point.split_once(','), tokens.len()) {
            (Some((xs, ys)), 2) if !ys.contains(',') => (xs, ys),
            (None, 3) => (point, tokens[2]),
            _ => return Err(ProtocolError::InvalidFormat("GET")),
        };
        let (x, y) = parse_point(xs, ys)?;
        return Ok(Command::GetContains { x, y });
    }

    Err(ProtocolError::InvalidFormat("GET"))
}

fn parse_point_args(tokens: &[&str], name: &'static str) -> Result<(u32, u32), ProtocolError> {
    if tokens.len() != 3 {
        return Err(ProtocolError::InvalidFormat(name));
    }
    parse_point(tokens[1], tokens[2])
}

fn expect_bare(
    tokens: &[&str],
    name: &'static str,
    command: Command,
) -> Result<Command, ProtocolError> {
    if tokens.len() != 1 {
        return Err(ProtocolError::InvalidFormat(name));
    }
    Ok(command)
}

fn ensure_on_board(board: &Board, x: u32, y: u32) -> Result<(), ProtocolError> {
    if board.is_on_board_point(x, y) {
        Ok(())
    } else {
        Err(ProtocolError::OutOfBounds)
    }
}

fn parse_point(xs: &str, ys: &str) -> Result<(u32, u32), ProtocolError> {
    match (parse_coordinate(xs), parse_coordinate(ys)) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(ProtocolError::InvalidCoordinates),
    }
}

/// Non-negative value in the signed 32-bit range.
fn parse_coordinate(token: &str) -> Option<u32> {
    token
        .parse::<i32>()
        .ok()
        .and_then(|value| u32::try_from(value).ok())
}

fn strip_prefix_ignore_case<'a>(token: &'a str, prefix: &str) -> Option<&'a str> {
    let head = token.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&token[prefix.len()..])
    } else {
        None
    }
}

/// Byte offset where the whitespace-delimited token at `index` (zero based)
/// starts in `raw`.
fn token_offset(raw: &str, index: usize) -> Option<usize> {
    let mut seen = 0;
    let mut in_token = false;
    for (offset, ch) in raw.char_indices() {
        if ch.is_whitespace() {
            in_token = false;
        } else if !in_token {
            if seen == index {
                return Some(offset);
            }
            seen += 1;
            in_token = true;
        }
    }
    None
}
