use thiserror::Error;

/// Immutable board geometry and color palette, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardConfig {
    board_width: u32,
    board_height: u32,
    note_width: u32,
    note_height: u32,
    colors: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    ZeroDimension { field: &'static str },

    #[error("note size {note_width}x{note_height} does not fit on a {board_width}x{board_height} board")]
    NoteLargerThanBoard {
        board_width: u32,
        board_height: u32,
        note_width: u32,
        note_height: u32,
    },

    #[error("at least one note color is required")]
    NoColors,

    #[error("invalid color token '{0}'")]
    InvalidColor(String),
}

impl BoardConfig {
    pub fn new(
        board_width: u32,
        board_height: u32,
        note_width: u32,
        note_height: u32,
        colors: Vec<String>,
    ) -> Result<Self, ConfigError> {
        for (field, value) in [
            ("board width", board_width),
            ("board height", board_height),
            ("note width", note_width),
            ("note height", note_height),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDimension { field });
            }
        }

        if note_width > board_width || note_height > board_height {
            return Err(ConfigError::NoteLargerThanBoard {
                board_width,
                board_height,
                note_width,
                note_height,
            });
        }

        if colors.is_empty() {
            return Err(ConfigError::NoColors);
        }
        // Colors travel as single whitespace-delimited tokens in the handshake.
        if let Some(bad) = colors
            .iter()
            .find(|color| color.is_empty() || color.chars().any(char::is_whitespace))
        {
            return Err(ConfigError::InvalidColor(bad.clone()));
        }

        Ok(Self {
            board_width,
            board_height,
            note_width,
            note_height,
            colors,
        })
    }

    pub fn board_width(&self) -> u32 {
        self.board_width
    }

    pub fn board_height(&self) -> u32 {
        self.board_height
    }

    pub fn note_width(&self) -> u32 {
        self.note_width
    }

    pub fn note_height(&self) -> u32 {
        self.note_height
    }

    /// Colors in the order they were configured.
    pub fn colors(&self) -> &[String] {
        &self.colors
    }

    pub fn supports_color(&self, color: &str) -> bool {
        self.colors.iter().any(|candidate| candidate == color)
    }
}
