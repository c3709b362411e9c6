use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DungeonError {
    #[error("map dimensions [{width}x{height}] are outside the supported range [{min}..={max}]")]
    InvalidDimensions {
        width: u32,
        height: u32,
        min: u32,
        max: u32,
    },
    #[error("border keep-out of {border} leaves no playable cells on a [{width}x{height}] map")]
    BorderTooLarge { border: u32, width: u32, height: u32 },
    #[error("generation has not finished yet, the layout cannot be read")]
    NotFinished,
    #[error("unknown dungeon style: \"{0}\"")]
    UnknownStyle(String),
}
