pub type TalkieResult<T> = Result<T, TalkieError>;

/// Error taxonomy for an export run. Every variant is fatal to the whole
/// export: no partial output buffer is ever returned.
#[derive(thiserror::Error, Debug)]
pub enum TalkieError {
    #[error("capability error: {0}")]
    Capability(String),

    #[error("input error: {0}")]
    Input(String),

    #[error("media load error: {0}")]
    MediaLoad(String),

    #[error("audio decode error: {0}")]
    AudioDecode(String),

    #[error("encoder error: {0}")]
    Encoder(String),

    #[error("mux error: {0}")]
    Mux(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TalkieError {
    pub fn capability(msg: impl Into<String>) -> Self {
        Self::Capability(msg.into())
    }

    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn media_load(msg: impl Into<String>) -> Self {
        Self::MediaLoad(msg.into())
    }

    pub fn audio_decode(msg: impl Into<String>) -> Self {
        Self::AudioDecode(msg.into())
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    pub fn mux(msg: impl Into<String>) -> Self {
        Self::Mux(msg.into())
    }
}
