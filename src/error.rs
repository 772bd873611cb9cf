pub type ProbeResult<T> = Result<T, ProbeError>;

#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("image error: {0}")]
    Image(String),

    #[error("render error: {0}")]
    Render(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProbeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn image(msg: impl Into<String>) -> Self {
        Self::Image(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }
}
