use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed record: {0}")]
    Record(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    #[error("invalid invoice: {0}")]
    InvalidInvoice(String),

    #[error("no {0} profile selected")]
    ProfileNotFound(&'static str),

    #[error("prompt error: {0}")]
    Prompt(#[from] inquire::InquireError),

    #[error("could not locate a user directory for this platform")]
    NoUserDirs,
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
