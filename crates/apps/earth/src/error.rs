use catalog::CatalogError;
use compute::{FieldError, GridError};
use streaming::LoadError;

#[derive(Debug)]
pub enum EngineError {
    Load(LoadError),
    Grid(GridError),
    Catalog(CatalogError),
    Field(FieldError),
    /// The attributes select no product at all.
    NoProducts(String),
    Config(String),
    Io(std::io::Error),
    /// A task died without producing a result.
    Fatal(String),
}

impl EngineError {
    /// HTTP-like status of a failed load, if this is one.
    pub fn status(&self) -> Option<i32> {
        match self {
            EngineError::Load(e) => e.status(),
            _ => None,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Load(e) => write!(f, "{e}"),
            EngineError::Grid(e) => write!(f, "bad grid: {e}"),
            EngineError::Catalog(e) => write!(f, "{e}"),
            EngineError::Field(e) => write!(f, "{e}"),
            EngineError::NoProducts(param) => write!(f, "no products for param {param:?}"),
            EngineError::Config(msg) => write!(f, "config: {msg}"),
            EngineError::Io(e) => write!(f, "io: {e}"),
            EngineError::Fatal(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Load(e) => Some(e),
            EngineError::Grid(e) => Some(e),
            EngineError::Catalog(e) => Some(e),
            EngineError::Field(e) => Some(e),
            EngineError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LoadError> for EngineError {
    fn from(e: LoadError) -> Self {
        EngineError::Load(e)
    }
}

impl From<GridError> for EngineError {
    fn from(e: GridError) -> Self {
        EngineError::Grid(e)
    }
}

impl From<CatalogError> for EngineError {
    fn from(e: CatalogError) -> Self {
        EngineError::Catalog(e)
    }
}

impl From<FieldError> for EngineError {
    fn from(e: FieldError) -> Self {
        EngineError::Field(e)
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e)
    }
}
