//! Weather products: which grids to load for a set of layer attributes and
//! how to present them.

pub mod attributes;
pub mod factories;
pub mod product;

pub use attributes::*;
pub use factories::*;
pub use product::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    InvalidDate(String),
    InvalidHour(String),
    UnknownProduct(String),
    InvalidScale(String),
    Corrupt(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::InvalidDate(d) => write!(f, "invalid date {d:?}, expected yyyy/mm/dd or current"),
            CatalogError::InvalidHour(h) => write!(f, "invalid hour {h:?}, expected hhmm"),
            CatalogError::UnknownProduct(p) => write!(f, "unknown product {p:?}"),
            CatalogError::InvalidScale(msg) => write!(f, "invalid color scale: {msg}"),
            CatalogError::Corrupt(msg) => write!(f, "attributes corrupt: {msg}"),
        }
    }
}

impl std::error::Error for CatalogError {}
