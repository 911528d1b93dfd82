use formats::GridRecord;

use crate::source::{GridSource, LoadError, load_files};

/// Data files needed to show one configuration.
///
/// `overlay` is set only when the overlay comes from different files than
/// the primary layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GridRequest {
    pub primary: Vec<String>,
    pub overlay: Option<Vec<String>>,
}

impl GridRequest {
    pub fn new(primary: Vec<String>) -> Self {
        Self {
            primary,
            overlay: None,
        }
    }

    pub fn with_overlay(mut self, overlay: Vec<String>) -> Self {
        self.overlay = Some(overlay);
        self
    }
}

/// Parsed files for a [`GridRequest`], one record list per path.
#[derive(Debug, Clone)]
pub struct LoadedFiles {
    pub primary: Vec<Vec<GridRecord>>,
    pub overlay: Option<Vec<Vec<GridRecord>>>,
}

pub async fn load_request(
    source: &dyn GridSource,
    request: &GridRequest,
) -> Result<LoadedFiles, LoadError> {
    let primary = load_files(source, &request.primary).await?;
    let overlay = match &request.overlay {
        Some(paths) => Some(load_files(source, paths).await?),
        None => None,
    };
    Ok(LoadedFiles { primary, overlay })
}
