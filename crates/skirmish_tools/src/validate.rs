//! Data validation utilities.

use std::path::Path;

use serde::Serialize;
use skirmish_core::data::Catalog;
use skirmish_core::scenario::ScenarioDef;

use crate::{read_text, Result};

/// What a valid catalog contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogSummary {
    /// Number of unit types.
    pub unit_types: usize,
    /// Number of upgrades.
    pub upgrades: usize,
    /// Number of spells.
    pub spells: usize,
}

/// What a valid scenario builds into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioSummary {
    /// Scenario id.
    pub id: String,
    /// Seed of the random stream.
    pub seed: u32,
    /// Map layers.
    pub layers: usize,
    /// Players.
    pub players: usize,
    /// Units placed, connectors included.
    pub units: usize,
    /// State hash right after building.
    pub state_hash: u64,
}

/// Parse a catalog file and check its cross references.
///
/// # Errors
///
/// Returns an error if the file cannot be read, does not parse or has
/// dangling idents.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let text = read_text(path)?;
    let catalog = Catalog::from_ron_str(&path.display().to_string(), &text)?;
    Ok(catalog)
}

/// Validate a catalog file.
///
/// # Errors
///
/// See [`load_catalog`].
pub fn validate_catalog(path: &Path) -> Result<CatalogSummary> {
    let catalog = load_catalog(path)?;
    tracing::debug!(path = %path.display(), "catalog parsed");
    Ok(CatalogSummary {
        unit_types: catalog.unit_types.len(),
        upgrades: catalog.upgrades.len(),
        spells: catalog.spells.len(),
    })
}

/// Validate a scenario by building it over the catalog.
///
/// # Errors
///
/// Returns an error if either file is invalid or the scenario does not
/// build.
pub fn validate_scenario(scenario: &Path, catalog: &Path) -> Result<ScenarioSummary> {
    let catalog = load_catalog(catalog)?;
    let def = ScenarioDef::load(scenario)?;
    let sim = def.build(catalog)?;
    let world = sim.world();
    Ok(ScenarioSummary {
        id: def.id.clone(),
        seed: def.seed,
        layers: world.map.layer_count(),
        players: world.players.len(),
        units: world.units.len(),
        state_hash: sim.state_hash(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_core::error::GameError;
    use skirmish_test_utils::fixtures::test_catalog;

    use crate::ToolError;

    #[test]
    fn test_catalog_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.ron");
        let (catalog, _) = test_catalog();
        std::fs::write(&path, ron::to_string(&catalog).unwrap()).unwrap();

        let summary = validate_catalog(&path).unwrap();
        assert_eq!(summary.unit_types, catalog.unit_types.len());
        assert_eq!(summary.upgrades, 1);
        assert_eq!(summary.spells, 2);
    }

    #[test]
    fn test_broken_catalog_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ron");
        std::fs::write(&path, "(unit_types: [(ident: ").unwrap();

        match validate_catalog(&path) {
            Err(ToolError::Game(GameError::DataParseError { path: label, .. })) => {
                assert!(label.ends_with("broken.ron"));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = validate_catalog(&dir.path().join("absent.ron"));
        assert!(matches!(result, Err(ToolError::Io { .. })));
    }
}
