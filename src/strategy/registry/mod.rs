//! Strategy registry and factory
//!
//! The registry is the only shared mutable state in the engine. Reads take a
//! cheap snapshot (`Arc` clone of the current map); writes build a new map and
//! swap it in, so an orchestration pass keeps the processors it started with
//! even if the registry is reconfigured mid-run.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::config::{HybridSharpConfig, LineMovementConfig, StrategiesConfig};
use crate::domain::StrategyId;
use crate::error::{Result, SharplineError};
use crate::strategy::processors::{
    BookConflictProcessor, ConsensusProcessor, HybridSharpProcessor, LateFlipProcessor,
    LineMovementProcessor, PublicFadeProcessor, SharpActionProcessor, TimingBasedProcessor,
    UnderdogValueProcessor,
};
use crate::strategy::traits::SignalProcessor;

// =============================================================================
// StrategyStatus
// =============================================================================

/// Migration/health metadata. Does not change what a processor generates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyStatus {
    Active,
    Experimental,
    Deprecated,
}

impl StrategyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Experimental => "experimental",
            Self::Deprecated => "deprecated",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "experimental" => Some(Self::Experimental),
            "deprecated" => Some(Self::Deprecated),
            _ => None,
        }
    }
}

impl fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Registry
// =============================================================================

/// A processor plus its registry metadata
#[derive(Clone)]
pub struct RegisteredStrategy {
    pub processor: Arc<dyn SignalProcessor>,
    pub status: StrategyStatus,
}

impl fmt::Debug for RegisteredStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredStrategy")
            .field("id", &self.processor.id())
            .field("status", &self.status)
            .finish()
    }
}

type Entries = HashMap<StrategyId, RegisteredStrategy>;

/// Information about a registered strategy
#[derive(Debug, Clone, Serialize)]
pub struct StrategyInfo {
    pub id: StrategyId,
    pub name: String,
    pub description: String,
    pub status: StrategyStatus,
}

/// Maps strategy ids to processor instances
#[derive(Default)]
pub struct StrategyRegistry {
    entries: RwLock<Arc<Entries>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in processor not listed in `disabled`
    pub fn with_defaults(config: &StrategiesConfig) -> Self {
        let registry = Self::new();
        for id in StrategyId::ALL {
            if config.disabled.contains(&id) {
                debug!(strategy = %id, "strategy disabled by configuration");
                continue;
            }
            registry.register(id, StrategyFactory::build(id, config));
        }
        registry
    }

    fn read(&self) -> Arc<Entries> {
        match self.entries.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn update<T>(&self, f: impl FnOnce(&mut Entries) -> T) -> T {
        let mut guard = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next = Entries::clone(&guard);
        let out = f(&mut next);
        *guard = Arc::new(next);
        out
    }

    /// Register a processor as active. Registering an id again replaces the
    /// previous processor (last write wins) and returns it.
    pub fn register(
        &self,
        id: StrategyId,
        processor: Arc<dyn SignalProcessor>,
    ) -> Option<Arc<dyn SignalProcessor>> {
        self.register_with_status(id, processor, StrategyStatus::Active)
    }

    pub fn register_with_status(
        &self,
        id: StrategyId,
        processor: Arc<dyn SignalProcessor>,
        status: StrategyStatus,
    ) -> Option<Arc<dyn SignalProcessor>> {
        let previous = self.update(|entries| {
            entries.insert(id, RegisteredStrategy { processor, status })
        });
        match &previous {
            Some(_) => info!(strategy = %id, status = %status, "replaced registered strategy"),
            None => debug!(strategy = %id, status = %status, "registered strategy"),
        }
        previous.map(|entry| entry.processor)
    }

    pub fn unregister(&self, id: StrategyId) -> Option<Arc<dyn SignalProcessor>> {
        self.update(|entries| entries.remove(&id)).map(|entry| entry.processor)
    }

    /// Look up a processor by its string id
    pub fn create(&self, id: &str) -> Result<Arc<dyn SignalProcessor>> {
        let parsed: StrategyId = id.parse()?;
        self.get(parsed)
    }

    pub fn get(&self, id: StrategyId) -> Result<Arc<dyn SignalProcessor>> {
        self.read()
            .get(&id)
            .map(|entry| Arc::clone(&entry.processor))
            .ok_or_else(|| SharplineError::UnknownStrategy(id.to_string()))
    }

    pub fn contains(&self, id: StrategyId) -> bool {
        self.read().contains_key(&id)
    }

    pub fn list_ids(&self) -> BTreeSet<StrategyId> {
        self.read().keys().copied().collect()
    }

    pub fn status(&self, id: StrategyId) -> Option<StrategyStatus> {
        self.read().get(&id).map(|entry| entry.status)
    }

    pub fn set_status(&self, id: StrategyId, status: StrategyStatus) -> Result<()> {
        self.update(|entries| match entries.get_mut(&id) {
            Some(entry) => {
                entry.status = status;
                Ok(())
            }
            None => Err(SharplineError::UnknownStrategy(id.to_string())),
        })?;
        info!(strategy = %id, status = %status, "strategy status changed");
        Ok(())
    }

    /// Current map; unaffected by later registrations
    pub fn snapshot(&self) -> Arc<HashMap<StrategyId, RegisteredStrategy>> {
        self.read()
    }

    /// Registered strategies ordered by id
    pub fn list(&self) -> Vec<StrategyInfo> {
        let entries = self.read();
        let mut infos: Vec<StrategyInfo> = entries
            .iter()
            .map(|(id, entry)| StrategyInfo {
                id: *id,
                name: entry.processor.name().to_string(),
                description: entry.processor.description().to_string(),
                status: entry.status,
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Builds processors from configuration
pub struct StrategyFactory;

impl StrategyFactory {
    /// Build the processor for `id` with its thresholds from `config`
    pub fn build(id: StrategyId, config: &StrategiesConfig) -> Arc<dyn SignalProcessor> {
        match id {
            StrategyId::SharpAction => Arc::new(SharpActionProcessor::new(config.sharp_action.clone())),
            StrategyId::LineMovement => Arc::new(LineMovementProcessor::new(config.line_movement.clone())),
            StrategyId::Consensus => Arc::new(ConsensusProcessor::new(config.consensus.clone())),
            StrategyId::PublicFade => Arc::new(PublicFadeProcessor::new(config.public_fade.clone())),
            StrategyId::LateFlip => Arc::new(LateFlipProcessor::new(config.late_flip.clone())),
            StrategyId::UnderdogValue => Arc::new(UnderdogValueProcessor::new(config.underdog_value.clone())),
            StrategyId::BookConflict => Arc::new(BookConflictProcessor::new(config.book_conflict.clone())),
            StrategyId::TimingBased => Arc::new(TimingBasedProcessor::new(config.timing_based.clone())),
            StrategyId::HybridSharp => Arc::new(HybridSharpProcessor::new(
                config.hybrid_sharp.clone(),
                config.line_movement.clone(),
            )),
        }
    }

    /// Build a processor from a standalone TOML document:
    ///
    /// ```toml
    /// [strategy]
    /// name = "sharp_action"
    /// status = "experimental"   # optional
    ///
    /// [params]
    /// min_differential = 20.0
    /// ```
    ///
    /// Missing params fall back to defaults. `hybrid_sharp` also reads an
    /// optional `[line_movement]` table.
    pub fn from_toml(config_content: &str) -> Result<(Arc<dyn SignalProcessor>, StrategyStatus)> {
        use toml::Value;

        let doc: Value = toml::from_str(config_content)
            .map_err(|e| SharplineError::InvalidInput(format!("invalid strategy TOML: {e}")))?;
        let section = doc
            .get("strategy")
            .ok_or_else(|| SharplineError::InvalidInput("missing [strategy] section".into()))?;
        let name = section
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SharplineError::InvalidInput("missing strategy.name".into()))?;
        let id: StrategyId = name.parse()?;
        let status = match section.get("status").and_then(|v| v.as_str()) {
            Some(s) => StrategyStatus::from_str(s).ok_or_else(|| {
                SharplineError::InvalidInput(format!("unknown strategy status: {s}"))
            })?,
            None => StrategyStatus::Active,
        };

        let params = doc
            .get("params")
            .cloned()
            .unwrap_or_else(|| Value::Table(Default::default()));
        let parse_err = |e: toml::de::Error| {
            SharplineError::InvalidInput(format!("invalid params for {id}: {e}"))
        };

        let mut config = StrategiesConfig::default();
        match id {
            StrategyId::SharpAction => config.sharp_action = params.try_into().map_err(parse_err)?,
            StrategyId::LineMovement => config.line_movement = params.try_into().map_err(parse_err)?,
            StrategyId::Consensus => config.consensus = params.try_into().map_err(parse_err)?,
            StrategyId::PublicFade => config.public_fade = params.try_into().map_err(parse_err)?,
            StrategyId::LateFlip => config.late_flip = params.try_into().map_err(parse_err)?,
            StrategyId::UnderdogValue => config.underdog_value = params.try_into().map_err(parse_err)?,
            StrategyId::BookConflict => config.book_conflict = params.try_into().map_err(parse_err)?,
            StrategyId::TimingBased => config.timing_based = params.try_into().map_err(parse_err)?,
            StrategyId::HybridSharp => {
                let hybrid: HybridSharpConfig = params.try_into().map_err(parse_err)?;
                let movement: LineMovementConfig = match doc.get("line_movement") {
                    Some(table) => table.clone().try_into().map_err(parse_err)?,
                    None => LineMovementConfig::default(),
                };
                config.hybrid_sharp = hybrid;
                config.line_movement = movement;
            }
        }

        Ok((Self::build(id, &config), status))
    }

    /// Every built-in strategy with default configuration
    pub fn available_strategies() -> Vec<StrategyInfo> {
        let config = StrategiesConfig::default();
        StrategyId::ALL
            .into_iter()
            .map(|id| {
                let processor = Self::build(id, &config);
                StrategyInfo {
                    id,
                    name: processor.name().to_string(),
                    description: processor.description().to_string(),
                    status: StrategyStatus::Active,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Signal;
    use crate::strategy::traits::GameContext;

    struct Named(StrategyId, &'static str);

    impl SignalProcessor for Named {
        fn id(&self) -> StrategyId {
            self.0
        }
        fn name(&self) -> &str {
            self.1
        }
        fn description(&self) -> &str {
            "test processor"
        }
        fn generate_signals(&self, _ctx: &GameContext) -> Result<Vec<Signal>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [StrategyStatus::Active, StrategyStatus::Experimental, StrategyStatus::Deprecated] {
            assert_eq!(StrategyStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(StrategyStatus::from_str("retired"), None);
    }

    #[test]
    fn test_defaults_register_all_builtins() {
        let registry = StrategyRegistry::with_defaults(&StrategiesConfig::default());
        assert_eq!(registry.len(), 9);
        assert_eq!(registry.list_ids().len(), 9);
        assert_eq!(registry.create("sharp_action").unwrap().id(), StrategyId::SharpAction);
    }

    #[test]
    fn test_disabled_strategies_skipped() {
        let config = StrategiesConfig {
            disabled: vec![StrategyId::LateFlip],
            ..StrategiesConfig::default()
        };
        let registry = StrategyRegistry::with_defaults(&config);
        assert!(!registry.contains(StrategyId::LateFlip));
        assert!(matches!(
            registry.get(StrategyId::LateFlip),
            Err(SharplineError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn test_register_same_id_replaces() {
        let registry = StrategyRegistry::new();
        assert!(registry
            .register(StrategyId::Consensus, Arc::new(Named(StrategyId::Consensus, "first")))
            .is_none());
        let replaced = registry
            .register(StrategyId::Consensus, Arc::new(Named(StrategyId::Consensus, "second")))
            .unwrap();

        assert_eq!(replaced.name(), "first");
        assert_eq!(registry.get(StrategyId::Consensus).unwrap().name(), "second");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_id_fails() {
        let registry = StrategyRegistry::new();
        assert!(matches!(registry.create("nope"), Err(SharplineError::UnknownStrategy(_))));
        assert!(matches!(registry.create("consensus"), Err(SharplineError::UnknownStrategy(_))));
    }

    #[test]
    fn test_snapshot_is_isolated_from_writes() {
        let registry = StrategyRegistry::with_defaults(&StrategiesConfig::default());
        let snapshot = registry.snapshot();
        registry.unregister(StrategyId::PublicFade);

        assert!(snapshot.contains_key(&StrategyId::PublicFade));
        assert!(!registry.contains(StrategyId::PublicFade));
    }

    #[test]
    fn test_status_metadata() {
        let registry = StrategyRegistry::with_defaults(&StrategiesConfig::default());
        registry.set_status(StrategyId::LateFlip, StrategyStatus::Deprecated).unwrap();
        assert_eq!(registry.status(StrategyId::LateFlip), Some(StrategyStatus::Deprecated));
        // Still resolvable
        assert!(registry.get(StrategyId::LateFlip).is_ok());

        let empty = StrategyRegistry::new();
        assert!(empty.set_status(StrategyId::LateFlip, StrategyStatus::Active).is_err());
    }

    #[test]
    fn test_factory_from_toml() {
        let toml = r#"
            [strategy]
            name = "sharp_action"
            status = "experimental"

            [params]
            min_differential = 30.0
        "#;
        let (processor, status) = StrategyFactory::from_toml(toml).unwrap();
        assert_eq!(processor.id(), StrategyId::SharpAction);
        assert_eq!(status, StrategyStatus::Experimental);

        assert!(StrategyFactory::from_toml("[strategy]\nname = \"astrology\"").is_err());
        assert!(StrategyFactory::from_toml("[params]\nx = 1").is_err());
    }

    #[test]
    fn test_available_strategies() {
        let strategies = StrategyFactory::available_strategies();
        assert_eq!(strategies.len(), 9);
        assert!(strategies.iter().any(|s| s.id == StrategyId::HybridSharp));
    }
}
