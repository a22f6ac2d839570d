// certmig-core/src/domain/anonymize/mod.rs

pub mod consistency;
pub mod engine;
pub mod rules;
pub mod synthetic;

pub use consistency::ConsistencyMap;
pub use engine::{AnonymizationEngine, LeakFinding, TransformOutcome};
pub use rules::{AnonymizationRule, HashAlgorithm, RuleBinder, RuleSet, Strategy, SyntheticKind};
