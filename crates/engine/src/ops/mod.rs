use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tokio::sync::{Mutex, RwLock};

use crate::{EngineConfig, ResultEngine, classify::AiClassifier, rules::RuleSet};

mod assets;
mod bills;
mod merge;
mod pipeline;
mod rules;
mod settings;

pub use bills::BillPatch;
pub use merge::MergeOutcome;
pub use pipeline::Ingested;
pub use rules::RetestReport;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

pub struct Engine {
    database: DatabaseConnection,
    /// Serializes every mutating store op; reads go straight to the pool.
    write_lock: Mutex<()>,
    /// Compiled ruleset cache, swapped wholesale on reload/replace.
    ruleset: RwLock<Arc<RuleSet>>,
    classifier: Option<Arc<dyn AiClassifier>>,
    config: EngineConfig,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current compiled ruleset (cheap clone of the shared handle).
    pub async fn ruleset(&self) -> Arc<RuleSet> {
        self.ruleset.read().await.clone()
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    config: EngineConfig,
    classifier: Option<Arc<dyn AiClassifier>>,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> EngineBuilder {
        self.config = config;
        self
    }

    /// Optional external classifier for rule misses.
    pub fn classifier(mut self, classifier: Arc<dyn AiClassifier>) -> EngineBuilder {
        self.classifier = Some(classifier);
        self
    }

    /// Construct `Engine`, loading and compiling the stored ruleset and
    /// rolling back dispatches a previous process left in flight.
    pub async fn build(self) -> ResultEngine<Engine> {
        let engine = Engine {
            database: self.database,
            write_lock: Mutex::new(()),
            ruleset: RwLock::new(Arc::new(RuleSet::empty())),
            classifier: self.classifier,
            config: self.config,
        };
        engine.reload_rules().await?;
        engine.recover_inflight().await?;
        Ok(engine)
    }
}
