//! Core of the automatic bookkeeping pipeline.
//!
//! Events captured from source channels (SMS, notifications, app data)
//! are classified against stored rules, deduplicated into groups, held
//! for confirmation, and finally pushed into the external ledger app.
//!
//! The flow, end to end:
//!
//! ```text
//! RawEvent -> classify -> BillDraft -> merge -> BillRecord (Wait2Edit)
//!          -> human/auto edit (Edited) -> BillProcessor -> Dispatcher
//!          -> LedgerClient -> Synced | Failed
//! ```

pub use assets::Asset;
pub use bills::{
    BillDraft, BillKind, BillRecord, BillState, DispatchMark, ExtendData, FailInfo, GROUP_NONE,
    RawSnapshot,
};
pub use classify::{AiClassifier, ClassifyOptions, Outcome};
pub use config::EngineConfig;
pub use dispatch::{DispatchOutcome, Dispatcher, FailReason, SkipReason, SyncReport, SyncRun};
pub use error::EngineError;
pub use events::{EventKind, Payload, RawEvent};
pub use fingerprint::{batch_fingerprint, fingerprint, record_fingerprint};
pub use ingest::{IngestHandle, IngestQueue, channel as ingest_channel};
pub use ledger::{
    DebtSubmission, LedgerAccount, LedgerClient, LedgerError, ReimbursementSubmission,
};
pub use money::MoneyCents;
pub use ops::{BillPatch, Engine, EngineBuilder, Ingested, MergeOutcome, RetestReport};
pub use processor::{BillProcessor, ProcessorConfig, SyncTrigger};
pub use rules::{Binding, Capture, ExtractorSpec, FieldMatch, MatchOp, RuleSet, RuleSpec};
pub use settings::{SyncFeatures, keys as setting_keys};
pub use wire::{DEFAULT_BASE, WireBill, type_code};

mod assets;
mod bills;
mod classify;
mod config;
mod dispatch;
mod error;
mod events;
mod fingerprint;
mod ingest;
mod ledger;
mod money;
mod ops;
mod processor;
mod rules;
mod settings;
mod wire;

pub type ResultEngine<T> = Result<T, EngineError>;
