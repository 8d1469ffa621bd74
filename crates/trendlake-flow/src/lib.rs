//! # trendlake-flow
//!
//! Orchestration engine for the Trendlake pipeline.
//!
//! This crate ties the three processing stages together without any central
//! scheduler state:
//!
//! - **Notification Bus**: at-least-once pub/sub with bounded retry and a
//!   dead-letter channel
//! - **Stage Runners**: idempotent execution of one stage over one
//!   partition, with per-item isolation and cooperative cancellation
//! - **Pipeline Coordinator**: maps each stage's completion event to the
//!   next stage's invocation
//!
//! ## Guarantees
//!
//! - **Causal ordering**: a stage runs only because its upstream artifact
//!   exists; the triggering event carries the upstream location
//! - **Idempotent triggering**: duplicate deliveries short-circuit at the
//!   artifact store's write-once boundary
//! - **Failure isolation**: item failures never discard sibling results;
//!   partition failures never block other partitions
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trendlake_core::{LakePaths, MemoryBackend, Profile};
//! use trendlake_flow::bus::InMemoryBus;
//! use trendlake_flow::pipeline::Pipeline;
//! # use trendlake_flow::error::Result;
//! # use trendlake_flow::stages::{ContentJudge, MediaGateway, SpeechToText};
//!
//! # async fn demo(
//! #     gateway: Arc<dyn MediaGateway>,
//! #     speech: Arc<dyn SpeechToText>,
//! #     judge: Arc<dyn ContentJudge>,
//! # ) -> Result<()> {
//! let store = trendlake_lake::ArtifactStore::new(
//!     Arc::new(MemoryBackend::new()),
//!     LakePaths::default(),
//! );
//! let catalog = Arc::new(trendlake_catalog::MemoryCatalog::new());
//! let bus = Arc::new(InMemoryBus::default());
//!
//! let pipeline = Pipeline::builder(store, bus, catalog)
//!     .with_media_gateway(gateway)
//!     .with_speech_to_text(speech)
//!     .with_content_judge(judge)
//!     .build()
//!     .await?;
//!
//! pipeline.start_run(Profile::new("alice")?).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod bus;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod runner;
pub mod stages;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bus::{stage_topic, DeadLetter, EventHandler, InMemoryBus, NotificationBus};
    pub use crate::coordinator::{run_state, PipelineCoordinator, RunState};
    pub use crate::error::{Error, Result};
    pub use crate::pipeline::Pipeline;
    pub use crate::retry::RetryPolicy;
    pub use crate::runner::{StageInput, StageOutcome, StageRunner};
    pub use crate::stages::{ContentJudge, JudgmentRequest, MediaGateway, SpeechToText};
}
