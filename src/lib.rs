//! # The Life - player-economy simulation engine
//!
//! Core engine for "The Life", a multiplayer text-driven role-play economy
//! (crimes, jail and hospital stays, business production, PvP, skill
//! progression) played through chat platforms. This crate is the
//! simulation only: chat ingestion, rendering, and dashboards are separate
//! collaborators that consume the session views and outcome messages
//! exposed here.
//!
//! ## Features
//!
//! - **Outcome formulas**: one implementation of success chance, jail
//!   time, bribes, and combat power serves both UI previews and rolls.
//! - **Authoritative ledger contract**: every cash-, stamina-, or
//!   outcome-moving operation commits through a server-validated
//!   transactional procedure, with a capability-probed fallback to direct
//!   read-modify-write for deployments mid-rollout.
//! - **Poll-based reconciliation**: authoritative snapshots arrive by
//!   polling; a guard window keeps stale snapshots from clobbering
//!   just-applied optimistic results.
//! - **Clock-derived lifecycle**: jail, hospital, and production states
//!   are recomputed from stored timestamps, never from fired timers, so a
//!   session that slept resumes correctly.
//! - **Async design**: Tokio tasks drive the display ticker and the
//!   background polls.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use thelife::catalog::Catalog;
//! use thelife::config::Config;
//! use thelife::engine::EconomySimulator;
//! use thelife::ledger::SledLedger;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let ledger = Arc::new(SledLedger::open(&config.ledger.data_dir)?);
//!     let catalog = Arc::new(Catalog::standard());
//!
//!     let mut session =
//!         EconomySimulator::start(ledger, catalog, config, "viewer-123", "Vinny")?;
//!     let report = session.attempt_crime("pickpocket")?;
//!     println!("{}", report.message.text);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - simulation core: formulas, lifecycle, timers, reconciler,
//!   and the session simulator
//! - [`ledger`] - the authoritative store contract, the local sled
//!   implementation, and the procedure/direct-write gateway
//! - [`catalog`] - static crime/business/worker/item catalogs
//! - [`config`] - TOML configuration with validation
//! - [`metrics`] - process-local operation counters

pub mod catalog;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod metrics;
