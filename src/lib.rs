//! Draft analytics companion for League of Legends.
//!
//! This crate observes the local client during champion select and in-game
//! phases and opens analytics pages (matchup, counters, build guide) in the
//! default browser at user-configured moments. It has no backend of its own:
//! all it does is watch the client's private local API correctly and
//! dispatch URLs safely.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      Supervisor                          │
//! │                                                          │
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────┐    │
//! │  │ClientLocator│──▶│ RestClient  │   │ EventStream  │    │
//! │  │ (cmdline /  │   │ (REST +     │   │ (WebSocket   │    │
//! │  │  lockfile)  │   │  resync)    │   │  push feed)  │    │
//! │  └─────────────┘   └──────┬──────┘   └──────┬───────┘    │
//! │                           └───────┬─────────┘            │
//! │                                   ▼                      │
//! │            decoder ─▶ PhaseMachine + DraftState          │
//! │                      (registry, role inference)          │
//! │                                   │                      │
//! │                                   ▼                      │
//! │                 TriggerEngine ─▶ Dispatcher ─▶ browser   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The supervisor owns reconnection, resync and shutdown; everything state-
//! carrying is synchronous code it steps between awaits.

pub use config::*;
pub use decoder::*;
pub use dispatch::*;
pub use draft::*;
pub use error::*;
pub use lcu::*;
pub use lcu_websocket::*;
pub use registry::*;
pub use roles::*;
pub use state::*;
pub use supervisor::*;
pub use triggers::*;
pub use urls::*;

mod config;
mod decoder;
mod dispatch;
mod draft;
mod error;
mod lcu;
mod lcu_websocket;
mod registry;
mod roles;
mod state;
mod supervisor;
mod triggers;
mod urls;
