//! Dashboard back-end: project tracking plus read-only views of containers,
//! a Kubernetes cluster, GitHub and its Actions runs, and GitOps syncing.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (router, CORS, tracing, startup)     │
//! │  (React) │ <─────── │    └─ api.rs  (handlers, AppState, envelope)     │
//! └──────────┘          │         │                                        │
//!                       │         ├─ service.rs ─┐                         │
//!                       │         ├─ gitops.rs ──┼─> db.rs (SQLite)        │
//!                       │         ├─ importer.rs ┘                         │
//!                       │         │      └─ github.rs ──> GitHub REST      │
//!                       │         ├─ cicd.rs ─────┘                        │
//!                       │         ├─ containers.rs ─┐                      │
//!                       │         │  gitops.rs ─────┴─> command.rs (CLIs)  │
//!                       │         └─ kubernetes.rs ──> cluster API         │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! | Module       | Responsibility                                          |
//! |--------------|---------------------------------------------------------|
//! | `models`     | Entities, request payloads, stats views                 |
//! | `db`         | SQLite access via `DbHandle` (thin `Arc<Mutex<_>>`)     |
//! | `command`    | `CommandRunner` trait over subprocesses                 |
//! | `service`    | Validation and CRUD for items, projects, tasks          |
//! | `importer`   | GitHub PRs and issues into tasks, with dedup            |
//! | `cicd`       | Workflow runs, workflows, pipeline stats                |

pub mod api;
pub mod cicd;
pub mod command;
pub mod containers;
pub mod db;
pub mod github;
pub mod gitops;
pub mod importer;
pub mod kubernetes;
pub mod models;
pub mod server;
pub mod service;
