//! # Draftflow: Graph-driven Email Reply Drafting
//!
//! Draftflow runs a fixed directed graph of named steps over a mutable,
//! schema-checked state container: inbound emails go in, a drafted reply and
//! reviewer notification come out. The interesting machinery is the small
//! interpreter underneath — graph validation, conditional routing, run
//! checkpointing — and the email pipeline is its canonical instance.
//!
//! ## Core Concepts
//!
//! - **Steps**: async units of work producing partial state updates
//! - **Routers**: async units of work producing a discrete outcome label
//!   that selects the next node
//! - **State**: a declared field set, union-merged from step updates
//! - **Graph**: declarative topology, validated entirely at build time
//! - **Checkpoints**: one live state snapshot per run identifier, saved
//!   after every node invocation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use draftflow::executor::Executor;
//! use draftflow::pipeline::{self, Collaborators};
//! use draftflow::utils::ids;
//!
//! # async fn example(collaborators: Collaborators) -> miette::Result<()> {
//! let graph = pipeline::build_graph(&collaborators)?;
//! let executor = Executor::new(graph);
//!
//! let run_id = ids::run_id();
//! let seed = pipeline::seed_for_email(
//!     "Could you send over his bio?",
//!     "Re: Podcast Guest",
//!     "Jane Doe",
//!     "jane.doe@example.com",
//! );
//! let final_state = executor.run(&run_id, seed).await?;
//! println!("{}", final_state.text(pipeline::fields::FINAL_DRAFT));
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Failures keep three distinct shapes so operators can tell them apart:
//! configuration errors ([`graph::GraphError`]) are caught at build time and
//! never mid-run; collaborator failures surface as
//! [`executor::RunError::Step`] / [`executor::RunError::Router`]; and
//! graph-integrity defects (an outcome label with no registered successor)
//! surface as [`executor::RunError::UnknownOutcome`]. The last successful
//! checkpoint always stays readable for diagnosis.
//!
//! ## Module Guide
//!
//! - [`types`] - node identity and the terminal sentinel
//! - [`state`] - schema, state container, snapshots, merge semantics
//! - [`step`] - the `Step` and `Router` traits
//! - [`graph`] - graph declaration, compilation, validation
//! - [`executor`] - sequential traversal, checkpointing, run errors
//! - [`checkpoint`] - checkpoint store trait and in-memory backend
//! - [`pipeline`] - the email triage graph and its collaborator interfaces
//! - [`config`] - per-run options
//! - [`utils`] - run identifiers, deterministic RNG

pub mod checkpoint;
pub mod config;
pub mod executor;
pub mod graph;
pub mod pipeline;
pub mod state;
pub mod step;
pub mod testing;
pub mod types;
pub mod utils;
