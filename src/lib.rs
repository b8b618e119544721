//! Jasmine agent core.
//!
//! The agent execution runtime behind the Jasmine chat client: LLM sessions
//! with read/write prompt semantics, a tool-call loop with pluggable history
//! compression, a typed lifecycle-event bus, checkpoint persistence with
//! rollback, and an LLM-driven planner. Hosts supply a [`client::ChatClient`]
//! implementation and any number of [`tools::Tool`]s; the core never assumes
//! a UI.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use jasmine::prelude::*;
//!
//! # async fn example(client: Arc<dyn ChatClient>) -> jasmine::error::Result<()> {
//! let prompt = Prompt::new("gpt-4o").with_message(ChatMessage::system("You are helpful."));
//! let registry = Arc::new(ToolRegistry::new());
//! let mut session = WriteSession::new(client, prompt, registry.descriptors());
//!
//! let executor = AgentExecutor::new(AgentConfig::default(), registry);
//! let result = executor.run(&mut session, "add 2 and 3").await?;
//! println!("{}", result.content);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod checkpoint;
pub mod client;
pub mod compression;
pub mod config;
pub mod error;
pub mod events;
pub mod planner;
pub mod prelude;
pub mod session;
pub mod tools;
pub mod types;
