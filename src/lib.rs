//! DexScript
//!
//! A line-oriented scripting language for operating on data models:
//!
//! ```text
//! CREATE > BALL > France
//! LOCAL > hp > 40
//! UPDATE > BALL > France > HEALTH > $hp
//! VIEW > BALL > France
//! ```
//!
//! Scripts are segmented on `>`, each segment is typed by the
//! [`script::Resolver`], and the head of each line selects a command from
//! the [`commands::CommandRegistry`]. Persistence goes through the
//! [`store::DataStore`] façade; user interaction through [`host::Host`].

pub mod commands;
pub mod error;
pub mod host;
pub mod interpreter;
pub mod pending;
pub mod schema;
pub mod script;
pub mod session;
pub mod settings;
pub mod store;

pub use error::{LineError, ScriptError, ScriptResult};
pub use host::{Attachment, Host, HostError, Reply};
pub use interpreter::{Interpreter, LineOutcome, RunReport};
pub use session::ProcessState;
pub use settings::Settings;
pub use store::{DataStore, InMemoryStore};
