//! Shared data-model types: `Agent`, `Scenario`, `Question`, `MemoryPlan`,
//! and the per-interview `Result`/`Results` records.

mod agent;
mod memory_plan;
mod question;
mod result;
mod scenario;

pub use agent::Agent;
pub use memory_plan::MemoryPlan;
pub use question::{FreeTextQuestion, Question};
pub use result::{Result, Results};
pub use scenario::Scenario;
