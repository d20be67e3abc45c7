//! Resume-to-portfolio feature: prompt building, document assembly, the job pipeline
//! and its HTTP handlers.

pub mod assemble;
pub mod handlers;
pub mod pipeline;
pub mod prompts;
