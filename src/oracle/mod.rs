pub mod adapter;
pub mod client;
pub mod openai;
pub mod prompt;

pub use adapter::{parse_judgment, AiOracle, Judgment};
pub use client::{OracleClient, OracleError, OracleRequest};
pub use openai::OpenAiClient;
pub use prompt::{CommandContext, PromptTemplate};
