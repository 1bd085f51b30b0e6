pub mod job;
pub mod openai;
