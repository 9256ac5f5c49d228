pub mod echo;
pub mod gemini;
pub mod llm;
