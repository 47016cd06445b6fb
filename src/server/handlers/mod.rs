pub mod chatbot;
pub mod health;
