pub mod chat_commands;
