//! Built-in tools

mod current_time;
mod fetch;
mod final_answer;

pub use current_time::CurrentTimeTool;
pub use fetch::FetchTool;
pub use final_answer::FinalAnswerTool;
