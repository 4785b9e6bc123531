/// Safety macro for code that should only run once
pub mod once;
