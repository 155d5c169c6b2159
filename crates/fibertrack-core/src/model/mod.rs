pub mod project;
pub mod step;
pub mod table;
